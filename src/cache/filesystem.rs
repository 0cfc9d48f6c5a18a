// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Filesystem-based cache implementation
//!
//! Stores cache entries as JSON files in a cache directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{Cache, CacheStats, CachedEntry};
use crate::errors::PromptflowError;

/// Filesystem-based cache
#[derive(Debug, Clone)]
pub struct FilesystemCache {
    cache_dir: PathBuf,
}

impl FilesystemCache {
    /// Create a new filesystem cache
    pub fn new(cache_dir: PathBuf) -> Result<Self, PromptflowError> {
        if !cache_dir.exists() {
            std::fs::create_dir_all(&cache_dir).map_err(|e| PromptflowError::CacheError {
                message: format!("Failed to create cache directory: {}", e),
            })?;
        }

        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get path for a cache entry
    fn cache_path(&self, key: &str) -> PathBuf {
        // Use first 2 chars as directory for better filesystem performance
        let (prefix, rest) = key.split_at(2.min(key.len()));
        self.cache_dir.join(prefix).join(format!("{}.json", rest))
    }

    /// List all readable cache entries
    fn list_entries(&self) -> Result<Vec<CachedEntry>, PromptflowError> {
        let mut entries = Vec::new();

        if !self.cache_dir.exists() {
            return Ok(entries);
        }

        for prefix_dir in std::fs::read_dir(&self.cache_dir).map_err(|e| {
            PromptflowError::CacheError {
                message: format!("Failed to read cache directory: {}", e),
            }
        })? {
            let prefix_dir = prefix_dir
                .map_err(|e| PromptflowError::CacheError {
                    message: format!("Failed to read cache entry: {}", e),
                })?
                .path();

            if !prefix_dir.is_dir() {
                continue;
            }

            for entry_file in std::fs::read_dir(&prefix_dir).map_err(|e| {
                PromptflowError::CacheError {
                    message: format!("Failed to read cache subdirectory: {}", e),
                }
            })? {
                let entry_file = entry_file
                    .map_err(|e| PromptflowError::CacheError {
                        message: format!("Failed to read cache file: {}", e),
                    })?
                    .path();

                if entry_file.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }

                if let Ok(content) = std::fs::read_to_string(&entry_file) {
                    if let Ok(entry) = serde_json::from_str::<CachedEntry>(&content) {
                        entries.push(entry);
                    }
                }
            }
        }

        Ok(entries)
    }

    /// Calculate directory size recursively
    fn dir_size(path: &Path) -> Result<u64, PromptflowError> {
        let mut size = 0;

        for entry in std::fs::read_dir(path).map_err(|e| PromptflowError::CacheError {
            message: format!("Failed to read directory: {}", e),
        })? {
            let entry = entry.map_err(|e| PromptflowError::CacheError {
                message: format!("Failed to read entry: {}", e),
            })?;

            let path = entry.path();
            if path.is_dir() {
                size += Self::dir_size(&path)?;
            } else {
                size += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }

        Ok(size)
    }
}

#[async_trait]
impl Cache for FilesystemCache {
    async fn get(&self, key: &str) -> Result<Option<CachedEntry>, PromptflowError> {
        let path = self.cache_path(key);

        if !path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            PromptflowError::CacheError {
                message: format!("Failed to read cache entry: {}", e),
            }
        })?;

        let entry: CachedEntry =
            serde_json::from_str(&content).map_err(|e| PromptflowError::CacheError {
                message: format!("Failed to parse cache entry: {}", e),
            })?;

        Ok(Some(entry))
    }

    async fn store(&self, entry: &CachedEntry) -> Result<(), PromptflowError> {
        let path = self.cache_path(&entry.cache_key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PromptflowError::CacheError {
                    message: format!("Failed to create cache directory: {}", e),
                })?;
        }

        let json = serde_json::to_string_pretty(entry).map_err(|e| PromptflowError::CacheError {
            message: format!("Failed to serialize cache entry: {}", e),
        })?;

        tokio::fs::write(&path, json)
            .await
            .map_err(|e| PromptflowError::CacheError {
                message: format!("Failed to write cache entry: {}", e),
            })?;

        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), PromptflowError> {
        let path = self.cache_path(key);

        if path.exists() {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| PromptflowError::CacheError {
                    message: format!("Failed to remove cache entry: {}", e),
                })?;
        }

        Ok(())
    }

    async fn clear(&self) -> Result<(), PromptflowError> {
        if self.cache_dir.exists() {
            tokio::fs::remove_dir_all(&self.cache_dir)
                .await
                .map_err(|e| PromptflowError::CacheError {
                    message: format!("Failed to clear cache: {}", e),
                })?;

            tokio::fs::create_dir_all(&self.cache_dir)
                .await
                .map_err(|e| PromptflowError::CacheError {
                    message: format!("Failed to recreate cache directory: {}", e),
                })?;
        }

        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats, PromptflowError> {
        let entries = self.list_entries()?;

        let mut stats = CacheStats {
            entries: entries.len(),
            size_bytes: 0,
            oldest_entry: entries.iter().map(|e| e.timestamp).min(),
            newest_entry: entries.iter().map(|e| e.timestamp).max(),
        };

        if self.cache_dir.exists() {
            stats.size_bytes = Self::dir_size(&self.cache_dir)?;
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::{PromptResult, Timing};
    use crate::pipeline::Usage;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn make_entry(key: &str, content: &str) -> CachedEntry {
        CachedEntry {
            timestamp: SystemTime::now(),
            cache_key: key.into(),
            prompt_title: "Question".into(),
            result: PromptResult {
                content: content.into(),
                model_name: "mocked-echo".into(),
                timing: Timing::since(SystemTime::now()),
                usage: Usage::zero(),
                raw_response: serde_json::Value::Null,
            },
        }
    }

    #[tokio::test]
    async fn test_cache_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FilesystemCache::new(temp_dir.path().to_path_buf()).unwrap();

        let entry = make_entry("abcdef", "cached answer");
        cache.store(&entry).await.unwrap();

        assert!(temp_dir.path().join("ab").join("cdef.json").exists());

        let loaded = cache.get("abcdef").await.unwrap().unwrap();
        assert_eq!(loaded.result.content, "cached answer");
        assert!(cache.get("ff0000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stats_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FilesystemCache::new(temp_dir.path().join("cache")).unwrap();

        cache.store(&make_entry("aa11", "one")).await.unwrap();
        cache.store(&make_entry("bb22", "two")).await.unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entries, 2);
        assert!(stats.size_bytes > 0);
        assert!(stats.oldest_entry <= stats.newest_entry);

        cache.invalidate("aa11").await.unwrap();
        assert_eq!(cache.stats().await.unwrap().entries, 1);

        cache.clear().await.unwrap();
        assert_eq!(cache.stats().await.unwrap().entries, 0);
        assert!(cache.cache_dir().exists());
    }
}
