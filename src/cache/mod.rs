// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Caching of text-generation results
//!
//! The engine holds no cache of its own. Caching is an adapter:
//! [`CachedGenerator`] wraps any [`TextGenerator`](crate::executors::TextGenerator)
//! and answers repeated prompts from disk.

mod filesystem;
mod generator;
mod hash;

pub use filesystem::FilesystemCache;
pub use generator::CachedGenerator;
pub use hash::ContentHasher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::errors::PromptflowError;
use crate::executors::PromptResult;

/// Trait for cache implementations
#[async_trait]
pub trait Cache: Send + Sync {
    /// Get the entry stored under a key
    async fn get(&self, key: &str) -> Result<Option<CachedEntry>, PromptflowError>;

    /// Store an entry under its key
    async fn store(&self, entry: &CachedEntry) -> Result<(), PromptflowError>;

    /// Remove one entry
    async fn invalidate(&self, key: &str) -> Result<(), PromptflowError>;

    /// Clear all cached results
    async fn clear(&self) -> Result<(), PromptflowError>;

    /// Get cache statistics
    async fn stats(&self) -> Result<CacheStats, PromptflowError>;
}

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of cached entries
    pub entries: usize,
    /// Total size in bytes
    pub size_bytes: u64,
    /// Oldest entry timestamp
    pub oldest_entry: Option<SystemTime>,
    /// Newest entry timestamp
    pub newest_entry: Option<SystemTime>,
}

impl CacheStats {
    /// Format size for display
    pub fn formatted_size(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if self.size_bytes >= GB {
            format!("{:.2} GB", self.size_bytes as f64 / GB as f64)
        } else if self.size_bytes >= MB {
            format!("{:.2} MB", self.size_bytes as f64 / MB as f64)
        } else if self.size_bytes >= KB {
            format!("{:.2} KB", self.size_bytes as f64 / KB as f64)
        } else {
            format!("{} bytes", self.size_bytes)
        }
    }
}

/// One cached backend answer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedEntry {
    /// When the entry was cached
    pub timestamp: SystemTime,
    /// Cache key (content hash)
    pub cache_key: String,
    /// Title of the task whose prompt produced the entry
    pub prompt_title: String,
    pub result: PromptResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatted_size() {
        let mut stats = CacheStats::default();
        assert_eq!(stats.formatted_size(), "0 bytes");

        stats.size_bytes = 2048;
        assert_eq!(stats.formatted_size(), "2.00 KB");

        stats.size_bytes = 3 * 1024 * 1024;
        assert_eq!(stats.formatted_size(), "3.00 MB");
    }
}
