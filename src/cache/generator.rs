// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

use async_trait::async_trait;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};

use super::{Cache, CachedEntry, ContentHasher, FilesystemCache};
use crate::errors::PromptflowResult;
use crate::executors::{AvailableModel, Prompt, PromptResult, TextGenerator};
use crate::pipeline::ModelVariant;

/// Text generator answering repeated prompts from a cache
///
/// Unreadable or corrupt entries count as misses and failed writes are
/// only logged, so the cache never fails a call the inner generator
/// would have served.
pub struct CachedGenerator {
    inner: Arc<dyn TextGenerator>,
    cache: Arc<dyn Cache>,
    title: String,
}

impl CachedGenerator {
    pub fn new(inner: Arc<dyn TextGenerator>, cache: impl Cache + 'static) -> Self {
        let title = format!("{} (cached)", inner.title());
        Self {
            inner,
            cache: Arc::new(cache),
            title,
        }
    }

    /// Wrap a generator with a cache in the given directory
    pub fn on_disk(
        inner: Arc<dyn TextGenerator>,
        cache_dir: std::path::PathBuf,
    ) -> PromptflowResult<Self> {
        Ok(Self::new(inner, FilesystemCache::new(cache_dir)?))
    }

    async fn call(&self, operation: ModelVariant, prompt: &Prompt) -> PromptflowResult<PromptResult> {
        let key = ContentHasher::new().hash_prompt(operation, prompt)?;

        match self.cache.get(&key).await {
            Ok(Some(entry)) => {
                debug!(key = %key, task = %prompt.title, "Cache hit");
                return Ok(entry.result);
            }
            Ok(None) => debug!(key = %key, "Cache miss"),
            Err(e) => warn!(key = %key, "Ignoring unreadable cache entry: {}", e),
        }

        let result = match operation {
            ModelVariant::Chat => self.inner.chat(prompt).await?,
            ModelVariant::Completion => self.inner.complete(prompt).await?,
        };

        let entry = CachedEntry {
            timestamp: SystemTime::now(),
            cache_key: key,
            prompt_title: prompt.title.clone(),
            result,
        };
        if let Err(e) = self.cache.store(&entry).await {
            warn!("Failed to store cache entry: {}", e);
        }

        Ok(entry.result)
    }
}

#[async_trait]
impl TextGenerator for CachedGenerator {
    fn title(&self) -> &str {
        &self.title
    }

    async fn chat(&self, prompt: &Prompt) -> PromptflowResult<PromptResult> {
        self.call(ModelVariant::Chat, prompt).await
    }

    async fn complete(&self, prompt: &Prompt) -> PromptflowResult<PromptResult> {
        self.call(ModelVariant::Completion, prompt).await
    }

    async fn list_models(&self) -> PromptflowResult<Vec<AvailableModel>> {
        self.inner.list_models().await
    }
}
