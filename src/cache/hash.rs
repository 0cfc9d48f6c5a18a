// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Content hashing for cache keys
//!
//! Uses BLAKE3 over the operation, the model requirements and the prompt
//! content. Fields are length-prefixed so adjacent values can not run
//! together.

use blake3::Hasher;

use crate::errors::PromptflowError;
use crate::executors::Prompt;
use crate::pipeline::ModelVariant;

/// Content hasher for generating cache keys
pub struct ContentHasher {
    hasher: Hasher,
}

impl ContentHasher {
    /// Create a new content hasher
    pub fn new() -> Self {
        Self {
            hasher: Hasher::new(),
        }
    }

    /// Hash one backend call to create a cache key
    pub fn hash_prompt(
        mut self,
        operation: ModelVariant,
        prompt: &Prompt,
    ) -> Result<String, PromptflowError> {
        self.update_field(operation.to_string().as_bytes());

        let requirements = serde_json::to_string(&prompt.model_requirements).map_err(|e| {
            PromptflowError::CacheError {
                message: format!("Failed to serialize model requirements: {}", e),
            }
        })?;
        self.update_field(requirements.as_bytes());
        self.update_field(prompt.content.as_bytes());

        Ok(self.finalize())
    }

    fn update_field(&mut self, data: &[u8]) {
        self.hasher.update(&(data.len() as u64).to_le_bytes());
        self.hasher.update(data);
    }

    /// Hash arbitrary bytes
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Finalize and get the hash
    pub fn finalize(self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ModelRequirements;

    #[test]
    fn test_prompt_key_covers_every_part() {
        let prompt = Prompt::new("Hello", ModelRequirements::default());
        let key = |variant, prompt: &Prompt| ContentHasher::new().hash_prompt(variant, prompt).unwrap();

        let base = key(ModelVariant::Chat, &prompt);
        assert_eq!(base, key(ModelVariant::Chat, &prompt));
        assert_ne!(base, key(ModelVariant::Completion, &prompt));

        let mut other = prompt.clone();
        other.content = "Hello!".into();
        assert_ne!(base, key(ModelVariant::Chat, &other));

        let mut other = prompt.clone();
        other.model_requirements.max_tokens = Some(10);
        assert_ne!(base, key(ModelVariant::Chat, &other));

        // The task title is not part of the key
        let mut other = prompt;
        other.title = "Another task".into();
        assert_eq!(base, key(ModelVariant::Chat, &other));
    }
}
