// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Offline text generators for tests and dry runs

use async_trait::async_trait;
use serde_json::json;
use std::time::SystemTime;
use tracing::debug;

use super::{ensure_variant, AvailableModel, Prompt, PromptResult, TextGenerator, Timing};
use crate::errors::{PromptflowError, PromptflowResult};
use crate::expectations::is_passing_expectations;
use crate::pipeline::{ModelVariant, Usage};

const ECHO_MODEL: &str = "mocked-echo";
const FAKE_MODEL: &str = "mocked-fake";

const LOREM: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit. \
Sed do eiusmod tempor incididunt ut labore et dolore magna aliqua. \
Ut enim ad minim veniam, quis nostrud exercitation ullamco laboris nisi ut aliquip ex ea commodo consequat. \
Duis aute irure dolor in reprehenderit in voluptate velit esse cillum dolore eu fugiat nulla pariatur. \
Excepteur sint occaecat cupidatat non proident, sunt in culpa qui officia deserunt mollit anim id est laborum.\n\n";

/// Generator that answers every prompt with the prompt itself
#[derive(Debug, Clone, Copy, Default)]
pub struct MockedEchoGenerator;

impl MockedEchoGenerator {
    pub fn new() -> Self {
        Self
    }

    fn echo(&self, prompt: &Prompt, variant: ModelVariant) -> PromptflowResult<PromptResult> {
        ensure_variant(prompt, variant)?;
        debug!(variant = %variant, "Mocked echo call");

        let start = SystemTime::now();
        Ok(PromptResult {
            content: prompt.content.clone(),
            model_name: ECHO_MODEL.to_string(),
            timing: Timing::since(start),
            usage: Usage::zero(),
            raw_response: json!({ "note": "This is mocked echo" }),
        })
    }
}

#[async_trait]
impl TextGenerator for MockedEchoGenerator {
    fn title(&self) -> &str {
        "Mocked echo"
    }

    async fn chat(&self, prompt: &Prompt) -> PromptflowResult<PromptResult> {
        self.echo(prompt, ModelVariant::Chat)
    }

    async fn complete(&self, prompt: &Prompt) -> PromptflowResult<PromptResult> {
        self.echo(prompt, ModelVariant::Completion)
    }

    async fn list_models(&self) -> PromptflowResult<Vec<AvailableModel>> {
        Ok(vec![
            AvailableModel::new("Echo chat", ECHO_MODEL, ModelVariant::Chat),
            AvailableModel::new("Echo completion", ECHO_MODEL, ModelVariant::Completion),
        ])
    }
}

/// Generator that produces filler text shaped to the prompt's expectations
///
/// Text grows one character at a time from a fixed lorem source until it
/// satisfies every expectation of the prompt, giving up after
/// `loop_limit` steps.
#[derive(Debug, Clone, Copy)]
pub struct MockedFakeGenerator {
    loop_limit: usize,
}

impl MockedFakeGenerator {
    pub fn new(loop_limit: usize) -> Self {
        Self { loop_limit }
    }

    /// Build filler text meeting the prompt's expectations
    pub fn fake_text(&self, prompt: &Prompt) -> PromptflowResult<String> {
        let mut source = LOREM.chars().cycle();
        let mut text = String::new();

        for _ in 0..self.loop_limit {
            if !text.trim().is_empty() && is_passing_expectations(&prompt.expectations, &text) {
                return Ok(text);
            }
            if let Some(c) = source.next() {
                text.push(c);
            }
        }

        Err(PromptflowError::execution(format!(
            "Can not generate fake text to meet the expectations, loop limit {} reached",
            self.loop_limit
        )))
    }

    fn fake(&self, prompt: &Prompt, variant: ModelVariant) -> PromptflowResult<PromptResult> {
        ensure_variant(prompt, variant)?;

        let start = SystemTime::now();
        let content = self.fake_text(prompt)?;
        Ok(PromptResult {
            content,
            model_name: FAKE_MODEL.to_string(),
            timing: Timing::since(start),
            usage: Usage::zero(),
            raw_response: json!({ "note": "This is mocked fake text" }),
        })
    }
}

impl Default for MockedFakeGenerator {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl TextGenerator for MockedFakeGenerator {
    fn title(&self) -> &str {
        "Mocked fake"
    }

    async fn chat(&self, prompt: &Prompt) -> PromptflowResult<PromptResult> {
        self.fake(prompt, ModelVariant::Chat)
    }

    async fn complete(&self, prompt: &Prompt) -> PromptflowResult<PromptResult> {
        self.fake(prompt, ModelVariant::Completion)
    }

    async fn list_models(&self) -> PromptflowResult<Vec<AvailableModel>> {
        Ok(vec![
            AvailableModel::new("Fake chat", FAKE_MODEL, ModelVariant::Chat),
            AvailableModel::new("Fake completion", FAKE_MODEL, ModelVariant::Completion),
        ])
    }
}
