// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Backend adapters
//!
//! The engine talks to three adapter roles: text generation, script
//! execution and user interaction. It only ever asks an adapter what it
//! can do; concrete adapters live in the submodules.

mod functions;
mod interface;
mod mocked;
mod shell;

pub use functions::{FunctionRegistry, PostprocessFn};
pub use interface::{CallbackInterface, StdioInterface};
pub use mocked::{MockedEchoGenerator, MockedFakeGenerator};
pub use shell::ShellScriptRunner;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::warn;

use crate::errors::{PromptflowError, PromptflowResult};
use crate::pipeline::{Expectation, ModelRequirements, ModelVariant, Usage};

/// A model a text generator can serve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableModel {
    pub model_title: String,
    pub model_name: String,
    pub model_variant: ModelVariant,
}

impl AvailableModel {
    pub fn new(title: impl Into<String>, name: impl Into<String>, variant: ModelVariant) -> Self {
        Self {
            model_title: title.into(),
            model_name: name.into(),
            model_variant: variant,
        }
    }
}

/// A fully substituted prompt handed to a text generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    /// Title of the task that produced the prompt
    pub title: String,
    pub content: String,
    pub model_requirements: ModelRequirements,
    /// Expectations the final output will be checked against
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expectations: Vec<Expectation>,
}

impl Prompt {
    pub fn new(content: impl Into<String>, model_requirements: ModelRequirements) -> Self {
        Self {
            title: String::new(),
            content: content.into(),
            model_requirements,
            expectations: Vec::new(),
        }
    }
}

/// Wall-clock bounds of one backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub start: SystemTime,
    pub complete: SystemTime,
}

impl Timing {
    /// Timing from `start` until now
    pub fn since(start: SystemTime) -> Self {
        Self {
            start,
            complete: SystemTime::now(),
        }
    }

    pub fn duration(&self) -> Duration {
        self.complete.duration_since(self.start).unwrap_or_default()
    }
}

/// What a text generator returns for one prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResult {
    pub content: String,
    /// Model that actually served the call
    pub model_name: String,
    pub timing: Timing,
    pub usage: Usage,
    /// Backend-specific payload, kept for the execution report
    pub raw_response: serde_json::Value,
}

/// Text-generation backend
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Human-readable adapter name
    fn title(&self) -> &str;

    /// Run a prompt against a CHAT model
    async fn chat(&self, prompt: &Prompt) -> PromptflowResult<PromptResult>;

    /// Run a prompt against a COMPLETION model
    async fn complete(&self, prompt: &Prompt) -> PromptflowResult<PromptResult>;

    /// Models this backend can serve
    async fn list_models(&self) -> PromptflowResult<Vec<AvailableModel>>;
}

/// Reject a call whose declared variant does not match the operation
pub fn ensure_variant(prompt: &Prompt, operation: ModelVariant) -> PromptflowResult<()> {
    let declared = prompt.model_requirements.model_variant;
    if declared != operation {
        let operation_name = match operation {
            ModelVariant::Chat => "chat",
            ModelVariant::Completion => "complete",
        };
        return Err(PromptflowError::execution_final(format!(
            "Use {} only for {} variant, prompt declares {}",
            operation_name, operation, declared
        )));
    }
    Ok(())
}

/// Script backend
///
/// A runner declares which postprocessing functions and which script
/// languages it handles; the engine tries runners in order and only
/// fails when every one declines.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    fn title(&self) -> &str;

    fn supports_function(&self, _name: &str) -> bool {
        false
    }

    /// Invoke a named function on `value`
    async fn call_function(
        &self,
        name: &str,
        _value: &str,
        _parameters: &BTreeMap<String, String>,
    ) -> PromptflowResult<String> {
        Err(PromptflowError::execution_final(format!(
            "{} does not provide function `{}`",
            self.title(),
            name
        )))
    }

    fn supports_language(&self, _language: &str) -> bool {
        false
    }

    /// Run a script body with its dependent parameters bound
    async fn execute_script(
        &self,
        language: &str,
        _script: &str,
        _parameters: &BTreeMap<String, String>,
    ) -> PromptflowResult<String> {
        Err(PromptflowError::execution_final(format!(
            "{} can not run {} scripts",
            self.title(),
            language
        )))
    }
}

/// Question shown to a human by a PROMPT DIALOG task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPrompt {
    pub title: String,
    pub message: String,
    pub default_value: Option<String>,
}

/// User-interaction backend
#[async_trait]
pub trait UserInterface: Send + Sync {
    async fn prompt_text(&self, prompt: &UserPrompt) -> PromptflowResult<String>;
}

/// Every adapter the engine may call during one run
///
/// Each role is an ordered list. Earlier adapters are asked first and a
/// later one is only used when the earlier ones lack the capability.
#[derive(Clone, Default)]
pub struct ExecutionTools {
    pub llm: Vec<Arc<dyn TextGenerator>>,
    pub script: Vec<Arc<dyn ScriptRunner>>,
    pub user_interface: Vec<Arc<dyn UserInterface>>,
}

impl ExecutionTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text generator; earlier generators are asked first
    pub fn with_llm(self, llm: impl TextGenerator + 'static) -> Self {
        self.with_shared_llm(Arc::new(llm))
    }

    pub fn with_shared_llm(mut self, llm: Arc<dyn TextGenerator>) -> Self {
        self.llm.push(llm);
        self
    }

    /// Append a script runner; earlier runners are asked first
    pub fn with_script(mut self, runner: impl ScriptRunner + 'static) -> Self {
        self.script.push(Arc::new(runner));
        self
    }

    pub fn with_user_interface(mut self, ui: impl UserInterface + 'static) -> Self {
        self.user_interface.push(Arc::new(ui));
        self
    }

    /// First generator serving the required model
    ///
    /// Without a model name any generator will do, so the first one is
    /// used. A generator whose model listing fails is passed over.
    pub async fn generator_for(
        &self,
        requirements: &ModelRequirements,
    ) -> PromptflowResult<&Arc<dyn TextGenerator>> {
        let Some(first) = self.llm.first() else {
            return Err(PromptflowError::execution_final(
                "No text generator is configured",
            ));
        };
        let Some(name) = &requirements.model_name else {
            return Ok(first);
        };

        for llm in &self.llm {
            match llm.list_models().await {
                Ok(models) => {
                    let offered = models.iter().any(|m| {
                        &m.model_name == name && m.model_variant == requirements.model_variant
                    });
                    if offered {
                        return Ok(llm);
                    }
                }
                Err(e) => warn!(generator = %llm.title(), "Can not list models: {}", e),
            }
        }

        let titles: Vec<&str> = self.llm.iter().map(|l| l.title()).collect();
        Err(PromptflowError::execution_final(format!(
            "Model {} ({}) is not offered by {}",
            name,
            requirements.model_variant,
            titles.join(", ")
        )))
    }

    /// First configured user interface
    pub fn user_interface(&self) -> Option<&Arc<dyn UserInterface>> {
        self.user_interface.first()
    }

    /// First runner that provides the named function
    pub fn function_runner(&self, name: &str) -> Option<&Arc<dyn ScriptRunner>> {
        self.script.iter().find(|r| r.supports_function(name))
    }

    /// First runner that executes scripts in the given language
    pub fn language_runner(&self, language: &str) -> Option<&Arc<dyn ScriptRunner>> {
        self.script.iter().find(|r| r.supports_language(language))
    }
}

impl std::fmt::Debug for ExecutionTools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionTools")
            .field(
                "llm",
                &self.llm.iter().map(|l| l.title().to_string()).collect::<Vec<_>>(),
            )
            .field(
                "script",
                &self.script.iter().map(|s| s.title().to_string()).collect::<Vec<_>>(),
            )
            .field("user_interface", &self.user_interface.len())
            .finish()
    }
}
