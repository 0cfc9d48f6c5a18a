// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! User-interaction adapters

use async_trait::async_trait;
use colored::Colorize;
use console::Term;
use std::sync::Arc;

use super::{UserInterface, UserPrompt};
use crate::errors::{PromptflowError, PromptflowResult};

type Answer = Arc<dyn Fn(&UserPrompt) -> PromptflowResult<String> + Send + Sync>;

/// Answers dialog prompts with a closure
///
/// Useful for embedding and tests, where there is no terminal.
#[derive(Clone)]
pub struct CallbackInterface {
    answer: Answer,
}

impl CallbackInterface {
    pub fn new<F>(answer: F) -> Self
    where
        F: Fn(&UserPrompt) -> PromptflowResult<String> + Send + Sync + 'static,
    {
        Self {
            answer: Arc::new(answer),
        }
    }

    /// Always answer with the same text
    pub fn fixed(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_| Ok(text.clone()))
    }
}

#[async_trait]
impl UserInterface for CallbackInterface {
    async fn prompt_text(&self, prompt: &UserPrompt) -> PromptflowResult<String> {
        (self.answer)(prompt)
    }
}

/// Asks the person at the terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct StdioInterface;

impl StdioInterface {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl UserInterface for StdioInterface {
    async fn prompt_text(&self, prompt: &UserPrompt) -> PromptflowResult<String> {
        let prompt = prompt.clone();

        let answer = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
            let term = Term::stderr();
            if !prompt.title.is_empty() {
                term.write_line(&format!("{}", prompt.title.bold()))?;
            }
            term.write_line(&prompt.message)?;
            if let Some(default) = &prompt.default_value {
                term.write_line(&format!("{}", format!("(default: {})", default).dimmed()))?;
            }
            term.write_str("> ")?;

            let line = Term::stdout().read_line()?;
            Ok(match (line.trim().is_empty(), prompt.default_value) {
                (true, Some(default)) => default,
                _ => line,
            })
        })
        .await
        .map_err(|e| PromptflowError::unexpected(format!("Dialog task panicked: {}", e)))?;

        answer.map_err(|e| PromptflowError::execution(format!("Can not read answer: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_callback_sees_prompt() {
        let ui = CallbackInterface::new(|p| Ok(format!("answer to {}", p.message)));
        let prompt = UserPrompt {
            title: "Name".into(),
            message: "What is your name?".into(),
            default_value: None,
        };

        assert_eq!(
            ui.prompt_text(&prompt).await.unwrap(),
            "answer to What is your name?"
        );
    }

    #[tokio::test]
    async fn test_fixed_answer() {
        let ui = CallbackInterface::fixed("Ada");
        let prompt = UserPrompt {
            title: String::new(),
            message: "?".into(),
            default_value: Some("Bob".into()),
        };
        assert_eq!(ui.prompt_text(&prompt).await.unwrap(), "Ada");
    }
}
