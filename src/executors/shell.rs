// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Shell script runner
//!
//! Runs SCRIPT tasks written in a shell language. The task's dependent
//! parameters are exported as environment variables; stdout, without its
//! trailing newline, is the task result.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

use super::ScriptRunner;
use crate::errors::{PromptflowError, PromptflowResult};

const SHELL_LANGUAGES: &[&str] = &["bash", "sh", "shell", "zsh"];

/// Shell script runner
pub struct ShellScriptRunner {
    shell: String,
}

impl ShellScriptRunner {
    /// Runner using the given shell executable
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// Whether the shell executable can be found on `PATH`
    pub fn is_available(&self) -> bool {
        which::which(&self.shell).is_ok()
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }
}

impl Default for ShellScriptRunner {
    fn default() -> Self {
        Self::new("bash")
    }
}

#[async_trait]
impl ScriptRunner for ShellScriptRunner {
    fn title(&self) -> &str {
        "Shell"
    }

    fn supports_language(&self, language: &str) -> bool {
        SHELL_LANGUAGES.contains(&language.to_lowercase().as_str())
    }

    async fn execute_script(
        &self,
        language: &str,
        script: &str,
        parameters: &BTreeMap<String, String>,
    ) -> PromptflowResult<String> {
        if !self.supports_language(language) {
            return Err(PromptflowError::execution_final(format!(
                "Shell runner can not run {} scripts",
                language
            )));
        }

        let start = Instant::now();

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(script);
        cmd.envs(parameters);

        let output = cmd.output().await.map_err(|e| {
            PromptflowError::execution_final(format!(
                "Shell '{}' may not be available: {}",
                self.shell, e
            ))
        })?;

        debug!(
            shell = %self.shell,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Script finished"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PromptflowError::execution(format!(
                "Script exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.trim_end_matches('\n').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_languages() {
        let runner = ShellScriptRunner::default();
        assert!(runner.supports_language("bash"));
        assert!(runner.supports_language("SH"));
        assert!(!runner.supports_language("javascript"));
        assert!(!runner.supports_function("trim"));
    }

    #[tokio::test]
    async fn test_parameters_are_exported() {
        let runner = ShellScriptRunner::new("sh");
        if !runner.is_available() {
            return;
        }

        let params = BTreeMap::from([("name".to_string(), "World".to_string())]);
        let out = runner
            .execute_script("sh", "echo \"Hello $name\"", &params)
            .await
            .unwrap();
        assert_eq!(out, "Hello World");
    }

    #[tokio::test]
    async fn test_failing_script() {
        let runner = ShellScriptRunner::new("sh");
        if !runner.is_available() {
            return;
        }

        let err = runner
            .execute_script("sh", "echo oops >&2; exit 3", &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("code 3"));
        assert!(err.is_retryable());
    }
}
