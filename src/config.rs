// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Settings loading
//!
//! Settings come from `promptflow.toml`: an explicit path first, then the
//! working directory, then the user configuration directory. Missing
//! files fall back to defaults.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::PromptflowError;
use crate::pipeline::ExecutionSettings;

/// Name of the settings file
pub const CONFIG_FILE: &str = "promptflow.toml";

/// Settings from promptflow.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub execution: ExecutionConfig,
    pub cache: CacheConfig,
    pub shell: ShellConfig,
    pub mock: MockConfig,
}

/// Engine bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub max_execution_attempts: u32,
    pub max_parallel_count: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        let defaults = ExecutionSettings::default();
        Self {
            max_execution_attempts: defaults.max_execution_attempts,
            max_parallel_count: defaults.max_parallel_count,
        }
    }
}

/// Text-generation cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Relative paths are resolved against the working directory
    pub directory: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: PathBuf::from(".promptflow").join("cache"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub shell: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
        }
    }
}

/// Offline generators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    pub loop_limit: usize,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self { loop_limit: 1000 }
    }
}

impl Settings {
    /// Parse settings from TOML text
    pub fn from_toml(content: &str) -> Result<Self, PromptflowError> {
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from a file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self, PromptflowError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| PromptflowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        debug!(path = %path.display(), "Loading settings");
        Self::from_toml(&content)
    }

    /// Find and load settings
    ///
    /// An explicit path must exist; the other locations are optional.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, PromptflowError> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(PromptflowError::Config {
                    message: format!("Config file not found: {}", path.display()),
                });
            }
            return Self::load(path);
        }

        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Self::load(&local);
        }

        match Self::user_config_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Settings file in the user configuration directory
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "promptflow", "promptflow")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    pub fn validate(&self) -> Result<(), PromptflowError> {
        self.execution_settings().validate()?;

        if self.mock.loop_limit == 0 {
            return Err(PromptflowError::Config {
                message: "mock.loop_limit must be at least 1".into(),
            });
        }
        if self.shell.shell.trim().is_empty() {
            return Err(PromptflowError::Config {
                message: "shell.shell must name an executable".into(),
            });
        }

        Ok(())
    }

    /// Bounds threaded into the engine
    pub fn execution_settings(&self) -> ExecutionSettings {
        ExecutionSettings {
            max_execution_attempts: self.execution.max_execution_attempts,
            max_parallel_count: self.execution.max_parallel_count,
        }
    }
}
