// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Error types
//!
//! Errors fall into five families: syntax errors from the compiler, logic
//! errors from the validator, execution and expectation errors raised while
//! a task runs (retryable), and unexpected errors that signal a broken
//! internal invariant. The remaining variants are ambient I/O and parsing
//! failures.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for promptflow operations
pub type PromptflowResult<T> = Result<T, PromptflowError>;

/// Main error type for promptflow
#[derive(Error, Debug, Diagnostic)]
pub enum PromptflowError {
    // ─────────────────────────────────────────────────────────────────────────
    // Compilation
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Syntax error on line {line}: {message}")]
    #[diagnostic(code(promptflow::syntax))]
    Syntax {
        message: String,
        line: usize,
        #[help]
        help: Option<String>,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Logic(#[from] LogicError),

    // ─────────────────────────────────────────────────────────────────────────
    // Execution
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Execution failed: {message}")]
    #[diagnostic(code(promptflow::execution))]
    Execution {
        message: String,
        /// Retrying the same call can never succeed
        is_final: bool,
    },

    #[error("Expectation not met: {message}")]
    #[diagnostic(code(promptflow::expect))]
    Expect { message: String },

    #[error("Unexpected internal error: {message}")]
    #[diagnostic(
        code(promptflow::unexpected),
        help("This is a bug in promptflow, not in your pipeline")
    )]
    Unexpected { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Loading
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Pipeline file not found: {path}")]
    #[diagnostic(
        code(promptflow::pipeline_not_found),
        help("Pass a .ptbk.md or .ptbk.json file")
    )]
    PipelineNotFound { path: PathBuf },

    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(promptflow::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(promptflow::config))]
    Config { message: String },

    #[error("Cache error: {message}")]
    #[diagnostic(code(promptflow::cache_error))]
    CacheError { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(promptflow::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(promptflow::yaml_error))]
    Yaml { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(promptflow::json_error))]
    Json { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(promptflow::toml_error))]
    Toml { message: String },

    #[error("Glob pattern error: {message}")]
    #[diagnostic(code(promptflow::glob_error))]
    GlobPattern { message: String },
}

/// Semantic violations found by the validator
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum LogicError {
    #[error("Parameter {{{name}}} is declared more than once")]
    #[diagnostic(code(promptflow::logic::duplicate_parameter))]
    DuplicateParameter { name: String },

    #[error("Task '{name}' is defined more than once")]
    #[diagnostic(
        code(promptflow::logic::duplicate_task),
        help("Section titles must be unique after normalization")
    )]
    DuplicateTask { name: String },

    #[error("Parameter {{{name}}} is produced by more than one task: {}", .tasks.join(", "))]
    #[diagnostic(code(promptflow::logic::multiple_writers))]
    MultipleWriters { name: String, tasks: Vec<String> },

    #[error("Parameter {{{name}}} is an input but task '{task}' also produces it")]
    #[diagnostic(code(promptflow::logic::input_overwritten))]
    InputOverwritten { name: String, task: String },

    #[error("Can not resolve some parameters: {{{name}}} {context}")]
    #[diagnostic(
        code(promptflow::logic::unresolved_parameter),
        help("Declare it as an INPUT PARAMETER or produce it with a task")
    )]
    UnresolvedParameter { name: String, context: String },

    #[error("Parameter {{{name}}} is created but not used")]
    #[diagnostic(
        code(promptflow::logic::unused_parameter),
        help("Read it in some task or mark it as OUTPUT PARAMETER")
    )]
    UnusedParameter { name: String },

    #[error("Unknown model key {variant} {model_name} in task '{task}'")]
    #[diagnostic(code(promptflow::logic::unknown_model))]
    UnknownModel {
        task: String,
        variant: String,
        model_name: String,
    },

    #[error("{bound} expectation of {unit} must be positive in task '{task}'")]
    #[diagnostic(code(promptflow::logic::non_positive_expectation))]
    NonPositiveExpectation {
        task: String,
        bound: String,
        unit: String,
    },

    #[error("Min expectation ({min}) of {unit} is higher than max expectation ({max}) in task '{task}'")]
    #[diagnostic(code(promptflow::logic::inverted_expectation))]
    InvertedExpectation {
        task: String,
        unit: String,
        min: u32,
        max: u32,
    },

    #[error("Joker parameters are used for {{{parameter}}} but no expectations are defined")]
    #[diagnostic(
        code(promptflow::logic::joker_without_expectations),
        help("A joker is only adopted when it satisfies the task's expectations")
    )]
    JokerWithoutExpectations { task: String, parameter: String },

    #[error("Pipeline has circular dependencies: {}", .tasks.join(" → "))]
    #[diagnostic(
        code(promptflow::logic::circular_dependencies),
        help("Review which parameters each task reads and produces")
    )]
    CircularDependencies { tasks: Vec<String> },

    #[error("Pipeline '{title}' has no identity URL")]
    #[diagnostic(
        code(promptflow::logic::missing_url),
        help("Add a PIPELINE URL command to the pipeline header")
    )]
    MissingPipelineUrl { title: String },

    #[error("Pipeline URL {url} is used by more than one pipeline")]
    #[diagnostic(code(promptflow::logic::duplicate_url))]
    DuplicatePipelineUrl { url: String },
}

impl From<std::io::Error> for PromptflowError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for PromptflowError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for PromptflowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<toml::de::Error> for PromptflowError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl From<glob::PatternError> for PromptflowError {
    fn from(e: glob::PatternError) -> Self {
        Self::GlobPattern { message: e.to_string() }
    }
}

impl PromptflowError {
    /// Syntax error at a 1-based source line
    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            message: message.into(),
            line,
            help: None,
        }
    }

    /// Syntax error with a suggestion
    pub fn syntax_with_help(line: usize, message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Syntax {
            message: message.into(),
            line,
            help: Some(help.into()),
        }
    }

    /// Task-level failure that may succeed on another attempt
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            is_final: false,
        }
    }

    /// Task-level failure caused by a missing capability; never retried
    pub fn execution_final(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            is_final: true,
        }
    }

    pub fn expect(message: impl Into<String>) -> Self {
        Self::Expect {
            message: message.into(),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }

    /// Whether the engine may retry the task that raised this error
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Execution { is_final, .. } => !is_final,
            Self::Expect { .. } => true,
            _ => false,
        }
    }

    /// Whether this error is recorded per task instead of aborting the run
    pub fn is_task_level(&self) -> bool {
        matches!(self, Self::Execution { .. } | Self::Expect { .. })
    }

    /// Short name of the error family, used in execution reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Syntax { .. } => "SyntaxError",
            Self::Logic(_) => "LogicError",
            Self::Execution { .. } => "ExecutionError",
            Self::Expect { .. } => "ExpectError",
            Self::Unexpected { .. } => "UnexpectedError",
            _ => "Error",
        }
    }
}
