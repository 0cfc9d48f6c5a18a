// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Execution report
//!
//! The full record of one run. Task failures end up here as data; the
//! engine only returns an error for internal faults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;

use super::{ExecutionType, Task, Usage};
use crate::errors::PromptflowError;
use crate::executors::Timing;

/// Lifecycle of one task within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Ready,
    Dispatching,
    Succeeded,
    /// Attempts exhausted or a final error
    Failed,
    /// Never started because a dependency did not resolve
    Skipped,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Skipped | Self::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ready => write!(f, "ready"),
            Self::Dispatching => write!(f, "dispatching"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Status change notification sent to progress callbacks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgress {
    pub task_name: String,
    pub task_title: String,
    pub status: TaskStatus,
    /// 1-based attempt number, 0 before the first dispatch
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A terminal error of the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    /// Error family, such as `ExecutionError` or `ExpectError`
    pub kind: String,
    /// Task that failed; `None` for run-level errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(task: Option<&str>, error: &PromptflowError) -> Self {
        Self {
            kind: error.kind().to_string(),
            task: task.map(str::to_string),
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.task {
            Some(task) => write!(f, "[{}] {}: {}", self.kind, task, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// One dispatch of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptReport {
    pub attempt: u32,
    /// Output after postprocessing, when the attempt got that far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AttemptReport {
    pub fn new(attempt: u32) -> Self {
        Self {
            attempt,
            result: None,
            model_name: None,
            raw_response: None,
            timing: None,
            usage: Usage::zero(),
            error: None,
        }
    }
}

/// Everything recorded about one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    pub task_name: String,
    pub title: String,
    pub execution_type: ExecutionType,
    pub resulting_parameter_name: String,
    pub status: TaskStatus,

    /// Number of dispatches; 0 when a joker or an early stop made none
    pub attempts_used: u32,

    /// Content template after parameter substitution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substituted_content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    /// Joker parameter adopted as the result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joker_used: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<SystemTime>,

    pub duration_ms: u64,

    /// Usage summed over every attempt
    pub usage: Usage,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<AttemptReport>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

impl TaskReport {
    pub fn pending(task: &Task) -> Self {
        Self {
            task_name: task.name.clone(),
            title: task.title.clone(),
            execution_type: task.execution_type,
            resulting_parameter_name: task.resulting_parameter_name.clone(),
            status: TaskStatus::Pending,
            attempts_used: 0,
            substituted_content: None,
            result: None,
            joker_used: None,
            started_at: None,
            duration_ms: 0,
            usage: Usage::zero(),
            attempts: Vec::new(),
            error: None,
        }
    }

    /// Raw payload of the last backend call
    pub fn raw_response(&self) -> Option<&serde_json::Value> {
        self.attempts.iter().rev().find_map(|a| a.raw_response.as_ref())
    }
}

/// Record of a whole run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_url: Option<String>,
    pub title: String,
    pub dialect_version: String,
    pub started_at: SystemTime,
    pub duration_ms: u64,
    pub is_successful: bool,
    /// In pipeline document order
    pub tasks: Vec<TaskReport>,
    pub usage: Usage,
    pub errors: Vec<ErrorRecord>,
    pub output_parameters: BTreeMap<String, String>,
}

impl ExecutionReport {
    pub fn task(&self, name: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.task_name == name)
    }

    pub fn to_json(&self) -> Result<String, PromptflowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Count of tasks in each terminal status
    pub fn status_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for task in &self.tasks {
            *counts.entry(task.status.to_string()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_record_from_error() {
        let record = ErrorRecord::new(Some("question"), &PromptflowError::expect("too short"));
        assert_eq!(record.kind, "ExpectError");
        assert_eq!(record.task.as_deref(), Some("question"));
        assert!(record.to_string().starts_with("[ExpectError] question:"));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&TaskStatus::Succeeded).unwrap();
        assert_eq!(json, "\"SUCCEEDED\"");
        assert!(TaskStatus::Skipped.is_terminal());
        assert!(!TaskStatus::Dispatching.is_terminal());
    }
}
