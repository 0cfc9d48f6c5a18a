// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Pipeline document model and execution
//!
//! The compiled pipeline, its task graph, the validator that gates
//! execution, and the engine that runs it.

mod dag;
mod definition;
mod executor;
mod report;
mod usage;
mod validation;

pub use dag::DagBuilder;
pub use definition::*;
pub use executor::{
    substitute_parameters, CancellationSignal, ExecutionOutcome, ExecutionSettings,
    PipelineExecutor, ProgressCallback,
};
pub use report::{
    AttemptReport, ErrorRecord, ExecutionReport, TaskProgress, TaskReport, TaskStatus,
};
pub use usage::{UncertainNumber, Usage};
pub use validation::{PipelineValidator, ValidationResult};
