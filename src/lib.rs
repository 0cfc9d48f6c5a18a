// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! # promptflow - markdown-defined text-generation pipelines
//!
//! `promptflow` compiles pipelines written in a markdown dialect, checks
//! their parameter graph, and executes them against pluggable backends.
//!
//! ## Features
//!
//! - **Dialect compiler** - headings, list-item commands and fenced blocks become a typed [`Pipeline`]
//! - **Graph validation** - unresolved, unused and circular parameters are rejected before anything runs
//! - **Parallel execution** - independent tasks run concurrently with retries, jokers and expectations
//! - **Pluggable backends** - text generation, scripts and user dialogs behind small traits
//!
//! ## Quick Start
//!
//! ```bash
//! # Compile a pipeline to JSON
//! promptflow compile greeting.ptbk.md
//!
//! # Run it with the echo backend
//! promptflow run greeting.ptbk.md -i yourName=Matthew --llm echo
//! ```
//!
//! ## Library use
//!
//! ```no_run
//! use promptflow::executors::{ExecutionTools, FunctionRegistry, MockedEchoGenerator};
//! use promptflow::pipeline::{ExecutionSettings, PipelineExecutor};
//!
//! # async fn demo(source: &str) -> promptflow::PromptflowResult<()> {
//! let pipeline = promptflow::compile(source)?;
//! let tools = ExecutionTools::new()
//!     .with_llm(MockedEchoGenerator)
//!     .with_script(FunctionRegistry::with_builtins());
//! let executor = PipelineExecutor::new(pipeline, tools, ExecutionSettings::default())?;
//! let outcome = executor.execute(Default::default(), None).await?;
//! println!("{:?}", outcome.output_parameters);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cli;
pub mod collection;
pub mod compiler;
pub mod config;
pub mod errors;
pub mod executors;
pub mod expectations;
pub mod pipeline;
pub mod utils;

// Re-export commonly used types
pub use collection::PipelineCollection;
pub use compiler::compile;
pub use config::Settings;
pub use errors::{LogicError, PromptflowError, PromptflowResult};
pub use pipeline::{Pipeline, PipelineExecutor, PipelineValidator, Task};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
