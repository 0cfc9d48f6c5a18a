// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for promptflow.

pub mod cache;
pub mod compile;
pub mod graph;
pub mod run;
pub mod validate;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Markdown pipeline compiler and runner
#[derive(Parser, Debug)]
#[clap(
    name = "promptflow",
    version,
    about = "Compile, validate and run markdown-defined text-generation pipelines",
    long_about = None,
    after_help = "Examples:\n\
        promptflow compile hello.ptbk.md             Print the compiled pipeline as JSON\n\
        promptflow validate pipelines/               Validate every pipeline in a directory\n\
        promptflow run hello.ptbk.md -i name=Ada     Execute with the echo backend\n\
        promptflow graph hello.ptbk.md               Show the execution order\n\n\
        See 'promptflow <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Settings file (default: ./promptflow.toml, then the user config directory)
    #[clap(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a pipeline source to its interchange form
    Compile {
        /// Pipeline source (.ptbk.md)
        file: PathBuf,

        /// Output format
        #[clap(short, long, default_value = "json")]
        format: CompileFormat,

        /// Output file (default: stdout)
        #[clap(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a pipeline, or every pipeline under a directory
    Validate {
        /// Pipeline file (.ptbk.md or .ptbk.json) or directory
        path: PathBuf,
    },

    /// Execute a pipeline
    Run {
        /// Pipeline file (.ptbk.md or .ptbk.json)
        file: PathBuf,

        /// Input parameter as name=value (repeatable)
        #[clap(short, long = "input", value_name = "NAME=VALUE")]
        inputs: Vec<String>,

        /// Text-generation backend
        #[clap(long, default_value = "echo")]
        llm: LlmBackend,

        /// Write the execution report as JSON
        #[clap(long, value_name = "FILE")]
        report: Option<PathBuf>,

        /// Run one task at a time
        #[clap(long)]
        sequential: bool,

        /// Bypass the text-generation cache
        #[clap(long)]
        no_cache: bool,
    },

    /// Show the task graph of a pipeline
    Graph {
        /// Pipeline file
        file: PathBuf,

        /// Output format
        #[clap(short, long, default_value = "text")]
        format: GraphFormat,
    },

    /// Text-generation cache management
    Cache {
        #[clap(subcommand)]
        action: CacheAction,
    },
}

/// Cache management actions
#[derive(Subcommand, Debug, Clone)]
pub enum CacheAction {
    /// Show cache statistics
    Stats,

    /// Clear the cache
    Clear {
        /// Skip confirmation
        #[clap(short, long)]
        yes: bool,
    },
}

/// Output format for compiled pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CompileFormat {
    Json,
    Yaml,
}

/// Backend used by the run command
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LlmBackend {
    /// Answers with the prompt itself
    Echo,
    /// Answers with filler text shaped to the expectations
    Fake,
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

/// Load a pipeline file for a command, with a friendly missing-file error
pub(crate) fn load_pipeline(path: &std::path::Path) -> miette::Result<crate::Pipeline> {
    if !path.exists() {
        return Err(miette::miette!(
            "Pipeline file not found: {}",
            path.display()
        ));
    }

    Ok(crate::collection::load_pipeline(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "promptflow",
            "run",
            "hello.ptbk.md",
            "-i",
            "name=Ada",
            "--input",
            "mood=calm",
            "--llm",
            "fake",
            "--sequential",
        ]);

        match cli.command {
            Commands::Run {
                inputs,
                llm,
                sequential,
                ..
            } => {
                assert_eq!(inputs, vec!["name=Ada", "mood=calm"]);
                assert_eq!(llm, LlmBackend::Fake);
                assert!(sequential);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
