// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! promptflow - markdown-defined text-generation pipelines
//!
//! Compile, validate and execute pipelines from the command line.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use promptflow::cli::{run::RunOptions, Cli, Commands};
use promptflow::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "promptflow=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    let settings = Settings::discover(cli.config.as_deref())?;

    // Dispatch to command handlers
    match cli.command {
        Commands::Compile {
            file,
            format,
            output,
        } => promptflow::cli::compile::run(file, format, output, cli.verbose).await,
        Commands::Validate { path } => promptflow::cli::validate::run(path, cli.verbose).await,
        Commands::Run {
            file,
            inputs,
            llm,
            report,
            sequential,
            no_cache,
        } => {
            let options = RunOptions {
                file,
                inputs,
                llm,
                report,
                sequential,
                no_cache,
            };
            promptflow::cli::run::run(options, &settings, cli.verbose).await
        }
        Commands::Graph { file, format } => {
            promptflow::cli::graph::run(file, format, cli.verbose).await
        }
        Commands::Cache { action } => {
            promptflow::cli::cache::run(action, &settings, cli.verbose).await
        }
    }
}
