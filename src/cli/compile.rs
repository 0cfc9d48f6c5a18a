// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Compile command - print the compiled pipeline

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use super::{load_pipeline, CompileFormat};

/// Run the compile command
pub async fn run(
    file: PathBuf,
    format: CompileFormat,
    output: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let pipeline = load_pipeline(&file)?;

    let rendered = match format {
        CompileFormat::Json => pipeline.to_json()?,
        CompileFormat::Yaml => pipeline.to_yaml()?,
    };

    match output {
        Some(path) => {
            std::fs::write(&path, format!("{}\n", rendered.trim_end())).map_err(|e| {
                miette::miette!("Failed to write '{}': {}", path.display(), e)
            })?;

            if verbose {
                eprintln!(
                    "  {} {} ({} tasks) -> {}",
                    "✓".green(),
                    pipeline.title.bold(),
                    pipeline.tasks.len(),
                    path.display()
                );
            }
        }
        None => println!("{}", rendered.trim_end()),
    }

    Ok(())
}
