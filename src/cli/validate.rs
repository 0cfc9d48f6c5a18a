// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Validate command - check pipelines before running them

use colored::Colorize;
use miette::Result;
use std::path::{Path, PathBuf};

use crate::collection::{load_pipeline, COMPILED_EXTENSION, SOURCE_EXTENSION};
use crate::errors::{LogicError, PromptflowError};
use crate::pipeline::{PipelineValidator, ValidationResult};
use crate::utils::{print_error, print_success, print_warning};

/// Run the validate command
pub async fn run(path: PathBuf, verbose: bool) -> Result<()> {
    println!("{}", "Validating pipelines...".bold());
    println!();

    if !path.exists() {
        return Err(miette::miette!("Path not found: {}", path.display()));
    }

    let files = if path.is_dir() {
        pipeline_files(&path)?
    } else {
        vec![path]
    };

    if files.is_empty() {
        print_warning("No pipeline files found");
        return Ok(());
    }

    let mut failures = 0;
    let mut seen_urls: Vec<String> = Vec::new();

    for file in &files {
        match check_file(file, &mut seen_urls) {
            Ok(result) => {
                print_success(&file.display().to_string());
                for warning in &result.warnings {
                    println!("    {} {}", "⚠".yellow(), warning);
                }
                if verbose {
                    println!("    Order: {}", result.execution_order.join(" → ").dimmed());
                }
            }
            Err(e) => {
                failures += 1;
                print_error(&file.display().to_string());
                println!("    {}", e.to_string().red());
            }
        }
    }

    if verbose {
        println!();
        println!("  Checked {} file(s)", files.len());
    }

    println!();

    if failures > 0 {
        Err(miette::miette!("{} pipeline(s) failed validation", failures))
    } else {
        println!("{}", "All pipelines are valid!".green().bold());
        Ok(())
    }
}

/// Validate one file, tracking URLs across a directory run
fn check_file(file: &Path, seen_urls: &mut Vec<String>) -> Result<ValidationResult, PromptflowError> {
    let pipeline = load_pipeline(file)?;
    let result = PipelineValidator::new().validate(&pipeline)?;

    if let Some(url) = &pipeline.pipeline_url {
        if seen_urls.contains(url) {
            return Err(LogicError::DuplicatePipelineUrl { url: url.clone() }.into());
        }
        seen_urls.push(url.clone());
    }

    Ok(result)
}

fn pipeline_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for extension in [SOURCE_EXTENSION, COMPILED_EXTENSION] {
        let pattern = dir.join("**").join(format!("*.{}", extension));
        let paths = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| miette::miette!("Invalid pattern: {}", e))?;
        files.extend(paths.flatten());
    }
    files.sort();
    Ok(files)
}
