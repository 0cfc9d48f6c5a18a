// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Run command - execute a pipeline

use colored::Colorize;
use miette::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{load_pipeline, LlmBackend};
use crate::cache::CachedGenerator;
use crate::config::Settings;
use crate::executors::{
    ExecutionTools, FunctionRegistry, MockedEchoGenerator, MockedFakeGenerator,
    ShellScriptRunner, StdioInterface, TextGenerator,
};
use crate::pipeline::{PipelineExecutor, PipelineValidator, TaskStatus};
use crate::utils::{create_progress_bar, format_usage, print_section, status_symbol, task_progress_callback};

/// Options of the run command
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub file: PathBuf,
    pub inputs: Vec<String>,
    pub llm: LlmBackend,
    pub report: Option<PathBuf>,
    pub sequential: bool,
    pub no_cache: bool,
}

/// Run the pipeline
pub async fn run(options: RunOptions, settings: &Settings, verbose: bool) -> Result<()> {
    let pipeline = load_pipeline(&options.file)?;
    let inputs = parse_inputs(&options.inputs)?;

    if verbose {
        let validation = PipelineValidator::new().validate(&pipeline)?;
        for warning in &validation.warnings {
            eprintln!("  {} {}", "⚠".yellow(), warning);
        }
    }

    let tools = build_tools(options.llm, settings, options.no_cache)?;

    let mut execution = settings.execution_settings();
    if options.sequential {
        execution = execution.sequential();
    }

    println!(
        "{} {}",
        "Running".bold(),
        pipeline.pipeline_url.as_deref().unwrap_or(&pipeline.title)
    );

    let task_count = pipeline.tasks.len() as u64;
    let executor = PipelineExecutor::new(pipeline, tools, execution)?;

    let bar = create_progress_bar(task_count, "Starting");
    let outcome = executor
        .execute(inputs, Some(task_progress_callback(bar.clone(), verbose)))
        .await?;
    bar.finish_and_clear();

    if let Some(path) = &options.report {
        let json = outcome.report.to_json()?;
        std::fs::write(path, json)
            .map_err(|e| miette::miette!("Failed to write report {}: {}", path.display(), e))?;
        debug!(path = %path.display(), "Report written");
    }

    print_section("Tasks");
    for task in &outcome.report.tasks {
        let attempts = match task.attempts_used {
            0 if task.joker_used.is_some() => " (joker)".to_string(),
            0 | 1 => String::new(),
            n => format!(" ({} attempts)", n),
        };
        println!("  {} {}{}", status_symbol(task.status), task.title, attempts.dimmed());
        if task.status == TaskStatus::Failed {
            if let Some(error) = &task.error {
                println!("    {}", error.message.red());
            }
        }
    }

    if !outcome.output_parameters.is_empty() {
        print_section("Outputs");
        for (name, value) in &outcome.output_parameters {
            println!("  {} = {}", format!("{{{}}}", name).cyan(), value);
        }
    }

    if verbose {
        print_section("Usage");
        println!("  {}", format_usage(&outcome.usage));
    }

    println!();

    if outcome.is_successful {
        println!("{}", "Pipeline completed successfully!".green().bold());
        Ok(())
    } else {
        let run_errors: Vec<_> = outcome.errors.iter().filter(|e| e.task.is_none()).collect();
        for error in &run_errors {
            eprintln!("  {} {}", "✗".red(), error);
        }
        Err(miette::miette!(
            "Pipeline failed with {} error(s)",
            outcome.errors.len()
        ))
    }
}

/// Parse `name=value` pairs given on the command line
pub fn parse_inputs(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut inputs = BTreeMap::new();
    for pair in pairs {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| miette::miette!("Invalid input `{}`, expected NAME=VALUE", pair))?;
        let name = name.trim().trim_start_matches('{').trim_end_matches('}');
        if name.is_empty() {
            return Err(miette::miette!("Invalid input `{}`, missing parameter name", pair));
        }
        inputs.insert(name.to_string(), value.to_string());
    }
    Ok(inputs)
}

/// Assemble the capabilities the CLI offers to the engine
fn build_tools(llm: LlmBackend, settings: &Settings, no_cache: bool) -> Result<ExecutionTools> {
    let generator: Arc<dyn TextGenerator> = match llm {
        LlmBackend::Echo => Arc::new(MockedEchoGenerator::new()),
        LlmBackend::Fake => Arc::new(MockedFakeGenerator::new(settings.mock.loop_limit)),
    };

    let generator: Arc<dyn TextGenerator> = if settings.cache.enabled && !no_cache {
        debug!(dir = %settings.cache.directory.display(), "Caching text generation");
        Arc::new(CachedGenerator::on_disk(
            generator,
            settings.cache.directory.clone(),
        )?)
    } else {
        generator
    };

    let shell = ShellScriptRunner::new(settings.shell.shell.clone());
    if !shell.is_available() {
        warn!(shell = %shell.shell(), "Shell not found on PATH, SCRIPT tasks will fail");
    }

    Ok(ExecutionTools::new()
        .with_shared_llm(generator)
        .with_script(FunctionRegistry::with_builtins())
        .with_script(shell)
        .with_user_interface(StdioInterface::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inputs() {
        let inputs = parse_inputs(&[
            "name=Ada".to_string(),
            "{topic}=a=b".to_string(),
            "empty=".to_string(),
        ])
        .unwrap();

        assert_eq!(inputs["name"], "Ada");
        assert_eq!(inputs["topic"], "a=b");
        assert_eq!(inputs["empty"], "");
    }

    #[test]
    fn test_parse_inputs_rejects_missing_separator() {
        assert!(parse_inputs(&["name".to_string()]).is_err());
        assert!(parse_inputs(&["=value".to_string()]).is_err());
    }

    #[test]
    fn test_build_tools() {
        let settings = Settings::default();
        let tools = build_tools(LlmBackend::Echo, &settings, false).unwrap();

        assert_eq!(tools.llm.len(), 1);
        assert!(tools.function_runner("trim").is_some());
        assert!(tools.language_runner("bash").is_some());
        assert_eq!(tools.user_interface.len(), 1);
    }
}
