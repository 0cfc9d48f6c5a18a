// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Pipeline executor
//!
//! Runs the tasks of a validated pipeline in dependency order. Any task
//! whose parameters are all resolved may run, up to the configured
//! parallelism. Each task runs its attempts sequentially: substitute,
//! try jokers, dispatch, postprocess, check expectations, retry while
//! attempts remain.
//!
//! Task failures are recorded in the report and never abort the run; only
//! internal faults (`Unexpected` errors) do.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::report::{
    AttemptReport, ErrorRecord, ExecutionReport, TaskProgress, TaskReport, TaskStatus,
};
use super::{DagBuilder, ExecutionType, ModelVariant, Pipeline, PipelineValidator, Task, Usage};
use crate::compiler::placeholder_regex;
use crate::errors::{PromptflowError, PromptflowResult};
use crate::executors::{ExecutionTools, Prompt, PromptResult, UserPrompt};
use crate::expectations::{check_expectations, is_passing_expectations};

/// Bounds threaded into one executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSettings {
    /// Dispatches per task before it fails for good
    pub max_execution_attempts: u32,
    /// Tasks allowed to run at the same time
    pub max_parallel_count: usize,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_execution_attempts: 3,
            max_parallel_count: 5,
        }
    }
}

impl ExecutionSettings {
    /// Run one task at a time
    pub fn sequential(mut self) -> Self {
        self.max_parallel_count = 1;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_execution_attempts = attempts;
        self
    }

    pub fn validate(&self) -> PromptflowResult<()> {
        if self.max_execution_attempts == 0 {
            return Err(PromptflowError::Config {
                message: "max_execution_attempts must be at least 1".into(),
            });
        }
        if self.max_parallel_count == 0 {
            return Err(PromptflowError::Config {
                message: "max_parallel_count must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Cloneable flag asking a running execution to stop
///
/// Checked before a task starts, before each retry and after each
/// backend call. Running calls are not interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal(Arc<AtomicBool>);

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receives every task status transition
///
/// Called from a blocking thread outside the runtime, so a slow callback
/// delays later notifications but never the tasks themselves. A run
/// returns only after every notification has been delivered.
pub type ProgressCallback = Arc<dyn Fn(TaskProgress) + Send + Sync>;

/// Result of one run
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Every task succeeded and every output parameter resolved
    pub is_successful: bool,
    pub usage: Usage,
    pub errors: Vec<ErrorRecord>,
    pub report: ExecutionReport,
    /// Resolved parameters marked as outputs
    pub output_parameters: BTreeMap<String, String>,
    /// Every parameter resolved during the run, inputs included
    pub resolved_parameters: BTreeMap<String, String>,
}

/// Replace each `{name}` with its value in one pass
///
/// Values are inserted verbatim, so placeholders inside values are never
/// expanded. A placeholder without a value is an internal fault.
pub fn substitute_parameters(
    template: &str,
    parameters: &BTreeMap<String, String>,
) -> PromptflowResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in placeholder_regex().captures_iter(template) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let name = &caps[1];
        let value = parameters.get(name).ok_or_else(|| {
            PromptflowError::unexpected(format!("Parameter {{{}}} is not resolved", name))
        })?;

        out.push_str(&template[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }

    out.push_str(&template[last..]);
    Ok(out)
}

/// Fire-and-forget delivery of progress notifications
///
/// Notifications go through an unbounded channel to a consumer on the
/// blocking pool, so the scheduler never waits on the callback.
#[derive(Clone)]
struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<TaskProgress>>,
}

impl ProgressSink {
    fn spawn(callback: Option<ProgressCallback>) -> (Self, Option<JoinHandle<()>>) {
        let Some(callback) = callback else {
            return (Self { tx: None }, None);
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<TaskProgress>();
        let consumer = tokio::task::spawn_blocking(move || {
            while let Some(progress) = rx.blocking_recv() {
                callback(progress);
            }
        });

        (Self { tx: Some(tx) }, Some(consumer))
    }

    fn emit(&self, task: &Task, status: TaskStatus, attempt: u32, message: Option<String>) {
        if let Some(tx) = &self.tx {
            // A closed channel only means nobody listens anymore
            let _ = tx.send(TaskProgress {
                task_name: task.name.clone(),
                task_title: task.title.clone(),
                status,
                attempt,
                message,
            });
        }
    }
}

/// Pipeline executor
pub struct PipelineExecutor {
    pipeline: Arc<Pipeline>,
    tools: Arc<ExecutionTools>,
    settings: ExecutionSettings,
    /// Task indices in topological order
    order: Vec<usize>,
}

impl PipelineExecutor {
    /// Create an executor for a pipeline
    ///
    /// The pipeline is validated here; an invalid one never reaches the
    /// scheduler.
    pub fn new(
        pipeline: Pipeline,
        tools: ExecutionTools,
        settings: ExecutionSettings,
    ) -> PromptflowResult<Self> {
        settings.validate()?;
        PipelineValidator::new().validate(&pipeline)?;
        let order = DagBuilder::build(&pipeline).topological_order()?;

        Ok(Self {
            pipeline: Arc::new(pipeline),
            tools: Arc::new(tools),
            settings,
            order,
        })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    /// Execute the pipeline once
    pub async fn execute(
        &self,
        inputs: BTreeMap<String, String>,
        on_progress: Option<ProgressCallback>,
    ) -> PromptflowResult<ExecutionOutcome> {
        self.execute_with_cancel(inputs, on_progress, CancellationSignal::new())
            .await
    }

    /// Execute the pipeline once, stopping early when `cancel` is set
    pub async fn execute_with_cancel(
        &self,
        inputs: BTreeMap<String, String>,
        on_progress: Option<ProgressCallback>,
        cancel: CancellationSignal,
    ) -> PromptflowResult<ExecutionOutcome> {
        let (progress, consumer) = ProgressSink::spawn(on_progress);
        let outcome = self.run(inputs, &progress, &cancel).await;

        drop(progress);
        if let Some(consumer) = consumer {
            if let Err(e) = consumer.await {
                warn!("Progress callback failed: {}", e);
            }
        }

        outcome
    }

    async fn run(
        &self,
        inputs: BTreeMap<String, String>,
        progress: &ProgressSink,
        cancel: &CancellationSignal,
    ) -> PromptflowResult<ExecutionOutcome> {
        let pipeline = &self.pipeline;
        let started_at = SystemTime::now();
        let start = Instant::now();

        let mut resolved: BTreeMap<String, String> = BTreeMap::new();
        let mut errors: Vec<ErrorRecord> = Vec::new();
        let mut reports: Vec<TaskReport> = pipeline.tasks.iter().map(TaskReport::pending).collect();

        for (name, value) in inputs {
            match pipeline.get_parameter(&name) {
                Some(parameter) if parameter.is_input => {
                    resolved.insert(name, value);
                }
                _ => warn!(parameter = %name, "Ignoring value for undeclared input parameter"),
            }
        }

        for parameter in pipeline.input_parameters() {
            if !resolved.contains_key(&parameter.name) {
                let error = PromptflowError::execution(format!(
                    "Input parameter {{{}}} was not given",
                    parameter.name
                ));
                warn!("{}", error);
                errors.push(ErrorRecord::new(None, &error));
            }
        }

        for task in &pipeline.tasks {
            progress.emit(task, TaskStatus::Pending, 0, None);
        }

        let mut running: JoinSet<(usize, TaskRun)> = JoinSet::new();

        loop {
            if !cancel.is_cancelled() {
                for &idx in &self.order {
                    if running.len() >= self.settings.max_parallel_count {
                        break;
                    }
                    if reports[idx].status != TaskStatus::Pending {
                        continue;
                    }

                    let task = &pipeline.tasks[idx];
                    let required = task.required_parameter_names();
                    if !required.iter().all(|p| resolved.contains_key(*p)) {
                        continue;
                    }

                    reports[idx].status = TaskStatus::Ready;
                    progress.emit(task, TaskStatus::Ready, 0, None);

                    let parameters = required
                        .into_iter()
                        .filter_map(|p| resolved.get(p).map(|v| (p.to_string(), v.clone())))
                        .collect();

                    let context = TaskContext {
                        pipeline: Arc::clone(&self.pipeline),
                        tools: Arc::clone(&self.tools),
                        index: idx,
                        parameters,
                        max_attempts: self.settings.max_execution_attempts,
                        progress: progress.clone(),
                        cancel: cancel.clone(),
                    };

                    reports[idx].status = TaskStatus::Dispatching;
                    running.spawn(async move { (idx, context.run().await) });
                }
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            let (idx, TaskRun { mut report, outcome }) = joined
                .map_err(|e| PromptflowError::unexpected(format!("Task worker failed: {}", e)))?;
            let task = &pipeline.tasks[idx];

            match outcome {
                TaskOutcome::Succeeded(value) => {
                    if resolved.contains_key(&task.resulting_parameter_name) {
                        return Err(PromptflowError::unexpected(format!(
                            "Parameter {{{}}} is resolved more than once",
                            task.resulting_parameter_name
                        )));
                    }

                    info!(
                        task = %task.name,
                        attempts = report.attempts_used,
                        joker = report.joker_used.is_some(),
                        "Task succeeded"
                    );
                    report.status = TaskStatus::Succeeded;
                    report.result = Some(value.clone());
                    resolved.insert(task.resulting_parameter_name.clone(), value);
                    progress.emit(task, TaskStatus::Succeeded, report.attempts_used, None);
                }
                TaskOutcome::Failed(error) => {
                    if matches!(error, PromptflowError::Unexpected { .. }) {
                        return Err(error);
                    }

                    warn!(task = %task.name, attempts = report.attempts_used, "Task failed: {}", error);
                    let record = ErrorRecord::new(Some(&task.name), &error);
                    report.status = TaskStatus::Failed;
                    report.error = Some(record.clone());
                    errors.push(record);
                    progress.emit(
                        task,
                        TaskStatus::Failed,
                        report.attempts_used,
                        Some(error.to_string()),
                    );
                }
                TaskOutcome::Cancelled => {
                    debug!(task = %task.name, "Task cancelled");
                    report.status = TaskStatus::Cancelled;
                    progress.emit(task, TaskStatus::Cancelled, report.attempts_used, None);
                }
            }

            reports[idx] = report;
        }

        let cancelled = cancel.is_cancelled();
        for (idx, report) in reports.iter_mut().enumerate() {
            if report.status == TaskStatus::Pending {
                report.status = if cancelled {
                    TaskStatus::Cancelled
                } else {
                    TaskStatus::Skipped
                };
                progress.emit(&pipeline.tasks[idx], report.status, 0, None);
            }
        }

        if cancelled && reports.iter().any(|r| r.status == TaskStatus::Cancelled) {
            errors.push(ErrorRecord::new(
                None,
                &PromptflowError::execution_final("Execution was cancelled"),
            ));
        }

        let output_parameters: BTreeMap<String, String> = pipeline
            .output_parameters()
            .filter_map(|p| resolved.get(&p.name).map(|v| (p.name.clone(), v.clone())))
            .collect();
        let all_outputs = pipeline
            .output_parameters()
            .all(|p| output_parameters.contains_key(&p.name));
        let is_successful = errors.is_empty() && all_outputs;
        let usage: Usage = reports.iter().map(|r| &r.usage).sum();

        info!(
            pipeline = %pipeline.title,
            successful = is_successful,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Pipeline finished"
        );

        let report = ExecutionReport {
            pipeline_url: pipeline.pipeline_url.clone(),
            title: pipeline.title.clone(),
            dialect_version: pipeline.dialect_version.clone(),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            is_successful,
            tasks: reports,
            usage,
            errors: errors.clone(),
            output_parameters: output_parameters.clone(),
        };

        Ok(ExecutionOutcome {
            is_successful,
            usage,
            errors,
            report,
            output_parameters,
            resolved_parameters: resolved,
        })
    }
}

enum TaskOutcome {
    Succeeded(String),
    Failed(PromptflowError),
    Cancelled,
}

struct TaskRun {
    report: TaskReport,
    outcome: TaskOutcome,
}

/// Everything one task needs, owned so it can run on its own worker
struct TaskContext {
    pipeline: Arc<Pipeline>,
    tools: Arc<ExecutionTools>,
    index: usize,
    /// Resolved values of the task's dependencies and jokers
    parameters: BTreeMap<String, String>,
    max_attempts: u32,
    progress: ProgressSink,
    cancel: CancellationSignal,
}

impl TaskContext {
    fn task(&self) -> &Task {
        &self.pipeline.tasks[self.index]
    }

    async fn run(self) -> TaskRun {
        let mut report = TaskReport::pending(self.task());
        report.started_at = Some(SystemTime::now());
        let start = Instant::now();

        let outcome = self.attempts(&mut report).await;

        report.duration_ms = start.elapsed().as_millis() as u64;
        report.usage = report.attempts.iter().map(|a| &a.usage).sum();
        TaskRun { report, outcome }
    }

    async fn attempts(&self, report: &mut TaskReport) -> TaskOutcome {
        let task = self.task();

        let content = if task.execution_type == ExecutionType::Script {
            task.content.clone()
        } else {
            match substitute_parameters(&task.content, &self.parameters) {
                Ok(content) => content,
                Err(e) => return TaskOutcome::Failed(e),
            }
        };
        report.substituted_content = Some(content.clone());

        if let Some((joker, value)) = self.passing_joker() {
            debug!(task = %task.name, joker = %joker, "Joker already meets expectations");
            report.joker_used = Some(joker.to_string());
            return TaskOutcome::Succeeded(value.to_string());
        }

        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            if self.cancel.is_cancelled() {
                return TaskOutcome::Cancelled;
            }

            report.attempts_used = attempt;
            self.progress.emit(task, TaskStatus::Dispatching, attempt, None);

            let mut record = AttemptReport::new(attempt);
            let result = self.attempt(&content, &mut record).await;
            if let Err(e) = &result {
                record.error = Some(e.to_string());
            }
            report.attempts.push(record);

            if self.cancel.is_cancelled() {
                return TaskOutcome::Cancelled;
            }

            match result {
                Ok(value) => return TaskOutcome::Succeeded(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(task = %task.name, attempt, "Attempt failed, retrying: {}", e);
                    last_error = Some(e);
                }
                Err(e) => return TaskOutcome::Failed(e),
            }
        }

        TaskOutcome::Failed(last_error.unwrap_or_else(|| {
            PromptflowError::unexpected(format!("Task '{}' was never attempted", task.name))
        }))
    }

    /// One full regeneration: dispatch, postprocess, check
    async fn attempt(&self, content: &str, record: &mut AttemptReport) -> PromptflowResult<String> {
        let task = self.task();
        debug!(
            task = %task.name,
            execution_type = %task.execution_type,
            attempt = record.attempt,
            "Dispatching task"
        );

        let output = self.dispatch(content, record).await?;
        let value = self.postprocess(output).await?;
        record.result = Some(value.clone());

        check_expectations(&task.expectations, &value)?;
        Ok(value)
    }

    async fn dispatch(&self, content: &str, record: &mut AttemptReport) -> PromptflowResult<String> {
        let task = self.task();

        match task.execution_type {
            ExecutionType::SimpleTemplate => Ok(content.to_string()),
            ExecutionType::PromptTemplate => {
                let result = self.call_model(content).await?;
                record.model_name = Some(result.model_name);
                record.raw_response = Some(result.raw_response);
                record.timing = Some(result.timing);
                record.usage = result.usage;
                Ok(result.content)
            }
            ExecutionType::Script => {
                let language = task.content_language.as_deref().unwrap_or_default();
                let runner = self.tools.language_runner(language).ok_or_else(|| {
                    PromptflowError::execution_final(format!(
                        "No script runner can run {} scripts",
                        language
                    ))
                })?;

                let dependencies: BTreeMap<String, String> = self
                    .parameters
                    .iter()
                    .filter(|(name, _)| task.dependent_parameter_names.contains(*name))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();
                runner.execute_script(language, content, &dependencies).await
            }
            ExecutionType::PromptDialog => {
                let ui = self.tools.user_interface().ok_or_else(|| {
                    PromptflowError::execution_final(format!(
                        "Task '{}' asks the user but no user interface is configured",
                        task.name
                    ))
                })?;
                ui.prompt_text(&UserPrompt {
                    title: task.title.clone(),
                    message: content.to_string(),
                    default_value: None,
                })
                .await
            }
        }
    }

    async fn call_model(&self, content: &str) -> PromptflowResult<PromptResult> {
        let task = self.task();
        let requirements = task.model_requirements.clone().unwrap_or_default();
        let llm = self.tools.generator_for(&requirements).await?;

        let prompt = Prompt {
            title: task.title.clone(),
            content: content.to_string(),
            model_requirements: requirements,
            expectations: task.expectations.clone(),
        };

        match prompt.model_requirements.model_variant {
            ModelVariant::Chat => llm.chat(&prompt).await,
            ModelVariant::Completion => llm.complete(&prompt).await,
        }
    }

    async fn postprocess(&self, mut value: String) -> PromptflowResult<String> {
        for name in &self.task().postprocessing {
            let runner = self.tools.function_runner(name).ok_or_else(|| {
                PromptflowError::execution_final(format!(
                    "No script runner provides postprocessing function `{}`",
                    name
                ))
            })?;
            value = runner.call_function(name, &value, &self.parameters).await?;
        }
        Ok(value)
    }

    /// First joker whose current value already meets every expectation
    fn passing_joker(&self) -> Option<(&str, &str)> {
        let task = self.task();
        task.joker_parameter_names.iter().find_map(|joker| {
            let value = self.parameters.get(joker)?;
            is_passing_expectations(&task.expectations, value)
                .then_some((joker.as_str(), value.as_str()))
        })
    }
}
