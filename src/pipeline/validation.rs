// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Pipeline validation
//!
//! A read-only pass that proves a compiled pipeline is well-formed before
//! it is executed. Rules run in a fixed order and the first violation is
//! returned: structure, resolution, expectations, jokers, models, dead
//! parameters, cycles.

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use crate::errors::LogicError;
use crate::executors::AvailableModel;
use crate::pipeline::{
    DagBuilder, ExecutionType, Expectation, ExpectationSign, ExpectationUnit, Pipeline, Task,
};

/// Pipeline validator
#[derive(Debug, Clone, Default)]
pub struct PipelineValidator {
    /// Registry used for the model rule; `None` skips the rule
    known_models: Option<Vec<AvailableModel>>,
}

impl PipelineValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `MODEL NAME` commands against a model registry
    pub fn with_known_models(mut self, models: impl IntoIterator<Item = AvailableModel>) -> Self {
        self.known_models = Some(models.into_iter().collect());
        self
    }

    /// Validate a pipeline, failing on the first violation
    pub fn validate(&self, pipeline: &Pipeline) -> Result<ValidationResult, LogicError> {
        let mut result = ValidationResult::new();

        Self::check_structure(pipeline)?;
        Self::check_resolution(pipeline)?;
        Self::check_expectations(pipeline)?;
        Self::check_jokers(pipeline)?;
        self.check_models(pipeline)?;
        Self::check_dead_parameters(pipeline)?;

        let dag = DagBuilder::build(pipeline);
        if let Some(tasks) = dag.find_cycle() {
            return Err(LogicError::CircularDependencies { tasks });
        }
        result.execution_order = dag.topological_order_names()?;

        if pipeline.pipeline_url.is_none() {
            result.add_warning("Pipeline has no PIPELINE URL and can not be added to a collection");
        }
        if pipeline.tasks.is_empty() {
            result.add_warning("Pipeline has no tasks");
        }
        if self.known_models.is_none() {
            let named = pipeline
                .tasks
                .iter()
                .filter(|t| model_name_of(t).is_some())
                .count();
            if named > 0 {
                result.add_warning(&format!(
                    "{} task(s) name a model, but no model registry was given to check them",
                    named
                ));
            }
        }

        debug!(title = %pipeline.title, "Pipeline is valid");
        Ok(result)
    }

    fn check_structure(pipeline: &Pipeline) -> Result<(), LogicError> {
        let mut seen = HashSet::new();
        for parameter in &pipeline.parameters {
            if !seen.insert(parameter.name.as_str()) {
                return Err(LogicError::DuplicateParameter {
                    name: parameter.name.clone(),
                });
            }
        }

        let mut seen = HashSet::new();
        for task in &pipeline.tasks {
            if !seen.insert(task.name.as_str()) {
                return Err(LogicError::DuplicateTask {
                    name: task.name.clone(),
                });
            }
        }

        // Writers per parameter, in document order
        let mut writers: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for task in &pipeline.tasks {
            writers
                .entry(task.resulting_parameter_name.as_str())
                .or_default()
                .push(task.name.clone());
        }
        for task in &pipeline.tasks {
            let name = task.resulting_parameter_name.as_str();
            if let Some(tasks) = writers.get(name).filter(|tasks| tasks.len() > 1) {
                return Err(LogicError::MultipleWriters {
                    name: name.to_string(),
                    tasks: tasks.clone(),
                });
            }
        }

        for task in &pipeline.tasks {
            match pipeline.get_parameter(&task.resulting_parameter_name) {
                Some(parameter) if parameter.is_input => {
                    return Err(LogicError::InputOverwritten {
                        name: parameter.name.clone(),
                        task: task.name.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    return Err(LogicError::UnresolvedParameter {
                        name: task.resulting_parameter_name.clone(),
                        context: format!("is produced by task '{}' but never declared", task.name),
                    });
                }
            }
        }

        Ok(())
    }

    fn is_resolvable(pipeline: &Pipeline, name: &str) -> bool {
        match pipeline.get_parameter(name) {
            Some(parameter) => parameter.is_input || pipeline.producer_of(name).is_some(),
            None => false,
        }
    }

    fn check_resolution(pipeline: &Pipeline) -> Result<(), LogicError> {
        for task in &pipeline.tasks {
            for name in &task.dependent_parameter_names {
                if !Self::is_resolvable(pipeline, name) {
                    return Err(LogicError::UnresolvedParameter {
                        name: name.clone(),
                        context: format!("needed by task '{}'", task.name),
                    });
                }
            }
        }

        for parameter in pipeline.output_parameters() {
            if !Self::is_resolvable(pipeline, &parameter.name) {
                return Err(LogicError::UnresolvedParameter {
                    name: parameter.name.clone(),
                    context: "is an output parameter but no task produces it".into(),
                });
            }
        }

        Ok(())
    }

    fn check_expectations(pipeline: &Pipeline) -> Result<(), LogicError> {
        for task in &pipeline.tasks {
            let mut minimums: HashMap<ExpectationUnit, u32> = HashMap::new();
            let mut maximums: HashMap<ExpectationUnit, u32> = HashMap::new();

            for expectation in &task.expectations {
                let Expectation::Amount { sign, unit, amount } = *expectation else {
                    continue;
                };

                if amount == 0 {
                    let bound = match sign {
                        ExpectationSign::Exactly => "Exact",
                        ExpectationSign::Minimum => "Min",
                        ExpectationSign::Maximum => "Max",
                    };
                    return Err(LogicError::NonPositiveExpectation {
                        task: task.name.clone(),
                        bound: bound.into(),
                        unit: unit.to_string(),
                    });
                }

                if matches!(sign, ExpectationSign::Exactly | ExpectationSign::Minimum) {
                    let min = minimums.entry(unit).or_insert(amount);
                    *min = (*min).max(amount);
                }
                if matches!(sign, ExpectationSign::Exactly | ExpectationSign::Maximum) {
                    let max = maximums.entry(unit).or_insert(amount);
                    *max = (*max).min(amount);
                }
            }

            for unit in ExpectationUnit::ALL {
                if let (Some(&min), Some(&max)) = (minimums.get(&unit), maximums.get(&unit)) {
                    if min > max {
                        return Err(LogicError::InvertedExpectation {
                            task: task.name.clone(),
                            unit: unit.to_string(),
                            min,
                            max,
                        });
                    }
                }
            }
        }

        Ok(())
    }

    fn check_jokers(pipeline: &Pipeline) -> Result<(), LogicError> {
        for task in &pipeline.tasks {
            let Some(first) = task.joker_parameter_names.first() else {
                continue;
            };

            if task.expectations.is_empty() {
                return Err(LogicError::JokerWithoutExpectations {
                    task: task.name.clone(),
                    parameter: first.clone(),
                });
            }

            for joker in &task.joker_parameter_names {
                if !Self::is_resolvable(pipeline, joker) {
                    return Err(LogicError::UnresolvedParameter {
                        name: joker.clone(),
                        context: format!("used as a joker in task '{}'", task.name),
                    });
                }
            }
        }

        Ok(())
    }

    fn check_models(&self, pipeline: &Pipeline) -> Result<(), LogicError> {
        let Some(known_models) = &self.known_models else {
            return Ok(());
        };

        for task in &pipeline.tasks {
            let Some(requirements) = &task.model_requirements else {
                continue;
            };
            let Some(model_name) = model_name_of(task) else {
                continue;
            };

            let is_known = known_models
                .iter()
                .any(|m| m.model_name == model_name && m.model_variant == requirements.model_variant);
            if !is_known {
                return Err(LogicError::UnknownModel {
                    task: task.name.clone(),
                    variant: requirements.model_variant.to_string(),
                    model_name: model_name.to_string(),
                });
            }
        }

        Ok(())
    }

    fn check_dead_parameters(pipeline: &Pipeline) -> Result<(), LogicError> {
        for parameter in &pipeline.parameters {
            if parameter.is_output {
                continue;
            }
            if !pipeline.tasks.iter().any(|t| t.reads(&parameter.name)) {
                return Err(LogicError::UnusedParameter {
                    name: parameter.name.clone(),
                });
            }
        }

        Ok(())
    }
}

fn model_name_of(task: &Task) -> Option<&str> {
    if task.execution_type != ExecutionType::PromptTemplate {
        return None;
    }
    task.model_requirements.as_ref()?.model_name.as_deref()
}

/// Outcome of a successful validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    /// Task names in one valid execution order
    pub execution_order: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
