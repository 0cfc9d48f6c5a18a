// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Pipeline document model
//!
//! The compiled, backend-agnostic form of a pipeline. It serializes to a
//! stable camelCase JSON document that the engine can load across process
//! boundaries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Compiled pipeline document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    /// Identity URL, unique across any collection the pipeline is loaded into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_url: Option<String>,

    /// Human title (first heading of the source)
    pub title: String,

    /// Declared dialect version
    pub dialect_version: String,

    /// Markdown description between the title and the header commands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Parameters in declaration order
    pub parameters: Vec<Parameter>,

    /// Tasks in document order (not execution order)
    pub tasks: Vec<Task>,

    /// Attached reference material
    #[serde(default)]
    pub knowledge: Vec<KnowledgePiece>,
}

impl Pipeline {
    /// Load a compiled pipeline from JSON
    pub fn from_json(json: &str) -> Result<Self, crate::PromptflowError> {
        serde_json::from_str(json).map_err(Into::into)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, crate::PromptflowError> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String, crate::PromptflowError> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    /// Get a parameter by name
    pub fn get_parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Get a task by name
    pub fn get_task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Task producing the given parameter
    pub fn producer_of(&self, parameter: &str) -> Option<&Task> {
        self.tasks
            .iter()
            .find(|t| t.resulting_parameter_name == parameter)
    }

    pub fn input_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.is_input)
    }

    pub fn output_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.is_output)
    }

    /// Get all task names
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }
}

/// A named value, bound at most once per run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub is_input: bool,

    #[serde(default)]
    pub is_output: bool,
}

impl Parameter {
    /// Parameter that is neither input nor output
    pub fn intermediate(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            is_input: false,
            is_output: false,
        }
    }
}

/// One step producing exactly one parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Normalized identifier derived from the title
    pub name: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub execution_type: ExecutionType,

    /// Parameters whose values the content needs
    pub dependent_parameter_names: BTreeSet<String>,

    /// Only meaningful for model-backed tasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_requirements: Option<ModelRequirements>,

    /// Language of the fenced block (`markdown`, `javascript`, `bash`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,

    /// Template with `{parameterName}` placeholders, or a script body
    pub content: String,

    pub resulting_parameter_name: String,

    /// Postprocessing function names, applied in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub postprocessing: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expectations: Vec<Expectation>,

    /// Parameters reused verbatim when they already satisfy the expectations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joker_parameter_names: Vec<String>,
}

impl Task {
    /// Every parameter that must be resolved before this task may start
    pub fn required_parameter_names(&self) -> BTreeSet<&str> {
        self.dependent_parameter_names
            .iter()
            .chain(self.joker_parameter_names.iter())
            .map(String::as_str)
            .collect()
    }

    /// Whether the task reads the given parameter (content or joker)
    pub fn reads(&self, parameter: &str) -> bool {
        self.dependent_parameter_names.contains(parameter)
            || self.joker_parameter_names.iter().any(|j| j == parameter)
    }
}

/// How a task produces its result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionType {
    /// Model-backed generation
    PromptTemplate,
    /// Substitution only, no model call
    SimpleTemplate,
    /// External script
    Script,
    /// Ask the user
    PromptDialog,
}

impl std::fmt::Display for ExecutionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PromptTemplate => write!(f, "prompt template"),
            Self::SimpleTemplate => write!(f, "simple template"),
            Self::Script => write!(f, "script"),
            Self::PromptDialog => write!(f, "prompt dialog"),
        }
    }
}

/// General kind of text-generation model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModelVariant {
    Completion,
    #[default]
    Chat,
}

impl std::fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completion => write!(f, "COMPLETION"),
            Self::Chat => write!(f, "CHAT"),
        }
    }
}

/// Abstract requirements on the model, not a concrete model version
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRequirements {
    pub model_variant: ModelVariant,

    /// Concrete model; the adapter picks its default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Constraint on a task's postprocessed output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Expectation {
    Amount {
        sign: ExpectationSign,
        unit: ExpectationUnit,
        amount: u32,
    },
    Format { format: ExpectFormat },
}

impl std::fmt::Display for Expectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Amount { sign, unit, amount } => write!(f, "{} {} {}", sign, amount, unit),
            Self::Format { format } => write!(f, "format {}", format),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExpectationSign {
    Exactly,
    Minimum,
    Maximum,
}

impl std::fmt::Display for ExpectationSign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exactly => write!(f, "exactly"),
            Self::Minimum => write!(f, "minimum"),
            Self::Maximum => write!(f, "maximum"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectationUnit {
    Characters,
    Words,
    Sentences,
    Lines,
    Paragraphs,
    Pages,
}

impl ExpectationUnit {
    pub const ALL: [ExpectationUnit; 6] = [
        Self::Characters,
        Self::Words,
        Self::Sentences,
        Self::Lines,
        Self::Paragraphs,
        Self::Pages,
    ];
}

impl std::fmt::Display for ExpectationUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Characters => write!(f, "characters"),
            Self::Words => write!(f, "words"),
            Self::Sentences => write!(f, "sentences"),
            Self::Lines => write!(f, "lines"),
            Self::Paragraphs => write!(f, "paragraphs"),
            Self::Pages => write!(f, "pages"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExpectFormat {
    Json,
}

impl std::fmt::Display for ExpectFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "JSON"),
        }
    }
}

/// External reference material attached to a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgePiece {
    pub name: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub sources: Vec<KnowledgeSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeSource {
    pub title: String,
    pub href: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compiled_document() {
        let json = r#"{
            "pipelineUrl": "https://example.com/greeting.ptbk.md",
            "title": "Greeting",
            "dialectVersion": "1.0.0",
            "parameters": [
                { "name": "yourName", "isInput": true, "isOutput": false },
                { "name": "greeting", "isInput": false, "isOutput": true }
            ],
            "tasks": [
                {
                    "name": "question",
                    "title": "Question",
                    "executionType": "SIMPLE_TEMPLATE",
                    "dependentParameterNames": ["yourName"],
                    "content": "{yourName} the Evangelist",
                    "resultingParameterName": "greeting",
                    "expectations": [
                        { "type": "AMOUNT", "sign": "MINIMUM", "unit": "words", "amount": 2 },
                        { "type": "FORMAT", "format": "JSON" }
                    ]
                }
            ]
        }"#;

        let pipeline = Pipeline::from_json(json).unwrap();
        assert_eq!(pipeline.title, "Greeting");
        assert_eq!(pipeline.input_parameters().count(), 1);
        assert!(pipeline.knowledge.is_empty());

        let task = pipeline.get_task("question").unwrap();
        assert_eq!(task.execution_type, ExecutionType::SimpleTemplate);
        assert_eq!(task.expectations.len(), 2);
        assert_eq!(
            task.expectations[0],
            Expectation::Amount {
                sign: ExpectationSign::Minimum,
                unit: ExpectationUnit::Words,
                amount: 2,
            }
        );
        assert_eq!(pipeline.producer_of("greeting").unwrap().name, "question");
    }

    #[test]
    fn test_round_trip_json() {
        let pipeline = Pipeline {
            pipeline_url: None,
            title: "Test".into(),
            dialect_version: "1.0.0".into(),
            description: Some("A test pipeline".into()),
            parameters: vec![Parameter::intermediate("a")],
            tasks: vec![Task {
                name: "make-a".into(),
                title: "Make a".into(),
                description: None,
                execution_type: ExecutionType::PromptTemplate,
                dependent_parameter_names: BTreeSet::new(),
                model_requirements: Some(ModelRequirements {
                    model_variant: ModelVariant::Completion,
                    model_name: Some("gpt-3.5-turbo-instruct".into()),
                    max_tokens: Some(100),
                }),
                content_language: Some("markdown".into()),
                content: "Write something".into(),
                resulting_parameter_name: "a".into(),
                postprocessing: vec!["trim".into()],
                expectations: vec![],
                joker_parameter_names: vec![],
            }],
            knowledge: vec![],
        };

        let json = pipeline.to_json().unwrap();
        assert!(json.contains("\"modelVariant\": \"COMPLETION\""));
        assert!(json.contains("\"executionType\": \"PROMPT_TEMPLATE\""));
        let parsed = Pipeline::from_json(&json).unwrap();
        assert_eq!(parsed, pipeline);

        let yaml = pipeline.to_yaml().unwrap();
        assert!(yaml.contains("resultingParameterName: a"));
    }

    #[test]
    fn test_required_parameters_include_jokers() {
        let task = Task {
            name: "t".into(),
            title: "T".into(),
            description: None,
            execution_type: ExecutionType::SimpleTemplate,
            dependent_parameter_names: ["x".to_string()].into_iter().collect(),
            model_requirements: None,
            content_language: None,
            content: "{x}".into(),
            resulting_parameter_name: "y".into(),
            postprocessing: vec![],
            expectations: vec![],
            joker_parameter_names: vec!["draft".into()],
        };

        let required: Vec<_> = task.required_parameter_names().into_iter().collect();
        assert_eq!(required, vec!["draft", "x"]);
        assert!(task.reads("draft"));
        assert!(!task.reads("y"));
    }
}
