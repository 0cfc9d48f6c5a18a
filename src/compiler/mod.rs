// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Dialect compiler
//!
//! Turns a markdown pipeline source into a [`Pipeline`] document. The
//! compiler checks syntax and placement only; dependency problems are left
//! to [`crate::pipeline::PipelineValidator`], and tasks keep their document
//! order.

pub mod command;
pub mod markdown;
pub mod names;
pub mod variables;

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::debug;

pub use command::{Command, CommandScope, ModelCommand, ParameterCommand};
pub use names::title_to_name;
pub use variables::{placeholder_regex, script_variables, template_parameters, ScriptLanguage};

use crate::errors::{PromptflowError, PromptflowResult};
use crate::pipeline::{
    ExecutionType, Expectation, ModelRequirements, Parameter, Pipeline, Task,
};
use markdown::{Block, Section};

static ARROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^->\s*\{([^}]*)\}\s*$").expect("valid arrow regex"));

/// Compile dialect source into a pipeline document
pub fn compile(source: &str) -> PromptflowResult<Pipeline> {
    let document = markdown::segment(source)?;

    let mut pipeline_url = None;
    let mut dialect_version = None;
    let mut parameters: Vec<Parameter> = Vec::new();
    let mut defaults = ModelDefaults::default();
    let mut description = Vec::new();

    for block in &document.preamble {
        match block {
            Block::ListItem { text, line } => match Command::parse(text, *line)? {
                Command::PipelineUrl(url) => {
                    if pipeline_url.replace(url).is_some() {
                        return Err(duplicate_command("PIPELINE URL", *line));
                    }
                }
                Command::DialectVersion(version) => {
                    if dialect_version.replace(version).is_some() {
                        return Err(duplicate_command("PROMPTBOOK VERSION", *line));
                    }
                }
                Command::Parameter(parameter) => declare_parameter(&mut parameters, parameter, *line)?,
                Command::Model(model) => defaults.apply(model, *line)?,
                other => {
                    return Err(PromptflowError::syntax_with_help(
                        *line,
                        format!("{} can only be used inside a task section", other.keyword()),
                        "Move it under a `##` task heading",
                    ))
                }
            },
            Block::Paragraph { text, .. } => description.push(text.as_str()),
            Block::Code { line, .. } | Block::Arrow { line, .. } => {
                return Err(PromptflowError::syntax_with_help(
                    *line,
                    "Content outside of a task section",
                    "Put code blocks and `->` lines under a `##` task heading",
                ))
            }
            Block::Heading { line, .. } => {
                return Err(PromptflowError::unexpected(format!(
                    "heading on line {} left in preamble",
                    line
                )))
            }
        }
    }

    let dialect_version = dialect_version.ok_or_else(|| {
        PromptflowError::syntax_with_help(
            1,
            "Missing dialect version",
            "Add `- PROMPTBOOK VERSION 1.0.0` to the pipeline header",
        )
    })?;

    let mut tasks = Vec::with_capacity(document.sections.len());
    for section in &document.sections {
        tasks.push(compile_section(section, &defaults, &mut parameters)?);
    }

    if parameters.is_empty() {
        return Err(PromptflowError::syntax_with_help(
            1,
            "Pipeline declares no parameters",
            "Add `- INPUT PARAMETER {name}` or `- OUTPUT PARAMETER {name}` to the header",
        ));
    }

    // Task results the source never declared are intermediate
    for task in &tasks {
        if !parameters.iter().any(|p| p.name == task.resulting_parameter_name) {
            parameters.push(Parameter::intermediate(&task.resulting_parameter_name));
        }
    }

    debug!(
        title = %document.title,
        parameters = parameters.len(),
        tasks = tasks.len(),
        "Compiled pipeline"
    );

    Ok(Pipeline {
        pipeline_url,
        title: document.title,
        dialect_version,
        description: join_description(&description),
        parameters,
        tasks,
        knowledge: Vec::new(),
    })
}

/// Pipeline-wide model requirements set in the header
#[derive(Debug, Default)]
struct ModelDefaults {
    requirements: ModelRequirements,
    seen: BTreeSet<&'static str>,
}

impl ModelDefaults {
    fn apply(&mut self, model: ModelCommand, line: usize) -> PromptflowResult<()> {
        if !self.seen.insert(model.key()) {
            return Err(duplicate_command(model.key(), line));
        }
        match model {
            ModelCommand::Variant(variant) => self.requirements.model_variant = variant,
            ModelCommand::Name(name) => self.requirements.model_name = Some(name),
            ModelCommand::MaxTokens(max_tokens) => self.requirements.max_tokens = Some(max_tokens),
        }
        Ok(())
    }
}

fn compile_section(
    section: &Section,
    defaults: &ModelDefaults,
    parameters: &mut Vec<Parameter>,
) -> PromptflowResult<Task> {
    let name = title_to_name(&section.title);
    if name.is_empty() {
        return Err(PromptflowError::syntax(
            section.line,
            format!("Section title `{}` does not yield a task name", section.title),
        ));
    }

    let mut execution_type = None;
    let mut model = ModelDefaults {
        requirements: defaults.requirements.clone(),
        seen: BTreeSet::new(),
    };
    let mut joker_parameter_names: Vec<String> = Vec::new();
    let mut postprocessing = Vec::new();
    let mut expectations = Vec::new();
    let mut description = Vec::new();
    let mut code: Option<(Option<String>, String, usize)> = None;
    let mut arrow: Option<(String, usize)> = None;

    for block in &section.blocks {
        match block {
            Block::ListItem { text, line } => {
                let command = Command::parse(text, *line)?;
                if command.scope() == CommandScope::Header {
                    return Err(PromptflowError::syntax_with_help(
                        *line,
                        format!("{} can only be used in the pipeline header", command.keyword()),
                        "Move it above the first `##` heading",
                    ));
                }
                match command {
                    Command::Execute(kind) => {
                        if execution_type.replace(kind).is_some() {
                            return Err(duplicate_command("EXECUTE", *line));
                        }
                    }
                    Command::Model(requirement) => model.apply(requirement, *line)?,
                    Command::Joker(parameter) => {
                        if !joker_parameter_names.contains(&parameter) {
                            joker_parameter_names.push(parameter);
                        }
                    }
                    Command::Parameter(parameter) => declare_parameter(parameters, parameter, *line)?,
                    Command::Postprocess(function) => postprocessing.push(function),
                    Command::ExpectAmount { sign, unit, amount } => {
                        expectations.push(Expectation::Amount { sign, unit, amount })
                    }
                    Command::ExpectFormat(format) => expectations.push(Expectation::Format { format }),
                    Command::PipelineUrl(_) | Command::DialectVersion(_) => {}
                }
            }
            Block::Code {
                language,
                content,
                line,
            } => {
                if code.is_some() {
                    return Err(PromptflowError::syntax_with_help(
                        *line,
                        format!("Task '{}' has more than one code block", name),
                        "Each task section holds exactly one fenced block",
                    ));
                }
                code = Some((language.clone(), content.clone(), *line));
            }
            Block::Arrow { text, line } => {
                if arrow.is_some() {
                    return Err(PromptflowError::syntax(
                        *line,
                        format!("Task '{}' has more than one `->` line", name),
                    ));
                }
                let caps = ARROW.captures(text).ok_or_else(|| {
                    PromptflowError::syntax_with_help(
                        *line,
                        format!("Malformed result line `{}`", text),
                        "Write the result as `-> {parameterName}`",
                    )
                })?;
                let parameter = caps[1].trim();
                if !names::is_valid_parameter_name(parameter) {
                    return Err(PromptflowError::syntax(
                        *line,
                        format!("Invalid parameter name {{{}}}", parameter),
                    ));
                }
                if code.is_none() {
                    return Err(PromptflowError::syntax(
                        *line,
                        "The `->` line must follow the task's code block",
                    ));
                }
                arrow = Some((parameter.to_string(), *line));
            }
            Block::Paragraph { text, .. } => description.push(text.as_str()),
            Block::Heading { line, .. } => {
                return Err(PromptflowError::unexpected(format!(
                    "heading on line {} left in a section",
                    line
                )))
            }
        }
    }

    let (content_language, content, code_line) = code.ok_or_else(|| {
        PromptflowError::syntax_with_help(
            section.line,
            format!("Task '{}' has no code block", name),
            "Add a fenced block with the template or script",
        )
    })?;
    let (resulting_parameter_name, _) = arrow.ok_or_else(|| {
        PromptflowError::syntax_with_help(
            section.line,
            format!("Task '{}' does not name its result", name),
            "End the section with `-> {parameterName}`",
        )
    })?;

    let execution_type = execution_type.unwrap_or(ExecutionType::PromptTemplate);

    let dependent_parameter_names = match execution_type {
        ExecutionType::Script => {
            let language = content_language.as_deref().unwrap_or_default();
            let language = ScriptLanguage::from_name(language).ok_or_else(|| {
                PromptflowError::syntax_with_help(
                    code_line,
                    format!("Unsupported script language `{}`", language),
                    "Scripts are written in javascript or bash",
                )
            })?;
            script_variables(language, &content)
        }
        _ => template_parameters(&content),
    };

    let model_requirements = match execution_type {
        ExecutionType::PromptTemplate => Some(model.requirements),
        _ if !model.seen.is_empty() => {
            return Err(PromptflowError::syntax(
                section.line,
                format!(
                    "MODEL commands in task '{}' need EXECUTE PROMPT TEMPLATE, not {}",
                    name, execution_type
                ),
            ))
        }
        _ => None,
    };

    debug!(task = %name, %execution_type, "Compiled task");

    Ok(Task {
        name,
        title: section.title.clone(),
        description: join_description(&description),
        execution_type,
        dependent_parameter_names,
        model_requirements,
        content_language,
        content,
        resulting_parameter_name,
        postprocessing,
        expectations,
        joker_parameter_names,
    })
}

fn declare_parameter(
    parameters: &mut Vec<Parameter>,
    declaration: ParameterCommand,
    line: usize,
) -> PromptflowResult<()> {
    match parameters.iter_mut().find(|p| p.name == declaration.name) {
        Some(existing) => {
            if existing.is_input != declaration.is_input || existing.is_output != declaration.is_output {
                return Err(PromptflowError::syntax_with_help(
                    line,
                    format!(
                        "Parameter {{{}}} is redeclared with different input/output facets",
                        declaration.name
                    ),
                    "Declare each parameter once, or repeat it with the same INPUT/OUTPUT keywords",
                ));
            }
            if existing.description.is_none() {
                existing.description = declaration.description;
            }
        }
        None => parameters.push(Parameter {
            name: declaration.name,
            description: declaration.description,
            is_input: declaration.is_input,
            is_output: declaration.is_output,
        }),
    }
    Ok(())
}

fn duplicate_command(keyword: &str, line: usize) -> PromptflowError {
    PromptflowError::syntax(line, format!("{} is set more than once", keyword))
}

fn join_description(paragraphs: &[&str]) -> Option<String> {
    (!paragraphs.is_empty()).then(|| paragraphs.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ExpectationSign, ExpectationUnit, ModelVariant};

    const GREETING: &str = r#"# ✨ Sample: Greeting

Show how postprocessing functions chain.

- PIPELINE URL https://promptflow.dev/samples/greeting.ptbk.md
- PROMPTBOOK VERSION 1.0.0
- INPUT PARAMETER {yourName} Name of the hero
- OUTPUT PARAMETER {greeting}

## 💬 Question

- EXECUTE PROMPT TEMPLATE
- POSTPROCESSING addHello
- POSTPROCESSING withStatistics

```text
{yourName} the Evangelist
```

-> {greeting}
"#;

    fn with_header(body: &str) -> String {
        format!(
            "# Test\n\n- PROMPTBOOK VERSION 1.0.0\n- INPUT PARAMETER {{topic}}\n- OUTPUT PARAMETER {{article}}\n\n{}",
            body
        )
    }

    #[test]
    fn test_compile_greeting() {
        let pipeline = compile(GREETING).unwrap();

        assert_eq!(pipeline.title, "✨ Sample: Greeting");
        assert_eq!(
            pipeline.pipeline_url.as_deref(),
            Some("https://promptflow.dev/samples/greeting.ptbk.md")
        );
        assert_eq!(pipeline.dialect_version, "1.0.0");
        assert_eq!(
            pipeline.description.as_deref(),
            Some("Show how postprocessing functions chain.")
        );
        assert_eq!(pipeline.parameters.len(), 2);
        assert_eq!(
            pipeline.get_parameter("yourName").unwrap().description.as_deref(),
            Some("Name of the hero")
        );

        let task = &pipeline.tasks[0];
        assert_eq!(task.name, "question");
        assert_eq!(task.execution_type, ExecutionType::PromptTemplate);
        assert_eq!(task.content, "{yourName} the Evangelist");
        assert_eq!(task.content_language.as_deref(), Some("text"));
        assert_eq!(task.resulting_parameter_name, "greeting");
        assert_eq!(task.postprocessing, vec!["addHello", "withStatistics"]);
        assert!(task.dependent_parameter_names.contains("yourName"));
        assert_eq!(task.model_requirements, Some(ModelRequirements::default()));
    }

    #[test]
    fn test_compile_is_deterministic() {
        let first = compile(GREETING).unwrap();
        let second = compile(GREETING).unwrap();
        assert_eq!(first, second);

        let reloaded = Pipeline::from_json(&first.to_json().unwrap()).unwrap();
        assert_eq!(reloaded, first);
    }

    #[test]
    fn test_model_defaults_and_overrides() {
        let source = r#"# Models

- PROMPTBOOK VERSION 1.0.0
- MODEL VARIANT COMPLETION
- MODEL NAME gpt-3.5-turbo-instruct
- INPUT PARAMETER {topic}
- OUTPUT PARAMETER {title}

## Draft

```
Write about {topic}
```

-> {draft}

## Title

- MODEL VARIANT CHAT
- MODEL NAME gpt-4
- MODEL MAX TOKENS 20
- EXPECT MAX 10 words
- EXPECT MIN 1 word
- JOKER {draft}

```
Title for {draft}
```

-> {title}
"#;
        let pipeline = compile(source).unwrap();
        let draft = pipeline.get_task("draft").unwrap();
        let requirements = draft.model_requirements.as_ref().unwrap();
        assert_eq!(requirements.model_variant, ModelVariant::Completion);
        assert_eq!(requirements.model_name.as_deref(), Some("gpt-3.5-turbo-instruct"));

        let title = pipeline.get_task("title").unwrap();
        let requirements = title.model_requirements.as_ref().unwrap();
        assert_eq!(requirements.model_variant, ModelVariant::Chat);
        assert_eq!(requirements.model_name.as_deref(), Some("gpt-4"));
        assert_eq!(requirements.max_tokens, Some(20));
        assert_eq!(title.joker_parameter_names, vec!["draft"]);
        assert_eq!(
            title.expectations[0],
            Expectation::Amount {
                sign: ExpectationSign::Maximum,
                unit: ExpectationUnit::Words,
                amount: 10,
            }
        );

        // Undeclared result becomes an intermediate parameter
        let draft_parameter = pipeline.get_parameter("draft").unwrap();
        assert!(!draft_parameter.is_input && !draft_parameter.is_output);
    }

    #[test]
    fn test_script_and_simple_tasks() {
        let source = with_header(
            r#"## Shout

- EXECUTE SCRIPT

```javascript
const loud = topic.toUpperCase();
return loud + suffix;
```

-> {shouted}

## Article

- SIMPLE TEMPLATE

```
{shouted}!
```

-> {article}
"#,
        );
        let pipeline = compile(&source).unwrap();

        let shout = pipeline.get_task("shout").unwrap();
        assert_eq!(shout.execution_type, ExecutionType::Script);
        assert_eq!(shout.model_requirements, None);
        assert_eq!(
            shout.dependent_parameter_names.iter().collect::<Vec<_>>(),
            vec!["suffix", "topic"]
        );

        let article = pipeline.get_task("article").unwrap();
        assert_eq!(article.execution_type, ExecutionType::SimpleTemplate);
        assert_eq!(article.model_requirements, None);
    }

    #[test]
    fn test_unsupported_script_language() {
        let source = with_header("## Run\n\n- EXECUTE SCRIPT\n\n```python\nprint(topic)\n```\n\n-> {article}\n");
        let err = compile(&source).unwrap_err();
        assert!(matches!(err, PromptflowError::Syntax { line: 11, .. }));
        assert!(err.to_string().contains("python"));
    }

    #[test]
    fn test_required_header() {
        let err = compile("# No version\n\n- INPUT PARAMETER {a}\n").unwrap_err();
        assert!(err.to_string().contains("Missing dialect version"));

        let err = compile("# No parameters\n\n- PROMPTBOOK VERSION 1.0.0\n").unwrap_err();
        assert!(err.to_string().contains("no parameters"));
    }

    #[test]
    fn test_placement_errors() {
        let err = compile("# T\n\n- PROMPTBOOK VERSION 1.0.0\n- JOKER {a}\n").unwrap_err();
        assert!(matches!(err, PromptflowError::Syntax { line: 4, .. }));

        let source = with_header("## Write\n\n- PIPELINE URL https://example.com/x\n\n```\n{topic}\n```\n\n-> {article}\n");
        let err = compile(&source).unwrap_err();
        assert!(matches!(err, PromptflowError::Syntax { line: 9, .. }));

        let source = with_header("## Write\n\n- EXECUTE SCRIPT\n- SIMPLE TEMPLATE\n\n```\n{topic}\n```\n\n-> {article}\n");
        let err = compile(&source).unwrap_err();
        assert!(err.to_string().contains("EXECUTE is set more than once"));
    }

    #[test]
    fn test_section_structure_errors() {
        let err = compile(&with_header("## Write\n\n```\n{topic}\n```\n")).unwrap_err();
        assert!(err.to_string().contains("does not name its result"));

        let err = compile(&with_header("## Write\n\n-> {article}\n")).unwrap_err();
        assert!(err.to_string().contains("must follow"));

        let err = compile(&with_header("## Write\n\n```\na\n```\n\n```\nb\n```\n\n-> {article}\n"))
            .unwrap_err();
        assert!(err.to_string().contains("more than one code block"));
    }

    #[test]
    fn test_conflicting_parameter_facets() {
        let source = with_header("## Write\n\n- INPUT PARAMETER {article}\n\n```\n{topic}\n```\n\n-> {article}\n");
        let err = compile(&source).unwrap_err();
        assert!(err.to_string().contains("different input/output facets"));

        // Same facets merge
        let source = with_header("## Write\n\n- OUTPUT PARAMETER {article} The result\n\n```\n{topic}\n```\n\n-> {article}\n");
        let pipeline = compile(&source).unwrap();
        assert_eq!(pipeline.parameters.len(), 2);
        assert_eq!(
            pipeline.get_parameter("article").unwrap().description.as_deref(),
            Some("The result")
        );
    }
}
