// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Command grammar
//!
//! Every list item of a dialect source is exactly one [`Command`]. The
//! productions are tried in a fixed order and the first match wins;
//! keywords are case-insensitive.

use regex::{Captures, Regex};
use std::sync::LazyLock;
use tracing::debug;

use super::names::is_valid_parameter_name;
use crate::errors::{PromptflowError, PromptflowResult};
use crate::pipeline::{ExecutionType, ExpectFormat, ExpectationSign, ExpectationUnit, ModelVariant};

/// One parsed list item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    PipelineUrl(String),
    DialectVersion(String),
    Execute(ExecutionType),
    Model(ModelCommand),
    Joker(String),
    Parameter(ParameterCommand),
    Postprocess(String),
    ExpectAmount {
        sign: ExpectationSign,
        unit: ExpectationUnit,
        amount: u32,
    },
    ExpectFormat(ExpectFormat),
}

/// A single model requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelCommand {
    Variant(ModelVariant),
    Name(String),
    MaxTokens(u32),
}

impl ModelCommand {
    /// Requirement key, unique per section
    pub fn key(&self) -> &'static str {
        match self {
            Self::Variant(_) => "MODEL VARIANT",
            Self::Name(_) => "MODEL NAME",
            Self::MaxTokens(_) => "MODEL MAX TOKENS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterCommand {
    pub name: String,
    pub description: Option<String>,
    pub is_input: bool,
    pub is_output: bool,
}

/// Where a command may appear
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    /// Pipeline preamble only
    Header,
    /// Task sections only
    Task,
    Anywhere,
}

impl Command {
    pub fn scope(&self) -> CommandScope {
        match self {
            Self::PipelineUrl(_) | Self::DialectVersion(_) => CommandScope::Header,
            Self::Execute(_)
            | Self::Joker(_)
            | Self::Postprocess(_)
            | Self::ExpectAmount { .. }
            | Self::ExpectFormat(_) => CommandScope::Task,
            Self::Model(_) | Self::Parameter(_) => CommandScope::Anywhere,
        }
    }

    /// Keyword used in error messages
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::PipelineUrl(_) => "PIPELINE URL",
            Self::DialectVersion(_) => "PROMPTBOOK VERSION",
            Self::Execute(_) => "EXECUTE",
            Self::Model(model) => model.key(),
            Self::Joker(_) => "JOKER",
            Self::Parameter(_) => "PARAMETER",
            Self::Postprocess(_) => "POSTPROCESSING",
            Self::ExpectAmount { .. } | Self::ExpectFormat(_) => "EXPECT",
        }
    }

    /// Parse one list item found on the given 1-based line
    pub fn parse(item: &str, line: usize) -> PromptflowResult<Self> {
        let item = item.trim();
        let command = parse_item(item, line)?;
        debug!(line, keyword = command.keyword(), "Parsed command");
        Ok(command)
    }
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid command regex")
}

static PIPELINE_URL: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)^(?:PIPELINE|PROMPTBOOK)\s+URL\s+(\S+)$"));
static DIALECT_VERSION: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)^(?:PROMPTBOOK|PTBK)\s+VERSION\s+(\S+)$"));
static EXECUTE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)^(?:EXECUTE\s+)?(PROMPT\s+TEMPLATE|SIMPLE\s+TEMPLATE|SCRIPT|PROMPT\s+DIALOG)$")
});
static MODEL_VARIANT: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)^MODEL\s+VARIANT\s+(CHAT|COMPLETION)$"));
static MODEL_NAME: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)^MODEL\s+NAME\s+(\S+)$"));
static MODEL_MAX_TOKENS: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)^MODEL\s+MAX\s+TOKENS\s+(\S+)$"));
static JOKER: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)^JOKER\s+\{([^}]*)\}$"));
static PARAMETER: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)^(?:(INPUT\s+OUTPUT|INPUT|OUTPUT)\s+)?PARAM(?:ETER)?\s+\{([^}]*)\}\s*(.*)$")
});
static POSTPROCESS: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)^POSTPROCESS(?:ING)?\s+(\S+)$"));
static EXPECT_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)^EXPECT\s+(EXACTLY|MIN(?:IMUM)?|MAX(?:IMUM)?)\s+(\S+)\s+([A-Za-z]+)$")
});
static EXPECT_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)^EXPECT\s+(?:FORMAT\s+)?(JSON)$"));
static SEMVER: LazyLock<Regex> =
    LazyLock::new(|| re(r"^\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?$"));

fn parse_item(item: &str, line: usize) -> PromptflowResult<Command> {
    if let Some(caps) = PIPELINE_URL.captures(item) {
        return parse_pipeline_url(&caps[1], line);
    }

    if let Some(caps) = DIALECT_VERSION.captures(item) {
        let version = &caps[1];
        if !SEMVER.is_match(version) {
            return Err(PromptflowError::syntax_with_help(
                line,
                format!("Invalid version `{}`", version),
                "Use a semantic version like 1.0.0",
            ));
        }
        return Ok(Command::DialectVersion(version.to_string()));
    }

    if let Some(caps) = EXECUTE.captures(item) {
        let kind = normalize_keyword(&caps[1]);
        let execution_type = match kind.as_str() {
            "PROMPT TEMPLATE" => ExecutionType::PromptTemplate,
            "SIMPLE TEMPLATE" => ExecutionType::SimpleTemplate,
            "SCRIPT" => ExecutionType::Script,
            _ => ExecutionType::PromptDialog,
        };
        return Ok(Command::Execute(execution_type));
    }

    if let Some(caps) = MODEL_VARIANT.captures(item) {
        let variant = if caps[1].eq_ignore_ascii_case("CHAT") {
            ModelVariant::Chat
        } else {
            ModelVariant::Completion
        };
        return Ok(Command::Model(ModelCommand::Variant(variant)));
    }

    if let Some(caps) = MODEL_NAME.captures(item) {
        return Ok(Command::Model(ModelCommand::Name(caps[1].to_string())));
    }

    if let Some(caps) = MODEL_MAX_TOKENS.captures(item) {
        let max_tokens = parse_amount(&caps[1], line)?;
        if max_tokens == 0 {
            return Err(PromptflowError::syntax(line, "MODEL MAX TOKENS must be positive"));
        }
        return Ok(Command::Model(ModelCommand::MaxTokens(max_tokens)));
    }

    if let Some(caps) = JOKER.captures(item) {
        return Ok(Command::Joker(parameter_name(&caps[1], line)?));
    }

    if let Some(caps) = PARAMETER.captures(item) {
        return parse_parameter(&caps, line);
    }

    if let Some(caps) = POSTPROCESS.captures(item) {
        return Ok(Command::Postprocess(caps[1].to_string()));
    }

    if let Some(caps) = EXPECT_AMOUNT.captures(item) {
        let sign = match normalize_keyword(&caps[1]).as_str() {
            "EXACTLY" => ExpectationSign::Exactly,
            "MIN" | "MINIMUM" => ExpectationSign::Minimum,
            _ => ExpectationSign::Maximum,
        };
        let amount = parse_amount(&caps[2], line)?;
        let unit = parse_unit(&caps[3], line)?;
        return Ok(Command::ExpectAmount { sign, unit, amount });
    }

    if EXPECT_FORMAT.is_match(item) {
        return Ok(Command::ExpectFormat(ExpectFormat::Json));
    }

    Err(PromptflowError::syntax_with_help(
        line,
        format!("Unknown command `{}`", item),
        "Commands: PIPELINE URL, PROMPTBOOK VERSION, [INPUT|OUTPUT] PARAMETER, EXECUTE, \
         MODEL, JOKER, POSTPROCESSING, EXPECT",
    ))
}

fn normalize_keyword(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_ascii_uppercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_pipeline_url(url: &str, line: usize) -> PromptflowResult<Command> {
    if !url.starts_with("https://") {
        return Err(PromptflowError::syntax_with_help(
            line,
            format!("Pipeline URL `{}` must use https", url),
            "Use https://... as the pipeline identity",
        ));
    }
    if url.contains('#') {
        return Err(PromptflowError::syntax(
            line,
            format!("Pipeline URL `{}` must not contain a fragment", url),
        ));
    }
    Ok(Command::PipelineUrl(url.to_string()))
}

fn parameter_name(raw: &str, line: usize) -> PromptflowResult<String> {
    let name = raw.trim();
    if !is_valid_parameter_name(name) {
        return Err(PromptflowError::syntax(
            line,
            format!("Invalid parameter name {{{}}}", name),
        ));
    }
    Ok(name.to_string())
}

fn parse_parameter(caps: &Captures<'_>, line: usize) -> PromptflowResult<Command> {
    let facets = caps.get(1).map(|m| normalize_keyword(m.as_str()));
    let (is_input, is_output) = match facets.as_deref() {
        Some("INPUT OUTPUT") => (true, true),
        Some("INPUT") => (true, false),
        Some("OUTPUT") => (false, true),
        _ => (false, false),
    };

    let name = parameter_name(&caps[2], line)?;
    let description = caps[3]
        .trim()
        .trim_start_matches(['-', ':'])
        .trim()
        .to_string();

    Ok(Command::Parameter(ParameterCommand {
        name,
        description: (!description.is_empty()).then_some(description),
        is_input,
        is_output,
    }))
}

fn parse_amount(raw: &str, line: usize) -> PromptflowResult<u32> {
    raw.parse::<u32>().map_err(|_| {
        PromptflowError::syntax_with_help(
            line,
            format!("Invalid amount `{}`", raw),
            "Amounts are whole non-negative numbers",
        )
    })
}

fn parse_unit(raw: &str, line: usize) -> PromptflowResult<ExpectationUnit> {
    let lower = raw.to_ascii_lowercase();
    let singular = lower.strip_suffix('s').unwrap_or(&lower);
    match singular {
        "character" | "char" => Ok(ExpectationUnit::Characters),
        "word" => Ok(ExpectationUnit::Words),
        "sentence" => Ok(ExpectationUnit::Sentences),
        "line" => Ok(ExpectationUnit::Lines),
        "paragraph" => Ok(ExpectationUnit::Paragraphs),
        "page" => Ok(ExpectationUnit::Pages),
        _ => Err(PromptflowError::syntax(
            line,
            format!("Unknown expectation unit `{}`", raw),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(item: &str) -> Command {
        Command::parse(item, 1).unwrap()
    }

    #[test]
    fn test_header_commands() {
        assert_eq!(
            parse("PIPELINE URL https://example.com/a.ptbk.md"),
            Command::PipelineUrl("https://example.com/a.ptbk.md".into())
        );
        assert_eq!(
            parse("promptbook url https://example.com/b.ptbk.md"),
            Command::PipelineUrl("https://example.com/b.ptbk.md".into())
        );
        assert_eq!(parse("PTBK VERSION 1.0.0"), Command::DialectVersion("1.0.0".into()));

        assert!(Command::parse("PIPELINE URL http://example.com", 4).is_err());
        assert!(Command::parse("PIPELINE URL https://example.com/#top", 4).is_err());
        assert!(Command::parse("PROMPTBOOK VERSION one", 4).is_err());
    }

    #[test]
    fn test_execute_aliases() {
        assert_eq!(parse("EXECUTE PROMPT TEMPLATE"), Command::Execute(ExecutionType::PromptTemplate));
        assert_eq!(parse("SIMPLE TEMPLATE"), Command::Execute(ExecutionType::SimpleTemplate));
        assert_eq!(parse("Execute script"), Command::Execute(ExecutionType::Script));
        assert_eq!(parse("PROMPT DIALOG"), Command::Execute(ExecutionType::PromptDialog));
    }

    #[test]
    fn test_parameter_declarations() {
        assert_eq!(
            parse("INPUT PARAMETER {yourName} Name of the hero"),
            Command::Parameter(ParameterCommand {
                name: "yourName".into(),
                description: Some("Name of the hero".into()),
                is_input: true,
                is_output: false,
            })
        );
        assert_eq!(
            parse("INPUT OUTPUT PARAMETER {text}"),
            Command::Parameter(ParameterCommand {
                name: "text".into(),
                description: None,
                is_input: true,
                is_output: true,
            })
        );
        match parse("PARAMETER {draft} - rough version") {
            Command::Parameter(p) => {
                assert!(!p.is_input && !p.is_output);
                assert_eq!(p.description.as_deref(), Some("rough version"));
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(Command::parse("INPUT PARAMETER {two words}", 1).is_err());
    }

    #[test]
    fn test_expectations() {
        assert_eq!(
            parse("EXPECT MIN 1 Word"),
            Command::ExpectAmount {
                sign: ExpectationSign::Minimum,
                unit: ExpectationUnit::Words,
                amount: 1,
            }
        );
        assert_eq!(
            parse("EXPECT EXACTLY 3 sentences"),
            Command::ExpectAmount {
                sign: ExpectationSign::Exactly,
                unit: ExpectationUnit::Sentences,
                amount: 3,
            }
        );
        assert_eq!(parse("EXPECT JSON"), Command::ExpectFormat(ExpectFormat::Json));
        assert_eq!(parse("EXPECT FORMAT JSON"), Command::ExpectFormat(ExpectFormat::Json));

        assert!(Command::parse("EXPECT MAX -5 words", 1).is_err());
        assert!(Command::parse("EXPECT MAX 2.5 words", 1).is_err());
        assert!(Command::parse("EXPECT MAX 5 bananas", 1).is_err());
    }

    #[test]
    fn test_model_and_misc() {
        assert_eq!(
            parse("MODEL VARIANT Completion"),
            Command::Model(ModelCommand::Variant(ModelVariant::Completion))
        );
        assert_eq!(
            parse("MODEL NAME gpt-4"),
            Command::Model(ModelCommand::Name("gpt-4".into()))
        );
        assert_eq!(parse("MODEL MAX TOKENS 500"), Command::Model(ModelCommand::MaxTokens(500)));
        assert_eq!(parse("JOKER {draft}"), Command::Joker("draft".into()));
        assert_eq!(parse("POSTPROCESS trim"), Command::Postprocess("trim".into()));
        assert_eq!(parse("POSTPROCESSING addHello"), Command::Postprocess("addHello".into()));
    }

    #[test]
    fn test_unknown_command_reports_line() {
        let err = Command::parse("MAKE IT GOOD", 12).unwrap_err();
        assert!(matches!(err, PromptflowError::Syntax { line: 12, .. }));
        assert!(err.to_string().contains("Unknown command"));
    }
}
