// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Named postprocessing functions implemented as Rust closures

use async_trait::async_trait;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock};

use super::ScriptRunner;
use crate::errors::{PromptflowError, PromptflowResult};

/// A postprocessing function: output of the previous step plus the
/// task's resolved parameters, to the next output
pub type PostprocessFn =
    Arc<dyn Fn(&str, &BTreeMap<String, String>) -> anyhow::Result<String> + Send + Sync>;

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(```|~~~)[^\n]*$").expect("valid fence regex"));

static LABELLED_QUOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[^"\n:]{1,40}:\s*("[^"]*"|'[^']*'|“[^”]*”)$"#).expect("valid label regex")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Script runner that serves named functions from memory
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, PostprocessFn>,
}

impl FunctionRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in text functions
    pub fn with_builtins() -> Self {
        Self::new()
            .with_text_function("trim", |s| s.trim().to_string())
            .with_text_function("trimCodeBlock", trim_code_block)
            .with_text_function("trimEndOfCodeBlock", trim_end_of_code_block)
            .with_text_function("removeQuotes", |s| remove_quotes(s).to_string())
            .with_text_function("unwrapResult", unwrap_result)
            .with_text_function("normalizeWhitespaces", normalize_whitespaces)
            .with_function("extractBlock", |s, _| extract_block(s))
    }

    /// Register a function that sees the task's parameters
    pub fn with_function<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&str, &BTreeMap<String, String>) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.register(name, function);
        self
    }

    /// Register an infallible string-to-string function
    pub fn with_text_function<F>(self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.with_function(name, move |value, _| Ok(function(value)))
    }

    pub fn register<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&str, &BTreeMap<String, String>) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
    }
}

#[async_trait]
impl ScriptRunner for FunctionRegistry {
    fn title(&self) -> &str {
        "Functions"
    }

    fn supports_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    async fn call_function(
        &self,
        name: &str,
        value: &str,
        parameters: &BTreeMap<String, String>,
    ) -> PromptflowResult<String> {
        let function = self.functions.get(name).ok_or_else(|| {
            PromptflowError::execution_final(format!("Function `{}` is not registered", name))
        })?;

        function(value, parameters).map_err(|e| {
            PromptflowError::execution(format!("Function `{}` failed: {:#}", name, e))
        })
    }
}

/// Strip a fenced block wrapping the whole text
fn trim_code_block(value: &str) -> String {
    let trimmed = value.trim();
    let fences: Vec<_> = FENCE.find_iter(trimmed).collect();
    match fences.as_slice() {
        [open, close] if open.start() == 0 && close.end() == trimmed.len() => {
            trimmed[open.end()..close.start()].trim_matches('\n').to_string()
        }
        _ => trimmed.to_string(),
    }
}

/// Drop a dangling closing fence at the end of the text
fn trim_end_of_code_block(value: &str) -> String {
    let trimmed = value.trim_end();
    trimmed
        .strip_suffix("```")
        .map(|s| s.trim_end().to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

fn remove_quotes(value: &str) -> &str {
    let trimmed = value.trim();
    for (open, close) in [("\"", "\""), ("'", "'"), ("“", "”"), ("„", "“"), ("«", "»")] {
        if trimmed.len() >= open.len() + close.len() {
            if let Some(inner) = trimmed.strip_prefix(open).and_then(|s| s.strip_suffix(close)) {
                return inner;
            }
        }
    }
    trimmed
}

/// Take the quoted answer out of `Label: "answer"` style replies
fn unwrap_result(value: &str) -> String {
    let trimmed = value.trim();
    match LABELLED_QUOTE.captures(trimmed) {
        Some(caps) => remove_quotes(&caps[1]).to_string(),
        None => remove_quotes(trimmed).to_string(),
    }
}

fn normalize_whitespaces(value: &str) -> String {
    WHITESPACE.replace_all(value.trim(), " ").into_owned()
}

/// Content of the only fenced block in a markdown text
fn extract_block(value: &str) -> anyhow::Result<String> {
    let fences: Vec<_> = FENCE.find_iter(value).collect();
    match fences.as_slice() {
        [open, close] => Ok(value[open.end()..close.start()]
            .trim_start_matches('\n')
            .trim_end_matches('\n')
            .to_string()),
        [] => anyhow::bail!("No code block found"),
        _ => anyhow::bail!("Expected exactly one code block, found {}", fences.len() / 2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_helpers() {
        assert_eq!(trim_code_block("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(trim_code_block("no fence"), "no fence");
        assert_eq!(trim_end_of_code_block("done\n```\n"), "done");
        assert_eq!(remove_quotes("  \"Hello\" "), "Hello");
        assert_eq!(remove_quotes("«Bonjour»"), "Bonjour");
        assert_eq!(remove_quotes("\""), "\"");
        assert_eq!(unwrap_result("Title: \"Hello World\""), "Hello World");
        assert_eq!(unwrap_result("'plain'"), "plain");
        assert_eq!(normalize_whitespaces("  a \n\t b  c "), "a b c");
    }

    #[test]
    fn test_extract_block() {
        let text = "Here you go:\n\n```js\nconsole.log(1);\n```\n\nEnjoy";
        assert_eq!(extract_block(text).unwrap(), "console.log(1);");
        assert!(extract_block("nothing").is_err());
    }

    #[tokio::test]
    async fn test_registry_call() {
        let registry = FunctionRegistry::with_builtins().with_function("greet", |value, params| {
            let suffix = params.get("suffix").map(String::as_str).unwrap_or("");
            Ok(format!("Hello {}{}", value, suffix))
        });

        assert!(registry.supports_function("greet"));
        assert!(registry.supports_function("trim"));
        assert!(!registry.supports_function("missing"));

        let params = BTreeMap::from([("suffix".to_string(), "!".to_string())]);
        let out = registry.call_function("greet", "Ann", &params).await.unwrap();
        assert_eq!(out, "Hello Ann!");
    }

    #[tokio::test]
    async fn test_failing_function_is_retryable() {
        let registry =
            FunctionRegistry::new().with_function("boom", |_, _| Err(anyhow::anyhow!("exploded")));
        let err = registry
            .call_function("boom", "x", &BTreeMap::new())
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert!(err.to_string().contains("exploded"));
    }
}
