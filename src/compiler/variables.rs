// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Dependency extraction
//!
//! Template tasks depend on their `{name}` placeholders. Script tasks are
//! scanned statically: the scan never runs the script.
//!
//! JavaScript rules: an identifier is a dependency when it is used as a
//! value and is not a keyword, a well-known global, a property name, an
//! object key, or a name the script declares itself (`const`/`let`/`var`,
//! `function`, `class`, parameters, `catch` bindings). An identifier used
//! only as a callee (`name(...)`) is a function, not a dependency; one used
//! both ways is a dependency.
//!
//! Shell rules: `$name` and `${name}` references, minus all-uppercase
//! names (environment) and names the script assigns.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex")
});

/// Regex matching one `{name}` placeholder; group 1 is the name
pub fn placeholder_regex() -> &'static Regex {
    &PLACEHOLDER
}

/// Names of every `{name}` placeholder in a template
pub fn template_parameters(template: &str) -> BTreeSet<String> {
    PLACEHOLDER
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Script languages the static scan understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptLanguage {
    JavaScript,
    Shell,
}

impl ScriptLanguage {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "javascript" | "js" | "typescript" | "ts" => Some(Self::JavaScript),
            "bash" | "sh" | "zsh" | "shell" => Some(Self::Shell),
            _ => None,
        }
    }
}

/// Free variables of a script
pub fn script_variables(language: ScriptLanguage, script: &str) -> BTreeSet<String> {
    match language {
        ScriptLanguage::JavaScript => javascript_variables(script),
        ScriptLanguage::Shell => shell_variables(script),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JavaScript
// ─────────────────────────────────────────────────────────────────────────────

const KEYWORDS: &[&str] = &[
    "async", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "export", "extends", "false", "finally", "for",
    "function", "get", "if", "import", "in", "instanceof", "let", "new", "null", "of", "return",
    "set", "static", "super", "switch", "this", "throw", "true", "try", "typeof", "undefined",
    "var", "void", "while", "with", "yield", "NaN", "Infinity",
];

const GLOBALS: &[&str] = &[
    "Array", "BigInt", "Boolean", "Date", "Error", "Intl", "JSON", "Map", "Math", "Number",
    "Object", "Promise", "RegExp", "Set", "String", "Symbol", "arguments", "clearTimeout",
    "console", "decodeURI", "decodeURIComponent", "document", "encodeURI",
    "encodeURIComponent", "exports", "globalThis", "isFinite", "isNaN", "module", "parseFloat",
    "parseInt", "process", "require", "setTimeout", "window",
];

/// Statement keywords that end a declarator list written without `;`
const STATEMENT_KEYWORDS: &[&str] = &[
    "class", "const", "do", "for", "function", "if", "let", "return", "switch", "throw", "try",
    "var", "while",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Punct(&'static str),
}

impl Token {
    fn is(&self, punct: &str) -> bool {
        matches!(self, Token::Punct(p) if *p == punct)
    }

    fn ident(&self) -> Option<&str> {
        match self {
            Token::Ident(name) => Some(name),
            Token::Punct(_) => None,
        }
    }
}

fn punct(c: char) -> &'static str {
    match c {
        '(' => "(",
        ')' => ")",
        '[' => "[",
        ']' => "]",
        '{' => "{",
        '}' => "}",
        ',' => ",",
        ';' => ";",
        ':' => ":",
        '.' => ".",
        '=' => "=",
        '?' => "?",
        _ => "op",
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Tokenize, dropping strings, comments, numbers and regex literals
fn tokenize(script: &str) -> Vec<Token> {
    let chars: Vec<char> = script.chars().collect();
    let mut tokens = Vec::new();
    // Brace depth of each open `${` inside template literals
    let mut templates: Vec<usize> = Vec::new();
    let mut braces = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c.is_whitespace() {
            i += 1;
        } else if c == '/' && next == Some('/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c == '/' && next == Some('*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i += 2;
        } else if c == '\'' || c == '"' {
            i = skip_quoted(&chars, i + 1, c);
        } else if c == '`' {
            i = skip_template(&chars, i + 1);
            if chars.get(i.wrapping_sub(2)) == Some(&'$') && chars.get(i - 1) == Some(&'{') {
                templates.push(braces);
            }
        } else if c == '}' && templates.last() == Some(&braces) {
            templates.pop();
            i = skip_template(&chars, i + 1);
            if chars.get(i.wrapping_sub(2)) == Some(&'$') && chars.get(i - 1) == Some(&'{') {
                templates.push(braces);
            }
        } else if c == '/' && starts_regex(tokens.last()) {
            i = skip_regex(&chars, i + 1);
        } else if c.is_ascii_digit() {
            while i < chars.len() && (is_ident_char(chars[i]) || chars[i] == '.') {
                i += 1;
            }
        } else if is_ident_start(c) {
            let start = i;
            while i < chars.len() && is_ident_char(chars[i]) {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else if c == '=' && next == Some('>') {
            tokens.push(Token::Punct("=>"));
            i += 2;
        } else if c == '.' && next == Some('.') && chars.get(i + 2) == Some(&'.') {
            tokens.push(Token::Punct("..."));
            i += 3;
        } else if c == '?' && next == Some('.') {
            // Optional chaining behaves like a property access
            tokens.push(Token::Punct("."));
            i += 2;
        } else {
            match c {
                '{' => braces += 1,
                '}' => braces = braces.saturating_sub(1),
                _ => {}
            }
            // `==`, `<=` and friends are plain operators
            if matches!(next, Some('=')) && matches!(c, '=' | '!' | '<' | '>') {
                tokens.push(Token::Punct("op"));
                i += 2;
            } else {
                tokens.push(Token::Punct(punct(c)));
                i += 1;
            }
        }
    }

    tokens
}

fn skip_quoted(chars: &[char], mut i: usize, quote: char) -> usize {
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return i + 1,
            '\n' => return i + 1,
            _ => i += 1,
        }
    }
    i
}

/// Skip template text; stops after the closing backtick or after `${`
fn skip_template(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '`' => return i + 1,
            '$' if chars.get(i + 1) == Some(&'{') => return i + 2,
            _ => i += 1,
        }
    }
    i
}

fn starts_regex(previous: Option<&Token>) -> bool {
    match previous {
        None => true,
        Some(Token::Ident(name)) => KEYWORDS.contains(&name.as_str()) && name != "this",
        Some(Token::Punct(p)) => !matches!(*p, ")" | "]" | "}"),
    }
}

fn skip_regex(chars: &[char], mut i: usize) -> usize {
    let mut in_class = false;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_alphabetic() {
                    i += 1;
                }
                return i;
            }
            '\n' => return i,
            _ => {}
        }
        i += 1;
    }
    i
}

fn matching_close(tokens: &[Token], open: usize) -> usize {
    let mut depth = 0usize;
    for (offset, token) in tokens[open..].iter().enumerate() {
        if token.is("(") || token.is("[") || token.is("{") {
            depth += 1;
        } else if token.is(")") || token.is("]") || token.is("}") {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return open + offset;
            }
        }
    }
    tokens.len()
}

fn matching_open(tokens: &[Token], close: usize) -> usize {
    let mut depth = 0usize;
    for index in (0..=close).rev() {
        let token = &tokens[index];
        if token.is(")") || token.is("]") || token.is("}") {
            depth += 1;
        } else if token.is("(") || token.is("[") || token.is("{") {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return index;
            }
        }
    }
    0
}

/// Declare binding names between `open` and `close` (parameter lists and
/// destructuring patterns); default values are not bindings
fn declare_pattern(tokens: &[Token], open: usize, close: usize, declared: &mut BTreeSet<String>) {
    for index in open + 1..close.min(tokens.len()) {
        let Some(name) = tokens[index].ident() else {
            continue;
        };
        let previous = &tokens[index - 1];
        let is_binding_position = previous.is("(")
            || previous.is(",")
            || previous.is("...")
            || previous.is("{")
            || previous.is("[")
            || previous.is(":");
        let is_key = tokens.get(index + 1).is_some_and(|t| t.is(":"));
        if is_binding_position && !is_key {
            declared.insert(name.to_string());
        }
    }
}

/// Declare one declarator (`name` or a pattern) starting at `index`
fn declare_declarator(tokens: &[Token], index: usize, declared: &mut BTreeSet<String>) {
    match tokens.get(index) {
        Some(Token::Ident(name)) => {
            declared.insert(name.clone());
        }
        Some(token) if token.is("{") || token.is("[") => {
            declare_pattern(tokens, index, matching_close(tokens, index), declared);
        }
        _ => {}
    }
}

fn declared_names(tokens: &[Token]) -> BTreeSet<String> {
    let mut declared = BTreeSet::new();

    for (index, token) in tokens.iter().enumerate() {
        match token.ident() {
            Some("const" | "let" | "var") => {
                declare_declarator(tokens, index + 1, &mut declared);

                // Further declarators in the same list
                let mut depth = 0isize;
                for (offset, next) in tokens[index + 1..].iter().enumerate() {
                    if next.is("(") || next.is("[") || next.is("{") {
                        depth += 1;
                    } else if next.is(")") || next.is("]") || next.is("}") {
                        depth -= 1;
                        if depth < 0 {
                            break;
                        }
                    } else if depth == 0 && next.is(";") {
                        break;
                    } else if depth == 0 && next.is(",") {
                        declare_declarator(tokens, index + offset + 2, &mut declared);
                    } else if depth == 0
                        && offset > 0
                        && next.ident().is_some_and(|n| STATEMENT_KEYWORDS.contains(&n))
                    {
                        break;
                    }
                }
            }
            Some("function") => {
                let mut open = index + 1;
                if let Some(Token::Ident(name)) = tokens.get(open) {
                    declared.insert(name.clone());
                    open += 1;
                }
                if tokens.get(open).is_some_and(|t| t.is("(")) {
                    declare_pattern(tokens, open, matching_close(tokens, open), &mut declared);
                }
            }
            Some("class") => {
                if let Some(Token::Ident(name)) = tokens.get(index + 1) {
                    declared.insert(name.clone());
                }
            }
            Some("catch") => {
                if tokens.get(index + 1).is_some_and(|t| t.is("(")) {
                    declare_pattern(
                        tokens,
                        index + 1,
                        matching_close(tokens, index + 1),
                        &mut declared,
                    );
                }
            }
            _ if token.is("=>") && index > 0 => match &tokens[index - 1] {
                Token::Ident(name) => {
                    declared.insert(name.clone());
                }
                previous if previous.is(")") => {
                    let open = matching_open(tokens, index - 1);
                    declare_pattern(tokens, open, index - 1, &mut declared);
                }
                _ => {}
            },
            _ => {}
        }
    }

    declared
}

fn javascript_variables(script: &str) -> BTreeSet<String> {
    let tokens = tokenize(script);
    let declared = declared_names(&tokens);
    let mut values = BTreeSet::new();

    for (index, token) in tokens.iter().enumerate() {
        let Some(name) = token.ident() else {
            continue;
        };
        if KEYWORDS.contains(&name) || GLOBALS.contains(&name) || declared.contains(name) {
            continue;
        }

        let previous = index.checked_sub(1).map(|i| &tokens[i]);
        let next = tokens.get(index + 1);

        if previous.is_some_and(|t| t.is(".")) {
            continue;
        }
        let is_object_key = next.is_some_and(|t| t.is(":"))
            && previous.is_some_and(|t| t.is("{") || t.is(","));
        if is_object_key {
            continue;
        }
        // Callee-only identifiers are functions
        if next.is_some_and(|t| t.is("(")) {
            continue;
        }

        values.insert(name.to_string());
    }

    values
}

// ─────────────────────────────────────────────────────────────────────────────
// Shell
// ─────────────────────────────────────────────────────────────────────────────

static SHELL_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)(?:^|[\s;&|(])(?:export\s+|local\s+|readonly\s+|declare\s+(?:-\w+\s+)*)?([A-Za-z_][A-Za-z0-9_]*)=",
    )
    .expect("valid shell assignment regex")
});

static SHELL_LOOP_OR_READ: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:for\s+([A-Za-z_][A-Za-z0-9_]*)\s+in\b|read\s+(?:-\w+\s+)*([A-Za-z_][A-Za-z0-9_]*))")
        .expect("valid shell binding regex")
});

fn shell_variables(script: &str) -> BTreeSet<String> {
    let mut assigned: BTreeSet<String> = SHELL_ASSIGNMENT
        .captures_iter(script)
        .map(|caps| caps[1].to_string())
        .collect();
    assigned.extend(SHELL_LOOP_OR_READ.captures_iter(script).filter_map(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string())
    }));

    let chars: Vec<char> = script.chars().collect();
    let mut references = BTreeSet::new();
    let mut in_double = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let at_word_start = i == 0 || chars[i - 1].is_whitespace() || chars[i - 1] == ';';

        match c {
            '\\' => i += 2,
            '\'' if !in_double => {
                i += 1;
                while i < chars.len() && chars[i] != '\'' {
                    i += 1;
                }
                i += 1;
            }
            '"' => {
                in_double = !in_double;
                i += 1;
            }
            '#' if !in_double && at_word_start => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '$' => {
                i += 1;
                let braced = chars.get(i) == Some(&'{');
                if braced {
                    i += 1;
                    if matches!(chars.get(i), Some('#') | Some('!')) {
                        i += 1;
                    }
                }
                let start = i;
                if chars.get(i).is_some_and(|c| c.is_ascii_alphabetic() || *c == '_') {
                    while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                        i += 1;
                    }
                    references.insert(chars[start..i].iter().collect::<String>());
                }
            }
            _ => i += 1,
        }
    }

    references
        .into_iter()
        .filter(|name| name.chars().any(|c| c.is_ascii_lowercase()))
        .filter(|name| !assigned.contains(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn js(script: &str) -> Vec<String> {
        script_variables(ScriptLanguage::JavaScript, script)
            .into_iter()
            .collect()
    }

    fn sh(script: &str) -> Vec<String> {
        script_variables(ScriptLanguage::Shell, script)
            .into_iter()
            .collect()
    }

    #[test]
    fn test_template_parameters() {
        let names = template_parameters("Hello {yourName}, {greeting} { not } {yourName}");
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["greeting", "yourName"]);
    }

    #[test]
    fn test_language_names() {
        assert_eq!(ScriptLanguage::from_name("JavaScript"), Some(ScriptLanguage::JavaScript));
        assert_eq!(ScriptLanguage::from_name("bash"), Some(ScriptLanguage::Shell));
        assert_eq!(ScriptLanguage::from_name("python"), None);
    }

    #[test]
    fn test_js_simple_expression() {
        assert_eq!(js("return yourName.toUpperCase() + ' ' + title;"), vec!["title", "yourName"]);
    }

    #[test]
    fn test_js_declarations_are_not_dependencies() {
        let script = r#"
            const prefix = 'Hello ';
            let count = 0, total = items.length;
            function greet(who, { polite = defaultPoliteness }) {
                return prefix + who;
            }
            const shout = (text) => text.toUpperCase();
            const twice = value => value + value;
            try { count += 1; } catch (error) { console.log(error.message); }
            return shout(greet(name, {})) + total;
        "#;
        assert_eq!(js(script), vec!["defaultPoliteness", "items", "name"]);
    }

    #[test]
    fn test_js_callee_only_is_a_function() {
        assert_eq!(js("return addHello(name);"), vec!["name"]);
        // Used both as a callee and as a value
        assert_eq!(js("return transform(text) + transform;"), vec!["text", "transform"]);
    }

    #[test]
    fn test_js_ignores_strings_comments_and_keys() {
        let script = r#"
            // uses notAVariable in a comment
            /* and block comment */
            const data = { key: value, shorthand, "quoted": 1 };
            const pattern = /[a-z]+/g;
            return `Dear ${person.name}, ${greeting}` + 'literal {x}' + data.key;
        "#;
        assert_eq!(js(script), vec!["greeting", "person", "shorthand", "value"]);
    }

    #[test]
    fn test_shell_references() {
        let script = r#"
            # greeting for $ignored
            prefix="Hello"
            for item in a b; do echo "$item"; done
            echo "$prefix ${yourName} from $HOME and ${topic}" '$quoted'
        "#;
        assert_eq!(sh(script), vec!["topic", "yourName"]);
    }
}
