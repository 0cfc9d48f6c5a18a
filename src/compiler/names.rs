// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Name normalization

/// Normalize a section title into a kebab-case task name
///
/// Letters are lowercased, any run of other characters collapses into a
/// single `-`, and leading or trailing separators are dropped.
pub fn title_to_name(title: &str) -> String {
    let mut name = String::with_capacity(title.len());
    let mut pending_dash = false;

    for c in title.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !name.is_empty() {
                name.push('-');
            }
            pending_dash = false;
            name.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    name
}

/// Whether `name` is usable as a `{parameter}` name
pub fn is_valid_parameter_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_to_name() {
        assert_eq!(title_to_name("Question"), "question");
        assert_eq!(title_to_name("Make a Greeting!"), "make-a-greeting");
        assert_eq!(title_to_name("  💬 Improve   the title "), "improve-the-title");
        assert_eq!(title_to_name("Step 2: Review"), "step-2-review");
        assert_eq!(title_to_name("---"), "");
    }

    #[test]
    fn test_parameter_names() {
        assert!(is_valid_parameter_name("yourName"));
        assert!(is_valid_parameter_name("_draft2"));
        assert!(!is_valid_parameter_name("2fast"));
        assert!(!is_valid_parameter_name("your name"));
        assert!(!is_valid_parameter_name(""));
    }
}
