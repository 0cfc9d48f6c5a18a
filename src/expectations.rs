// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Expectation counters and checks
//!
//! Counting is locale-agnostic: words split on whitespace, sentences on
//! terminal punctuation, paragraphs on blank lines.

use crate::errors::PromptflowError;
use crate::pipeline::{ExpectFormat, Expectation, ExpectationSign, ExpectationUnit};

/// Words assumed to fill one page
pub const WORDS_PER_PAGE: usize = 250;

pub fn count_characters(text: &str) -> usize {
    text.chars().count()
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn count_sentences(text: &str) -> usize {
    text.split(['.', '!', '?'])
        .filter(|sentence| !sentence.trim().is_empty())
        .count()
}

pub fn count_lines(text: &str) -> usize {
    text.lines().filter(|line| !line.trim().is_empty()).count()
}

pub fn count_paragraphs(text: &str) -> usize {
    let mut count = 0;
    let mut in_paragraph = false;

    for line in text.lines() {
        if line.trim().is_empty() {
            in_paragraph = false;
        } else if !in_paragraph {
            in_paragraph = true;
            count += 1;
        }
    }

    count
}

pub fn count_pages(text: &str) -> usize {
    count_words(text).div_ceil(WORDS_PER_PAGE)
}

/// Count `text` in the given unit
pub fn count(unit: ExpectationUnit, text: &str) -> usize {
    match unit {
        ExpectationUnit::Characters => count_characters(text),
        ExpectationUnit::Words => count_words(text),
        ExpectationUnit::Sentences => count_sentences(text),
        ExpectationUnit::Lines => count_lines(text),
        ExpectationUnit::Paragraphs => count_paragraphs(text),
        ExpectationUnit::Pages => count_pages(text),
    }
}

/// Whether the trimmed text parses as JSON
pub fn is_valid_json(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text.trim()).is_ok()
}

/// Check one expectation
pub fn check_expectation(expectation: &Expectation, text: &str) -> Result<(), PromptflowError> {
    match *expectation {
        Expectation::Amount { sign, unit, amount } => {
            let actual = count(unit, text);
            let amount = amount as usize;
            let passes = match sign {
                ExpectationSign::Exactly => actual == amount,
                ExpectationSign::Minimum => actual >= amount,
                ExpectationSign::Maximum => actual <= amount,
            };

            if passes {
                Ok(())
            } else {
                Err(PromptflowError::expect(format!(
                    "Expected {} {} {} but got {}",
                    sign, amount, unit, actual
                )))
            }
        }
        Expectation::Format {
            format: ExpectFormat::Json,
        } => {
            if is_valid_json(text) {
                Ok(())
            } else {
                Err(PromptflowError::expect("Expected valid JSON output"))
            }
        }
    }
}

/// Check all expectations, failing on the first one not met
pub fn check_expectations(expectations: &[Expectation], text: &str) -> Result<(), PromptflowError> {
    expectations
        .iter()
        .try_for_each(|expectation| check_expectation(expectation, text))
}

pub fn is_passing_expectations(expectations: &[Expectation], text: &str) -> bool {
    check_expectations(expectations, text).is_ok()
}
