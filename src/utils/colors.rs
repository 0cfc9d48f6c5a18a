// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Terminal color utilities
//!
//! Provides consistent symbols and colors across the CLI.

use colored::{ColoredString, Colorize};

use crate::pipeline::{TaskStatus, UncertainNumber, Usage};

/// Colored symbol for a task status
pub fn status_symbol(status: TaskStatus) -> ColoredString {
    match status {
        TaskStatus::Succeeded => "✓".green(),
        TaskStatus::Failed => "✗".red(),
        TaskStatus::Skipped => "○".dimmed(),
        TaskStatus::Cancelled => "⊘".yellow(),
        TaskStatus::Pending | TaskStatus::Ready | TaskStatus::Dispatching => "→".blue(),
    }
}

/// Print a styled header
pub fn print_header(title: &str) {
    println!("{}", title.bold());
    println!("{}", "═".repeat(title.chars().count().max(40)));
}

/// Print a styled section
pub fn print_section(title: &str) {
    println!();
    println!("{}:", title.bold());
}

/// Print a success check
pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green(), msg);
}

/// Print an error cross
pub fn print_error(msg: &str) {
    println!("  {} {}", "✗".red(), msg);
}

/// Print a warning
pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠".yellow(), msg);
}

fn format_number(number: UncertainNumber, decimals: usize) -> String {
    let value = format!("{:.*}", decimals, number.value);
    if number.is_exact {
        value
    } else {
        format!("~{}", value)
    }
}

/// One-line usage summary, marking estimates with `~`
pub fn format_usage(usage: &Usage) -> String {
    format!(
        "{} input tokens, {} output tokens, ${}",
        format_number(usage.input_tokens, 0),
        format_number(usage.output_tokens, 0),
        format_number(usage.price, 4)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_usage() {
        let usage = Usage {
            price: UncertainNumber::estimate(0.5),
            input_tokens: UncertainNumber::exact(12.0),
            output_tokens: UncertainNumber::exact(30.0),
        };
        assert_eq!(
            format_usage(&usage),
            "12 input tokens, 30 output tokens, $~0.5000"
        );
    }
}
