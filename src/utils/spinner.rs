// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Progress display for pipeline runs

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

use super::colors::status_symbol;
use crate::pipeline::{ProgressCallback, TaskProgress, TaskStatus};

/// Create a progress bar for determinate progress
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.blue} {msg} [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// One line describing a task status change
pub fn progress_line(progress: &TaskProgress) -> String {
    let mut line = format!("{} {}", status_symbol(progress.status), progress.task_title);
    if progress.attempt > 1 {
        line.push_str(&format!(" (attempt {})", progress.attempt));
    }
    if let Some(message) = &progress.message {
        line.push_str(&format!(" - {}", message));
    }
    line
}

/// Progress callback driving a bar with one step per finished task
///
/// Finished tasks are printed above the bar; retries only when `verbose`.
pub fn task_progress_callback(bar: ProgressBar, verbose: bool) -> ProgressCallback {
    Arc::new(move |progress: TaskProgress| match progress.status {
        TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Skipped | TaskStatus::Cancelled => {
            bar.println(format!("  {}", progress_line(&progress)));
            bar.inc(1);
        }
        TaskStatus::Dispatching => {
            if verbose && progress.attempt > 1 {
                bar.println(format!("  {}", progress_line(&progress)));
            }
            bar.set_message(progress.task_title);
        }
        TaskStatus::Pending | TaskStatus::Ready => {}
    })
}
