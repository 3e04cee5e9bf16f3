// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Spinner shown on stderr while connecting and resolving the resource kind

use indicatif::{ProgressBar, ProgressStyle};

/// Create a spinner with consistent styling. Hidden when stderr is not a
/// terminal so piped output and prompts stay clean.
pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = spinner_for(console::Term::stderr().is_term());
    pb.set_message(msg.to_string());
    pb
}

fn spinner_for(is_term: bool) -> ProgressBar {
    if !is_term {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    match ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.cyan} {msg} {elapsed:.dim}")
    {
        Ok(style) => pb.set_style(style),
        Err(e) => tracing::debug!(error = %e, "Invalid spinner template"),
    }
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}
