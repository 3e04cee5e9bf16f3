use anyhow::Result;
use serde_json::Value;
use std::io::{BufRead, Write};
use tracing::debug;

use super::Streams;
use crate::extract;
use crate::kubernetes::ResourceKind;

/// Side-effecting operation that needs confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Delete,
    Patch,
    Exec,
}

impl Operation {
    fn outcome(&self) -> &'static str {
        match self {
            Operation::Delete => "be deleted",
            Operation::Patch => "be patched",
            Operation::Exec => "have the command executed",
        }
    }

    fn cancelled(&self) -> &'static str {
        match self {
            Operation::Delete => "Deletion cancelled.",
            Operation::Patch => "Patch cancelled.",
            Operation::Exec => "Execution cancelled.",
        }
    }
}

/// Preview line for one object
pub fn describe(obj: &Value, show_namespace: bool) -> String {
    match extract::namespace(obj) {
        Some(ns) if show_namespace => format!("- {} in namespace {}", extract::name(obj), ns),
        _ => format!("- {}", extract::name(obj)),
    }
}

/// Print the preview and ask for confirmation on stderr, reading the answer
/// from stdin. Only `y` or `yes` (any case) proceeds; anything else, including
/// EOF, prints the cancellation notice and returns false.
pub fn confirm(
    op: Operation,
    kind: &ResourceKind,
    items: &[Value],
    show_namespace: bool,
    streams: &mut Streams<'_>,
) -> Result<bool> {
    writeln!(streams.err, "The following {} will {}:", kind.plural(), op.outcome())?;
    for item in items {
        writeln!(streams.err, "{}", describe(item, show_namespace))?;
    }
    write!(streams.err, "Are you sure you want to continue? [y/N]: ")?;
    streams.err.flush()?;

    let mut line = String::new();
    let answer = match streams.input.read_line(&mut line) {
        Ok(_) => line.trim().to_lowercase(),
        Err(e) => {
            debug!(error = %e, "Failed to read confirmation");
            String::new()
        }
    };

    let accepted = answer == "y" || answer == "yes";
    if !accepted {
        writeln!(streams.err, "{}", op.cancelled())?;
    }
    Ok(accepted)
}
