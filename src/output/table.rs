// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use std::io::Write;

use anyhow::Result;
use chrono::Duration;
use comfy_table::{Table, presets::NOTHING};
use serde_json::Value;

/// Gap between columns, as printed by kubectl
const COLUMN_GAP: u16 = 3;

type Extractor<'a> = Box<dyn Fn(&Value) -> String + 'a>;

/// A table column: header label plus a function producing the cell for one object
pub struct Column<'a> {
    pub header: String,
    extractor: Extractor<'a>,
}

impl<'a> Column<'a> {
    pub fn new(header: impl Into<String>, extractor: impl Fn(&Value) -> String + 'a) -> Self {
        Self {
            header: header.into(),
            extractor: Box::new(extractor),
        }
    }

    pub fn cell(&self, obj: &Value) -> String {
        (self.extractor)(obj)
    }
}

/// Borderless, left-aligned table writer
#[derive(Debug, Clone, Copy, Default)]
pub struct TablePrinter {
    pub no_headers: bool,
}

impl TablePrinter {
    pub fn new(no_headers: bool) -> Self {
        Self { no_headers }
    }

    /// Render `rows` through `columns`. Nothing is written for an empty set.
    pub fn print(&self, columns: &[Column<'_>], rows: &[Value], out: &mut dyn Write) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut table = Table::new();
        table.load_preset(NOTHING);

        if !self.no_headers {
            table.set_header(
                columns
                    .iter()
                    .map(|c| c.header.to_uppercase())
                    .collect::<Vec<_>>(),
            );
        }

        for row in rows {
            table.add_row(columns.iter().map(|c| c.cell(row)).collect::<Vec<_>>());
        }

        for column in table.column_iter_mut() {
            column.set_padding((0, COLUMN_GAP));
        }

        for line in table.lines() {
            writeln!(out, "{}", line.trim_end())?;
        }
        Ok(())
    }
}

/// Compact age rendering with the same breakpoints kubectl uses:
/// seconds up to 2m, minutes+seconds up to 10m, minutes up to 3h, hours+minutes
/// up to 8h, hours up to 2d, days+hours up to 8d, days up to 2y, then years.
pub fn human_duration(d: Duration) -> String {
    let seconds = d.num_seconds();
    if seconds < -1 {
        return "<invalid>".to_string();
    }
    if seconds < 0 {
        return "0s".to_string();
    }
    if seconds < 60 * 2 {
        return format!("{}s", seconds);
    }

    let minutes = d.num_minutes();
    if minutes < 10 {
        let s = seconds % 60;
        return if s == 0 {
            format!("{}m", minutes)
        } else {
            format!("{}m{}s", minutes, s)
        };
    }
    if minutes < 60 * 3 {
        return format!("{}m", minutes);
    }

    let hours = d.num_hours();
    if hours < 8 {
        let m = minutes % 60;
        return if m == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h{}m", hours, m)
        };
    }
    if hours < 48 {
        return format!("{}h", hours);
    }
    if hours < 24 * 8 {
        let h = hours % 24;
        return if h == 0 {
            format!("{}d", hours / 24)
        } else {
            format!("{}d{}h", hours / 24, h)
        };
    }
    if hours < 24 * 365 * 2 {
        return format!("{}d", hours / 24);
    }
    if hours < 24 * 365 * 8 {
        let days = (hours / 24) % 365;
        return if days == 0 {
            format!("{}y", hours / 24 / 365)
        } else {
            format!("{}y{}d", hours / 24 / 365, days)
        };
    }
    format!("{}y", hours / 24 / 365)
}
