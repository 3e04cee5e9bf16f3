// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use std::cmp::Ordering;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::extract;

/// Order in which matched objects are printed and acted upon
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Plain byte-wise comparison of names
    Lexical,
    /// Digit runs compared by numeric value (`pod-2` before `pod-10`)
    Natural,
}

impl SortOrder {
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match self {
            SortOrder::Lexical => a.cmp(b),
            SortOrder::Natural => natural_compare(a, b),
        }
    }
}

/// Stable sort by object name, namespace breaking ties
pub fn sort_by_name(items: &mut [Value], order: SortOrder) {
    items.sort_by(|a, b| {
        order
            .compare(extract::name(a), extract::name(b))
            .then_with(|| extract::namespace(a).cmp(&extract::namespace(b)))
    });
}

/// Compare strings treating runs of ASCII digits as numbers.
///
/// Non-digit runs compare lexically. Digit runs compare by value; equal values
/// with different zero padding put the shorter run first.
pub fn natural_compare(a: &str, b: &str) -> Ordering {
    let mut ai = a.char_indices().peekable();
    let mut bi = b.char_indices().peekable();

    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some((_, ac)), Some((_, bc))) => {
                if ac.is_ascii_digit() && bc.is_ascii_digit() {
                    let an = take_digits(a, &mut ai);
                    let bn = take_digits(b, &mut bi);
                    let ord = compare_digit_runs(an, bn);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                } else {
                    let ord = ac.cmp(&bc);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                    ai.next();
                    bi.next();
                }
            }
        }
    }
}

fn take_digits<'a>(
    s: &'a str,
    iter: &mut std::iter::Peekable<std::str::CharIndices<'a>>,
) -> &'a str {
    let start = iter.peek().map(|(i, _)| *i).unwrap_or(s.len());
    let mut end = start;
    while let Some((i, c)) = iter.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        end = i + c.len_utf8();
        iter.next();
    }
    &s[start..end]
}

fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let at = a.trim_start_matches('0');
    let bt = b.trim_start_matches('0');
    at.len()
        .cmp(&bt.len())
        .then_with(|| at.cmp(bt))
        .then_with(|| a.len().cmp(&b.len()))
}
