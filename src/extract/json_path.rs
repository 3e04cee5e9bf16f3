// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Restricted JSONPath evaluator for CRD printer columns.
//!
//! Custom resource definitions declare `additionalPrinterColumns` whose values
//! are addressed with a small subset of kubectl's JSONPath dialect. This
//! module implements just that subset as a read-only tree walk.
//!
//! # Syntax
//!
//! - `.field` - Object field access: `.status.phase`
//! - `['key']` - Quoted field access, for keys containing dots:
//!   `.metadata.labels['app.kubernetes.io/name']`
//! - `[n]` - Array index (0-based, negative counts from the end): `.spec.containers[0].image`
//! - `[*]` / `.*` - All array elements or object values: `.spec.containers[*].name`
//! - `[?(@.path == "value")]` - Keep array elements matching a comparison (`==`, `!=`),
//!   or `[?(@.path)]` to keep elements where the path exists
//!
//! The expression may be wrapped in `{...}` and may start with `$`.
//! Recursive descent (`..`), slices and functions are not supported.

use anyhow::{Result, anyhow, bail};
use serde_json::Value;
use std::iter::Peekable;
use std::str::Chars;

use super::display_value;

/// Comparison used by a filter segment
#[derive(Debug, Clone, Copy, PartialEq)]
enum FilterOp {
    Eq,
    Ne,
}

/// Parsed segment of a JSON path
#[derive(Debug, Clone, PartialEq)]
enum PathSegment {
    /// Object field access: `.field_name` or `['field.name']`
    Field(String),
    /// Array index: `[0]`, `[-1]`
    Index(i64),
    /// All children: `[*]` or `.*`
    Wildcard,
    /// Array element filter: `[?(@.type=="Ready")]`
    Filter {
        path: Vec<PathSegment>,
        predicate: Option<(FilterOp, Value)>,
    },
}

/// A compiled JSONPath expression
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPath {
    segments: Vec<PathSegment>,
}

impl JsonPath {
    /// Parse a JSONPath expression such as `.status.conditions[?(@.type=="Ready")].status`
    pub fn parse(expr: &str) -> Result<Self> {
        let trimmed = expr.trim();
        let inner = trimmed
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .unwrap_or(trimmed)
            .trim();
        let inner = inner.strip_prefix('$').unwrap_or(inner);

        let mut chars = inner.chars().peekable();
        let segments = parse_path_segments(&mut chars)?;
        if let Some(c) = chars.peek() {
            bail!("unexpected character '{}' in JSONPath {:?}", c, expr);
        }
        Ok(Self { segments })
    }

    /// All values addressed by this path, in document order
    pub fn select<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        apply(&self.segments, vec![root])
    }

    /// Comma-joined display form of the selected values, `None` when nothing matched
    pub fn render(&self, root: &Value) -> Option<String> {
        let values = self.select(root);
        if values.is_empty() {
            return None;
        }
        Some(
            values
                .into_iter()
                .map(display_value)
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

fn apply<'a>(segments: &[PathSegment], mut current: Vec<&'a Value>) -> Vec<&'a Value> {
    for segment in segments {
        current = current
            .into_iter()
            .flat_map(|value| step(segment, value))
            .collect();
        if current.is_empty() {
            break;
        }
    }
    current
}

fn step<'a>(segment: &PathSegment, value: &'a Value) -> Vec<&'a Value> {
    match segment {
        PathSegment::Field(name) => value.get(name.as_str()).into_iter().collect(),
        PathSegment::Index(i) => {
            let Some(items) = value.as_array() else {
                return Vec::new();
            };
            let idx = if *i < 0 {
                items.len().checked_sub(i.unsigned_abs() as usize)
            } else {
                Some(*i as usize)
            };
            idx.and_then(|idx| items.get(idx)).into_iter().collect()
        }
        PathSegment::Wildcard => match value {
            Value::Array(items) => items.iter().collect(),
            Value::Object(map) => map.values().collect(),
            _ => Vec::new(),
        },
        PathSegment::Filter { path, predicate } => value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter(|item| filter_matches(path, predicate.as_ref(), item))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn filter_matches(
    path: &[PathSegment],
    predicate: Option<&(FilterOp, Value)>,
    item: &Value,
) -> bool {
    let found = apply(path, vec![item]);
    match predicate {
        None => !found.is_empty(),
        Some((FilterOp::Eq, literal)) => found.iter().any(|v| *v == literal),
        Some((FilterOp::Ne, literal)) => !found.is_empty() && found.iter().all(|v| *v != literal),
    }
}

/// Parse path segments (.field, .*, [n], [*], ['key'], [?(...)]) from the character iterator.
fn parse_path_segments(chars: &mut Peekable<Chars>) -> Result<Vec<PathSegment>> {
    let mut segments = Vec::new();

    while let Some(&c) = chars.peek() {
        match c {
            '.' => {
                chars.next();
                match chars.peek() {
                    Some('.') => bail!("recursive descent (..) is not supported"),
                    Some('*') => {
                        chars.next();
                        segments.push(PathSegment::Wildcard);
                    }
                    _ => {
                        let field = consume_field_name(chars);
                        if field.is_empty() {
                            bail!("empty field name in JSONPath");
                        }
                        segments.push(PathSegment::Field(field));
                    }
                }
            }
            '[' => {
                chars.next();
                segments.push(parse_bracket_segment(chars)?);
            }
            _ => break,
        }
    }

    Ok(segments)
}

/// Consume a field name from the character iterator. A backslash escapes the
/// following character, so `app\.kubernetes\.io/name` is a single key.
fn consume_field_name(chars: &mut Peekable<Chars>) -> String {
    let mut field = String::new();
    while let Some(&c) = chars.peek() {
        if c == '\\' {
            chars.next();
            if let Some(escaped) = chars.next() {
                field.push(escaped);
            }
        } else if c.is_alphanumeric() || matches!(c, '_' | '-' | '/' | ':' | '$') {
            field.push(c);
            chars.next();
        } else {
            break;
        }
    }
    field
}

/// Parse a bracket segment and consume the closing bracket.
fn parse_bracket_segment(chars: &mut Peekable<Chars>) -> Result<PathSegment> {
    skip_whitespace(chars);
    let segment = match chars.peek().copied() {
        Some('*') => {
            chars.next();
            PathSegment::Wildcard
        }
        Some(quote @ ('\'' | '"')) => {
            chars.next();
            PathSegment::Field(consume_quoted(chars, quote)?)
        }
        Some('?') => {
            chars.next();
            parse_filter(chars)?
        }
        Some(c) if c.is_ascii_digit() || c == '-' => {
            let mut index = String::new();
            index.push(c);
            chars.next();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() {
                    index.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let index = index
                .parse::<i64>()
                .map_err(|_| anyhow!("invalid array index '{}'", index))?;
            PathSegment::Index(index)
        }
        Some(c) => bail!("unexpected character '{}' after '['", c),
        None => bail!("unterminated '[' in JSONPath"),
    };
    skip_whitespace(chars);
    expect(chars, ']')?;
    Ok(segment)
}

/// Parse `(@.path op literal)` following a `?`
fn parse_filter(chars: &mut Peekable<Chars>) -> Result<PathSegment> {
    expect(chars, '(')?;
    skip_whitespace(chars);
    expect(chars, '@')?;
    let path = parse_path_segments(chars)?;
    skip_whitespace(chars);

    let op = match chars.peek() {
        Some('=') => {
            chars.next();
            expect(chars, '=')?;
            Some(FilterOp::Eq)
        }
        Some('!') => {
            chars.next();
            expect(chars, '=')?;
            Some(FilterOp::Ne)
        }
        _ => None,
    };

    let predicate = match op {
        Some(op) => {
            skip_whitespace(chars);
            Some((op, parse_literal(chars)?))
        }
        None => None,
    };

    skip_whitespace(chars);
    expect(chars, ')')?;
    Ok(PathSegment::Filter { path, predicate })
}

fn parse_literal(chars: &mut Peekable<Chars>) -> Result<Value> {
    match chars.peek().copied() {
        Some(quote @ ('\'' | '"')) => {
            chars.next();
            Ok(Value::String(consume_quoted(chars, quote)?))
        }
        _ => {
            let mut token = String::new();
            while let Some(&c) = chars.peek() {
                if c == ')' || c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
            serde_json::from_str(&token)
                .map_err(|_| anyhow!("invalid literal '{}' in JSONPath filter", token))
        }
    }
}

fn consume_quoted(chars: &mut Peekable<Chars>, quote: char) -> Result<String> {
    let mut out = String::new();
    loop {
        match chars.next() {
            Some('\\') => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            Some(c) if c == quote => return Ok(out),
            Some(c) => out.push(c),
            None => bail!("unterminated string in JSONPath"),
        }
    }
}

fn skip_whitespace(chars: &mut Peekable<Chars>) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}

fn expect(chars: &mut Peekable<Chars>, expected: char) -> Result<()> {
    match chars.next() {
        Some(c) if c == expected => Ok(()),
        Some(c) => bail!("expected '{}' but found '{}' in JSONPath", expected, c),
        None => bail!("expected '{}' but reached end of JSONPath", expected),
    }
}
