// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Candidate predicates
//!
//! Each predicate looks at one dimension of a candidate document (name, age,
//! phase, node, images, restarts, jq query). `FilterSpec` holds the optional
//! predicates for a run and evaluates their conjunction; an absent predicate
//! is always satisfied.

pub mod query;

pub use query::QueryFilter;

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::extract;

/// Pod lifecycle phase accepted by `--status`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    pub const ALL: [PodPhase; 5] = [
        PodPhase::Pending,
        PodPhase::Running,
        PodPhase::Succeeded,
        PodPhase::Failed,
        PodPhase::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PodPhase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        PodPhase::ALL
            .into_iter()
            .find(|phase| phase.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                anyhow!(
                    "invalid pod status '{}': must be one of Pending, Running, Succeeded, Failed, Unknown",
                    s
                )
            })
    }
}

/// Parse a duration made of `<int><unit>` groups, e.g. `2d`, `1h30m`, `500ms`.
/// Units: `ms`, `s`, `m`, `h`, `d`, `w`.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    if input.is_empty() {
        bail!("empty duration");
    }

    let mut total = Duration::zero();
    let mut chars = input.chars().peekable();

    while chars.peek().is_some() {
        let mut digits = String::new();
        while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
            digits.push(c);
            chars.next();
        }
        let mut unit = String::new();
        while let Some(c) = chars.peek().copied().filter(char::is_ascii_alphabetic) {
            unit.push(c);
            chars.next();
        }

        if digits.is_empty() || unit.is_empty() {
            bail!(
                "invalid duration '{}': expected <number><unit> groups such as 2d or 1h30m",
                input
            );
        }

        let amount: i64 = digits
            .parse()
            .map_err(|_| anyhow!("invalid duration '{}': number out of range", input))?;
        let part = match unit.as_str() {
            "ms" => Duration::try_milliseconds(amount),
            "s" => Duration::try_seconds(amount),
            "m" => Duration::try_minutes(amount),
            "h" => Duration::try_hours(amount),
            "d" => Duration::try_days(amount),
            "w" => Duration::try_weeks(amount),
            other => bail!(
                "invalid duration '{}': unknown unit '{}' (use ms, s, m, h, d or w)",
                input,
                other
            ),
        }
        .ok_or_else(|| anyhow!("invalid duration '{}': out of range", input))?;

        total = total
            .checked_add(&part)
            .ok_or_else(|| anyhow!("invalid duration '{}': out of range", input))?;
    }

    Ok(total)
}

pub fn matches_name(pattern: &Regex, obj: &Value) -> bool {
    pattern.is_match(extract::name(obj))
}

/// Age window check. `min_age` requires the object to be at least that old,
/// `max_age` at most that old. An object without a creation timestamp never
/// satisfies an active bound.
pub fn matches_age(
    obj: &Value,
    min_age: Option<Duration>,
    max_age: Option<Duration>,
    now: DateTime<Utc>,
) -> bool {
    if min_age.is_none() && max_age.is_none() {
        return true;
    }
    let Some(created) = extract::creation_timestamp(obj) else {
        return false;
    };
    let age = now - created;
    min_age.is_none_or(|min| age >= min) && max_age.is_none_or(|max| age <= max)
}

pub fn matches_phase(pod: &Value, phase: PodPhase) -> bool {
    extract::pod_phase(pod) == Some(phase.as_str())
}

/// Node regex against the bound (or nominated) node; unscheduled pods never match
pub fn matches_node(pattern: &Regex, pod: &Value) -> bool {
    extract::pod_node(pod).is_some_and(|node| pattern.is_match(node))
}

/// True when any container or init container image matches
pub fn matches_image(pattern: &Regex, pod: &Value) -> bool {
    extract::pod_images(pod)
        .into_iter()
        .any(|image| pattern.is_match(image))
}

pub fn matches_restarted(pod: &Value) -> bool {
    extract::pod_restart_count(pod) > 0
}

/// The set of predicates for one run
#[derive(Debug, Default)]
pub struct FilterSpec {
    pub name: Option<Regex>,
    pub min_age: Option<Duration>,
    pub max_age: Option<Duration>,
    /// Passed verbatim to the list call, evaluated server-side
    pub label_selector: Option<String>,
    pub phase: Option<PodPhase>,
    pub node: Option<Regex>,
    pub image: Option<Regex>,
    pub restarted: bool,
    pub query: Option<QueryFilter>,
}

impl FilterSpec {
    /// Whether any predicate that only makes sense for pods is set
    pub fn has_pod_only_filters(&self) -> bool {
        self.phase.is_some() || self.node.is_some() || self.image.is_some() || self.restarted
    }

    /// Name, age and jq predicates, applicable to every kind
    pub fn matches_common(&self, obj: &Value, now: DateTime<Utc>) -> bool {
        if let Some(pattern) = &self.name
            && !matches_name(pattern, obj)
        {
            return false;
        }
        if !matches_age(obj, self.min_age, self.max_age, now) {
            return false;
        }
        // jq runs last, it is the most expensive check
        self.query.as_ref().is_none_or(|q| q.matches(obj))
    }

    /// Common predicates plus phase, node, image and restart checks
    pub fn matches_pod(&self, pod: &Value, now: DateTime<Utc>) -> bool {
        if self.phase.is_some_and(|phase| !matches_phase(pod, phase)) {
            return false;
        }
        if self.node.as_ref().is_some_and(|re| !matches_node(re, pod)) {
            return false;
        }
        if self.image.as_ref().is_some_and(|re| !matches_image(re, pod)) {
            return false;
        }
        if self.restarted && !matches_restarted(pod) {
            return false;
        }
        self.matches_common(pod, now)
    }
}
