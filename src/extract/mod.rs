// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Typed accessors over untyped Kubernetes objects.
//!
//! Every resource travels through the tool as a `serde_json::Value` snapshot,
//! regardless of whether the kind is built-in or a CRD. The helpers here read
//! well-known fields out of that tree with a single get-by-path primitive.

pub mod json_path;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Placeholder for values that could not be determined
pub const UNKNOWN: &str = "<unknown>";

/// Placeholder for values that are legitimately absent
pub const NONE: &str = "<none>";

/// Walk `path` through nested objects, returning the value if every segment exists
pub fn nested<'a>(obj: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(obj, |current, key| current.get(*key))
}

pub fn nested_str<'a>(obj: &'a Value, path: &[&str]) -> Option<&'a str> {
    nested(obj, path).and_then(Value::as_str)
}

pub fn nested_i64(obj: &Value, path: &[&str]) -> Option<i64> {
    nested(obj, path).and_then(Value::as_i64)
}

pub fn nested_array<'a>(obj: &'a Value, path: &[&str]) -> &'a [Value] {
    nested(obj, path)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub fn name(obj: &Value) -> &str {
    nested_str(obj, &["metadata", "name"]).unwrap_or_default()
}

/// Namespace of the object, `None` for cluster-scoped objects
pub fn namespace(obj: &Value) -> Option<&str> {
    nested_str(obj, &["metadata", "namespace"]).filter(|ns| !ns.is_empty())
}

pub fn label<'a>(obj: &'a Value, key: &str) -> Option<&'a str> {
    nested_str(obj, &["metadata", "labels", key])
}

pub fn annotation<'a>(obj: &'a Value, key: &str) -> Option<&'a str> {
    nested_str(obj, &["metadata", "annotations", key])
}

pub fn creation_timestamp(obj: &Value) -> Option<DateTime<Utc>> {
    nested_str(obj, &["metadata", "creationTimestamp"]).and_then(parse_timestamp)
}

/// Parse an RFC 3339 timestamp as emitted by the API server
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Pod phase (`status.phase`)
pub fn pod_phase(pod: &Value) -> Option<&str> {
    nested_str(pod, &["status", "phase"])
}

/// Node a pod is bound to, falling back to the nominated node while it is
/// still being scheduled
pub fn pod_node(pod: &Value) -> Option<&str> {
    nested_str(pod, &["spec", "nodeName"])
        .filter(|n| !n.is_empty())
        .or_else(|| nested_str(pod, &["status", "nominatedNodeName"]).filter(|n| !n.is_empty()))
}

/// Images of regular containers followed by init containers
pub fn pod_images(pod: &Value) -> Vec<&str> {
    ["containers", "initContainers"]
        .into_iter()
        .flat_map(|field| nested_array(pod, &["spec", field]))
        .filter_map(|c| c.get("image").and_then(Value::as_str))
        .collect()
}

/// Sum of restart counts across all container statuses
pub fn pod_restart_count(pod: &Value) -> i64 {
    nested_array(pod, &["status", "containerStatuses"])
        .iter()
        .filter_map(|cs| cs.get("restartCount").and_then(Value::as_i64))
        .sum()
}

/// Most recent termination time among containers that have restarted
pub fn pod_last_restart(pod: &Value) -> Option<DateTime<Utc>> {
    nested_array(pod, &["status", "containerStatuses"])
        .iter()
        .filter(|cs| cs.get("restartCount").and_then(Value::as_i64).unwrap_or(0) > 0)
        .filter_map(|cs| nested_str(cs, &["lastState", "terminated", "finishedAt"]))
        .filter_map(parse_timestamp)
        .max()
}

/// Replica counts of a workload controller: (desired, ready, updated, available)
pub fn replica_counts(obj: &Value) -> (i64, i64, i64, i64) {
    (
        nested_i64(obj, &["spec", "replicas"]).unwrap_or(0),
        nested_i64(obj, &["status", "readyReplicas"]).unwrap_or(0),
        nested_i64(obj, &["status", "updatedReplicas"]).unwrap_or(0),
        nested_i64(obj, &["status", "availableReplicas"]).unwrap_or(0),
    )
}

/// Render a JSON scalar the way kubectl prints it in a table cell
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
