// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Resource type resolution.
//!
//! A resource token from the command line (`pods`, `po`, `deploy`,
//! `certificates.cert-manager.io`, `pods.v1`) is resolved first against a
//! built-in table of core kinds (no API round-trip), then against live API
//! discovery, which also covers CRDs.

use anyhow::{Context, Result, anyhow};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::discovery::{ApiCapabilities, ApiResource, Discovery, Scope};
use kube::{Api, Client};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::{PrinterColumn, ResourceKind};

/// A parsed resource token: the resource name plus an optional API group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindQuery {
    pub name: String,
    pub group: Option<String>,
}

impl KindQuery {
    /// Parse `name`, `name.version`, `name.group`, `name.version.group` or
    /// `name/anything`
    pub fn parse(token: &str) -> Self {
        let token = clean_resource_name(token.trim());
        match token.split_once('.') {
            Some((name, rest)) => {
                let group = match rest.split_once('.') {
                    Some((first, group)) if is_version(first) => Some(group),
                    _ if is_version(rest) => None,
                    _ => Some(rest),
                };
                Self {
                    name: name.to_lowercase(),
                    group: group.map(str::to_lowercase),
                }
            }
            None => Self {
                name: token.to_lowercase(),
                group: None,
            },
        }
    }

    fn matches(&self, ar: &ApiResource) -> bool {
        if let Some(group) = &self.group
            && !group.eq_ignore_ascii_case(&ar.group)
        {
            return false;
        }
        self.name.eq_ignore_ascii_case(&ar.plural) || self.name.eq_ignore_ascii_case(&ar.kind)
    }
}

/// Drop everything after a `/` (`pods/log` -> `pods`)
pub fn clean_resource_name(token: &str) -> &str {
    token.split('/').next().unwrap_or(token)
}

/// `v1`, `v2`, `v1beta1`, `v2alpha3`
fn is_version(s: &str) -> bool {
    let Some(rest) = s.strip_prefix('v') else {
        return false;
    };
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if digits_end == 0 {
        return false;
    }
    let suffix = &rest[digits_end..];
    suffix.is_empty()
        || ["alpha", "beta"].iter().any(|stage| {
            suffix
                .strip_prefix(stage)
                .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        })
}

/// Built-in table of core kinds indexed by plural name and aliases
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    by_plural: HashMap<String, ResourceKind>,
    alias_map: HashMap<String, String>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kind under its plural, singular, lowercase kind and `aliases`
    pub fn add(&mut self, kind: ResourceKind, aliases: &[&str]) {
        let plural = kind.plural().to_string();
        for alias in aliases
            .iter()
            .map(|a| a.to_string())
            .chain([kind.singular.clone(), kind.api_resource.kind.to_lowercase()])
        {
            self.alias_map.insert(alias, plural.clone());
        }
        self.alias_map.insert(plural.clone(), plural.clone());
        self.by_plural.insert(plural, kind);
    }

    /// Look up a kind by plural, singular, kind or short name
    pub fn get(&self, name: &str) -> Option<&ResourceKind> {
        let plural = self.alias_map.get(&name.to_lowercase())?;
        self.by_plural.get(plural)
    }

    pub fn lookup(&self, query: &KindQuery) -> Option<&ResourceKind> {
        self.get(&query.name).filter(|kind| {
            query
                .group
                .as_deref()
                .is_none_or(|group| group.eq_ignore_ascii_case(kind.group()))
        })
    }
}

/// Build the registry of core kinds from k8s-openapi type information
pub fn build_core_registry() -> KindRegistry {
    use k8s_openapi::api::{
        apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet},
        autoscaling::v2::HorizontalPodAutoscaler,
        batch::v1::{CronJob, Job},
        core::v1::{
            ConfigMap, Endpoints, Event, LimitRange, Namespace, Node, PersistentVolume,
            PersistentVolumeClaim, Pod, ResourceQuota, Secret, Service, ServiceAccount,
        },
        networking::v1::{Ingress, NetworkPolicy},
        policy::v1::PodDisruptionBudget,
        rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding},
        storage::v1::StorageClass,
    };

    let mut registry = KindRegistry::new();

    // Namespaced flag is explicit since the Resource trait's Scope is an associated type
    macro_rules! add_kind {
        ($type:ty, namespaced, [$($alias:expr),* $(,)?]) => {{
            add_kind!(@inner $type, true, [$($alias),*])
        }};
        ($type:ty, cluster, [$($alias:expr),* $(,)?]) => {{
            add_kind!(@inner $type, false, [$($alias),*])
        }};
        (@inner $type:ty, $namespaced:expr, [$($alias:expr),* $(,)?]) => {{
            let ar = ApiResource::erase::<$type>(&());
            let kind = ResourceKind {
                singular: ar.kind.to_lowercase(),
                api_resource: ar,
                namespaced: $namespaced,
                printer_columns: Vec::new(),
            };
            registry.add(kind, &[$($alias),*]);
        }};
    }

    // Core API (v1) - namespaced
    add_kind!(Pod, namespaced, ["po"]);
    add_kind!(Service, namespaced, ["svc"]);
    add_kind!(ConfigMap, namespaced, ["cm"]);
    add_kind!(Secret, namespaced, []);
    add_kind!(Event, namespaced, ["ev"]);
    add_kind!(ServiceAccount, namespaced, ["sa"]);
    add_kind!(Endpoints, namespaced, ["ep"]);
    add_kind!(PersistentVolumeClaim, namespaced, ["pvc"]);
    add_kind!(ResourceQuota, namespaced, ["quota"]);
    add_kind!(LimitRange, namespaced, ["limits"]);

    // Core API (v1) - cluster-scoped
    add_kind!(Node, cluster, ["no"]);
    add_kind!(Namespace, cluster, ["ns"]);
    add_kind!(PersistentVolume, cluster, ["pv"]);

    // apps/v1
    add_kind!(Deployment, namespaced, ["deploy"]);
    add_kind!(StatefulSet, namespaced, ["sts"]);
    add_kind!(DaemonSet, namespaced, ["ds"]);
    add_kind!(ReplicaSet, namespaced, ["rs"]);

    // batch/v1
    add_kind!(Job, namespaced, []);
    add_kind!(CronJob, namespaced, ["cj"]);

    // networking.k8s.io/v1
    add_kind!(Ingress, namespaced, ["ing"]);
    add_kind!(NetworkPolicy, namespaced, ["netpol"]);

    // autoscaling/v2
    add_kind!(HorizontalPodAutoscaler, namespaced, ["hpa"]);

    // policy/v1
    add_kind!(PodDisruptionBudget, namespaced, ["pdb"]);

    // storage.k8s.io/v1
    add_kind!(StorageClass, cluster, ["sc"]);

    // rbac.authorization.k8s.io/v1
    add_kind!(Role, namespaced, []);
    add_kind!(RoleBinding, namespaced, []);
    add_kind!(ClusterRole, cluster, []);
    add_kind!(ClusterRoleBinding, cluster, []);

    registry
}

/// Pick the discovered resource matching `query`, preferring the
/// lexicographically smallest group (kubectl's group preference)
pub fn best_match<'a, I>(resources: I, query: &KindQuery) -> Option<(ApiResource, ApiCapabilities)>
where
    I: IntoIterator<Item = (&'a str, ApiResource, ApiCapabilities)>,
{
    resources
        .into_iter()
        .filter(|(_, ar, _)| !ar.plural.contains('/'))
        .filter(|(_, ar, _)| query.matches(ar))
        .min_by(|(a, _, _), (b, _, _)| a.cmp(b))
        .map(|(_, ar, caps)| (ar, caps))
}

/// Resolve a resource token to a kind: core table first, then API discovery
pub async fn resolve_kind(client: &Client, token: &str) -> Result<ResourceKind> {
    let query = KindQuery::parse(token);
    if query.name.is_empty() {
        return Err(anyhow!("empty resource type"));
    }

    if let Some(kind) = build_core_registry().lookup(&query) {
        debug!(token = %token, plural = %kind.plural(), "Resolved from core table");
        return Ok(kind.clone());
    }

    let mut discovery = Discovery::new(client.clone());
    if let Some(group) = &query.group {
        discovery = discovery.filter(&[group.as_str()]);
    }
    let discovery = discovery
        .run()
        .await
        .context("API discovery failed")?;

    let candidates = discovery.groups().flat_map(|group| {
        group
            .recommended_resources()
            .into_iter()
            .map(move |(ar, caps)| (group.name(), ar, caps))
    });

    let (ar, caps) = best_match(candidates, &query).ok_or_else(|| {
        anyhow!(
            "unable to resolve resource {}: the server doesn't have a resource type \"{}\"",
            token,
            query.name
        )
    })?;

    let mut kind = ResourceKind {
        namespaced: caps.scope == Scope::Namespaced,
        singular: ar.kind.to_lowercase(),
        api_resource: ar,
        printer_columns: Vec::new(),
    };
    debug!(
        token = %token,
        group = %kind.group(),
        version = %kind.api_resource.version,
        plural = %kind.plural(),
        "Resolved from discovery"
    );

    // Only CRD-backed groups carry printer columns
    if kind.group().contains('.') {
        match fetch_printer_columns(client, &kind).await {
            Ok(columns) => kind.printer_columns = columns,
            Err(e) => warn!(
                resource = %kind.plural(),
                error = %e,
                "Could not load printer columns"
            ),
        }
    }

    Ok(kind)
}

async fn fetch_printer_columns(client: &Client, kind: &ResourceKind) -> Result<Vec<PrinterColumn>> {
    let crd_name = format!("{}.{}", kind.plural(), kind.group());
    let api: Api<CustomResourceDefinition> = Api::all(client.clone());
    let crd = api
        .get(&crd_name)
        .await
        .with_context(|| format!("Failed to get CRD {}", crd_name))?;
    let crd = serde_json::to_value(crd).context("Failed to serialize CRD")?;
    Ok(printer_columns_for_version(&crd, &kind.api_resource.version))
}

/// Priority-0 additional printer columns declared for `version` of a CRD
pub fn printer_columns_for_version(crd: &Value, version: &str) -> Vec<PrinterColumn> {
    crd.pointer("/spec/versions")
        .and_then(Value::as_array)
        .and_then(|versions| {
            versions
                .iter()
                .find(|v| v.get("name").and_then(Value::as_str) == Some(version))
        })
        .and_then(|v| v.get("additionalPrinterColumns"))
        .and_then(Value::as_array)
        .map(|cols| cols.iter().filter_map(PrinterColumn::from_crd_entry).collect())
        .unwrap_or_default()
}
