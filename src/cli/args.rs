// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use anyhow::{Context, Result, bail};
use clap::Parser;
use regex::Regex;

use crate::filter::{FilterSpec, PodPhase, QueryFilter, parse_duration};
use crate::handlers::{Action, ActionOptions, ColumnOptions};
use crate::kubernetes::{NamespaceScope, PatchStrategy};
use crate::output::SortOrder;

const EXAMPLES: &str = "\
Examples:
  # find all pods with names matching 'nginx' in the current namespace
  kubectl-find -r nginx

  # find all failed pods in all namespaces and delete them
  kubectl-find pods --status failed -A --delete

  # find pods older than two days that restarted at least once
  kubectl-find --min-age 2d --restarted

  # run a command in every pod scheduled on a node matching 'worker-1'
  kubectl-find --node worker-1 -e 'cat /etc/hostname'

  # force a sync of every ExternalSecret
  kubectl-find externalsecret -A -p '{\"metadata\":{\"annotations\":{\"force-sync\":\"now\"}}}'

  # find pods with a jq expression
  kubectl-find -j '.status.containerStatuses[]?.restartCount > 3'";

#[derive(Parser, Debug)]
#[command(name = "kubectl-find")]
#[command(
    author,
    version,
    about = "Find Kubernetes resources and perform actions on them",
    after_help = EXAMPLES
)]
pub struct Args {
    /// Resource type to search, e.g. pods, deploy, certificates.cert-manager.io
    #[arg(default_value = "pods")]
    pub resource: String,

    /// Regular expression matched against resource names
    #[arg(short = 'r', long = "name", value_name = "REGEX")]
    pub name: Option<String>,

    /// Pod phase: Pending, Running, Succeeded, Failed or Unknown
    #[arg(long)]
    pub status: Option<String>,

    /// Search in all namespaces
    #[arg(short = 'A', long)]
    pub all_namespaces: bool,

    /// Namespace to search (defaults to the context namespace)
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Kubeconfig context to use
    #[arg(long)]
    pub context: Option<String>,

    /// Label selector, evaluated by the API server
    #[arg(short = 'l', long = "selector")]
    pub selector: Option<String>,

    /// Delete all matched resources
    #[arg(long)]
    pub delete: bool,

    /// Execute a command in every matched pod
    #[arg(short, long, value_name = "COMMAND")]
    pub exec: Option<String>,

    /// Patch all matched resources with this JSON document
    #[arg(short, long, value_name = "JSON")]
    pub patch: Option<String>,

    /// Patch strategy used with --patch
    #[arg(long, value_enum, default_value_t = PatchStrategy::Strategic)]
    pub patch_type: PatchStrategy,

    /// Minimum age, e.g. 2d or 1h30m
    #[arg(long, value_name = "DURATION")]
    pub min_age: Option<String>,

    /// Maximum age, e.g. 2d or 1h30m
    #[arg(long, value_name = "DURATION")]
    pub max_age: Option<String>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub force: bool,

    /// Regular expression matched against the pod's node name
    #[arg(long, value_name = "REGEX")]
    pub node: Option<String>,

    /// Only pods with at least one container restart
    #[arg(long)]
    pub restarted: bool,

    /// Regular expression matched against container images
    #[arg(long, value_name = "REGEX")]
    pub image: Option<String>,

    /// jq expression; objects with a truthy result match
    #[arg(short, long, value_name = "EXPR")]
    pub jq: Option<String>,

    /// Comma-separated label keys to show as columns
    #[arg(short = 'L', long, value_delimiter = ',')]
    pub labels: Vec<String>,

    /// Comma-separated annotation keys to show as columns
    #[arg(long, value_delimiter = ',')]
    pub annotations: Vec<String>,

    /// Comma-separated node label keys to show as columns (pods only)
    #[arg(short = 'N', long, value_delimiter = ',')]
    pub node_labels: Vec<String>,

    /// Sort the output by name
    #[arg(long, value_enum)]
    pub sort: Option<SortOrder>,

    /// Omit column headers in output
    #[arg(long)]
    pub no_headers: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    fn action(&self) -> Result<Action> {
        if self.delete && self.patch.is_some() {
            bail!("cannot specify both --delete and --patch flags");
        }
        if self.exec.is_some() && (self.delete || self.patch.is_some()) {
            bail!("cannot specify both --delete or --patch and --exec flags");
        }

        if let Some(raw) = &self.patch {
            let document = serde_json::from_str(raw)
                .with_context(|| format!("invalid patch document {:?}", raw))?;
            return Ok(Action::Patch {
                document,
                strategy: self.patch_type,
            });
        }
        if let Some(command) = &self.exec {
            return Ok(Action::Exec {
                command: command.clone(),
            });
        }
        Ok(if self.delete {
            Action::Delete
        } else {
            Action::List
        })
    }

    fn scope(&self) -> Result<NamespaceScope> {
        match (&self.namespace, self.all_namespaces) {
            (Some(_), true) => bail!("cannot specify both --namespace and --all-namespaces flags"),
            (Some(ns), false) => Ok(NamespaceScope::Named(ns.clone())),
            (None, true) => Ok(NamespaceScope::All),
            (None, false) => Ok(NamespaceScope::Default),
        }
    }

    fn filters(&self) -> Result<FilterSpec> {
        let regex = |raw: &Option<String>, what: &str| -> Result<Option<Regex>> {
            raw.as_deref()
                .map(|r| Regex::new(r).with_context(|| format!("invalid {} regex {:?}", what, r)))
                .transpose()
        };
        let duration = |raw: &Option<String>, what: &str| {
            raw.as_deref()
                .map(|d| parse_duration(d).with_context(|| format!("invalid {} age {:?}", what, d)))
                .transpose()
        };

        Ok(FilterSpec {
            name: regex(&self.name, "name")?,
            min_age: duration(&self.min_age, "minimum")?,
            max_age: duration(&self.max_age, "maximum")?,
            label_selector: self.selector.clone().filter(|s| !s.trim().is_empty()),
            phase: self.status.as_deref().map(str::parse::<PodPhase>).transpose()?,
            node: regex(&self.node, "node name")?,
            image: regex(&self.image, "image")?,
            restarted: self.restarted,
            query: self.jq.as_deref().map(QueryFilter::compile).transpose()?,
        })
    }

    /// Validate flag combinations and compile every pattern. Runs before any
    /// cluster access so configuration errors never reach the API server.
    pub fn to_options(&self) -> Result<ActionOptions> {
        Ok(ActionOptions {
            action: self.action()?,
            scope: self.scope()?,
            filters: self.filters()?,
            skip_confirm: self.force,
            sort: self.sort,
            columns: ColumnOptions {
                labels: self.labels.clone(),
                annotations: self.annotations.clone(),
                node_labels: self.node_labels.clone(),
                show_restarts: self.restarted,
                show_images: self.image.is_some(),
            },
            no_headers: self.no_headers,
        })
    }
}
