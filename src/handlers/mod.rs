// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Fetch, filter and act on resources of one kind.
//!
//! A run lists every candidate in the namespace scope (label selector
//! evaluated server-side), keeps the ones satisfying all predicates, then
//! performs exactly one action on the set. Mutations and exec run in match
//! order; only a listing is reordered by `--sort`.

pub mod columns;
mod generic;
mod pods;
mod prompt;

pub use columns::ColumnOptions;
pub use generic::GenericHandler;
pub use pods::PodHandler;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde_json::Value;
use std::io::{BufRead, Write};
use tracing::{debug, info};

use crate::extract;
use crate::filter::FilterSpec;
use crate::kubernetes::{NamespaceScope, PatchStrategy, ResourceClient, ResourceKind};
use crate::output::{SortOrder, TablePrinter, sort_by_name};
use columns::NodeLabelCache;
use prompt::Operation;

/// The terminal action applied to every matched object
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Action {
    #[default]
    List,
    Delete,
    Patch {
        document: Value,
        strategy: PatchStrategy,
    },
    Exec {
        command: String,
    },
}

/// Everything a handler needs for one run
#[derive(Debug, Default)]
pub struct ActionOptions {
    pub action: Action,
    pub scope: NamespaceScope,
    pub filters: FilterSpec,
    pub skip_confirm: bool,
    pub sort: Option<SortOrder>,
    pub columns: ColumnOptions,
    pub no_headers: bool,
}

/// Standard streams of the process, replaceable in tests
pub struct Streams<'a> {
    pub input: &'a mut (dyn BufRead + Send),
    pub out: &'a mut (dyn Write + Send),
    pub err: &'a mut (dyn Write + Send),
}

/// Closed set of per-kind handlers
#[derive(Debug, Clone)]
pub enum ResourceHandler {
    Pods(PodHandler),
    Generic(GenericHandler),
}

impl ResourceHandler {
    /// Pods in core `v1` get the pod handler, everything else the generic one
    pub fn for_kind(kind: ResourceKind) -> Self {
        if kind.is_pod() {
            ResourceHandler::Pods(PodHandler::new(kind))
        } else {
            ResourceHandler::Generic(GenericHandler::new(kind))
        }
    }

    pub fn kind(&self) -> &ResourceKind {
        match self {
            ResourceHandler::Pods(h) => h.kind(),
            ResourceHandler::Generic(h) => h.kind(),
        }
    }

    pub fn is_exec_capable(&self) -> bool {
        matches!(self, ResourceHandler::Pods(_))
    }

    /// Reject option combinations the kind cannot honour, before any list call
    pub fn validate(&self, options: &ActionOptions) -> Result<()> {
        let plural = self.kind().plural();
        if matches!(options.action, Action::Exec { .. }) && !self.is_exec_capable() {
            bail!("exec is not supported for {}, only for pods", plural);
        }
        if let ResourceHandler::Generic(_) = self {
            if options.filters.has_pod_only_filters() {
                bail!(
                    "--status, --node, --image and --restarted can only be used with pods, not {}",
                    plural
                );
            }
            if !options.columns.node_labels.is_empty() {
                bail!("--node-labels can only be used with pods, not {}", plural);
            }
        }
        Ok(())
    }

    fn matches(&self, obj: &Value, filters: &FilterSpec, now: chrono::DateTime<Utc>) -> bool {
        match self {
            ResourceHandler::Pods(h) => h.matches(obj, filters, now),
            ResourceHandler::Generic(h) => h.matches(obj, filters, now),
        }
    }

    /// List candidates and keep the ones matching every predicate
    pub async fn fetch_matching(
        &self,
        client: &dyn ResourceClient,
        options: &ActionOptions,
    ) -> Result<Vec<Value>> {
        let kind = self.kind();
        let items = client
            .list(kind, &options.scope, options.filters.label_selector.as_deref())
            .await
            .with_context(|| format!("failed to list {}", kind.plural()))?;

        let total = items.len();
        let now = Utc::now();
        let matched: Vec<Value> = items
            .into_iter()
            .filter(|obj| self.matches(obj, &options.filters, now))
            .collect();
        debug!(resource = %kind.plural(), total, matched = matched.len(), "Filtered candidates");
        Ok(matched)
    }

    /// Fetch, filter and perform the configured action
    pub async fn handle(
        &self,
        client: &dyn ResourceClient,
        options: &ActionOptions,
        streams: &mut Streams<'_>,
    ) -> Result<()> {
        let mut items = self.fetch_matching(client, options).await?;
        if items.is_empty() {
            return Ok(());
        }

        let show_namespace = self.kind().namespaced && options.scope.is_all();
        match &options.action {
            Action::List => {
                if let Some(order) = options.sort {
                    sort_by_name(&mut items, order);
                }
                self.print(client, &items, options, show_namespace, streams)
                    .await
            }
            Action::Delete | Action::Patch { .. } => {
                self.mutate(client, &items, &options.action, options, show_namespace, streams)
                    .await
            }
            Action::Exec { command } => match self {
                ResourceHandler::Pods(h) => {
                    let argv = pods::command_argv(command)?;
                    if !options.skip_confirm
                        && !prompt::confirm(
                            Operation::Exec,
                            h.kind(),
                            &items,
                            show_namespace,
                            streams,
                        )?
                    {
                        return Ok(());
                    }
                    h.exec(client, &items, &argv, streams).await
                }
                ResourceHandler::Generic(h) => {
                    bail!("unsupported action: exec for {}", h.kind().plural())
                }
            },
        }
    }

    async fn print(
        &self,
        client: &dyn ResourceClient,
        items: &[Value],
        options: &ActionOptions,
        show_namespace: bool,
        streams: &mut Streams<'_>,
    ) -> Result<()> {
        let now = Utc::now();
        let mut node_cache = NodeLabelCache::new();
        let columns = match self {
            ResourceHandler::Pods(h) => {
                if !options.columns.node_labels.is_empty() {
                    node_cache
                        .prefetch(client, items.iter().filter_map(extract::pod_node))
                        .await;
                }
                h.columns(&options.columns, &node_cache, show_namespace, now)
            }
            ResourceHandler::Generic(h) => h.columns(&options.columns, show_namespace, now),
        };
        TablePrinter::new(options.no_headers).print(&columns, items, &mut *streams.out)
    }

    /// Delete or patch every item after confirmation. Stops at the first failure.
    async fn mutate(
        &self,
        client: &dyn ResourceClient,
        items: &[Value],
        action: &Action,
        options: &ActionOptions,
        show_namespace: bool,
        streams: &mut Streams<'_>,
    ) -> Result<()> {
        let kind = self.kind();
        let op = match action {
            Action::Delete => Operation::Delete,
            Action::Patch { document, .. } => {
                if is_empty_patch(document) {
                    bail!("patch content is required for patch action");
                }
                Operation::Patch
            }
            _ => bail!("unsupported action"),
        };

        if !options.skip_confirm && !prompt::confirm(op, kind, items, show_namespace, streams)? {
            return Ok(());
        }

        for item in items {
            let name = extract::name(item);
            let namespace = if kind.namespaced {
                extract::namespace(item)
            } else {
                None
            };
            let verb = match action {
                Action::Patch { document, strategy } => {
                    client
                        .patch(kind, namespace, name, document, *strategy)
                        .await
                        .with_context(|| format!("failed to patch {} {}", kind.singular, name))?;
                    "Patched"
                }
                _ => {
                    client
                        .delete(kind, namespace, name)
                        .await
                        .with_context(|| format!("failed to delete {} {}", kind.singular, name))?;
                    "Deleted"
                }
            };
            info!(resource = %kind.plural(), name = %name, namespace = ?namespace, "{}", verb);
            match namespace {
                Some(ns) => writeln!(
                    streams.out,
                    "{} {} {} in namespace {}",
                    verb, kind.singular, name, ns
                )?,
                None => writeln!(streams.out, "{} {} {}", verb, kind.singular, name)?,
            }
        }
        Ok(())
    }
}

fn is_empty_patch(document: &Value) -> bool {
    match document {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeClient;
    use super::*;
    use crate::filter::{PodPhase, QueryFilter};
    use crate::kubernetes::testing;
    use chrono::Duration;
    use regex::Regex;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::io::Cursor;

    fn pod(name: &str, namespace: &str, phase: &str) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": name,
                "namespace": namespace,
                "creationTimestamp": Utc::now().to_rfc3339(),
                "labels": {"app": name.split('-').next().unwrap_or(name)}
            },
            "spec": {"nodeName": "node-a", "containers": [{"image": "nginx:1.27"}]},
            "status": {"phase": phase, "containerStatuses": [{"restartCount": 0}]}
        })
    }

    fn cluster() -> FakeClient {
        FakeClient::new(vec![
            pod("nginx-1", "default", "Running"),
            pod("redis-1", "default", "Pending"),
            pod("nginx-2", "prod", "Running"),
        ])
    }

    struct Run {
        result: Result<()>,
        out: String,
        err: String,
    }

    async fn run(
        handler: &ResourceHandler,
        client: &FakeClient,
        options: &ActionOptions,
        answer: &str,
    ) -> Run {
        let mut input = Cursor::new(answer.as_bytes().to_vec());
        let mut out = Vec::new();
        let mut err = Vec::new();
        let result = {
            let mut streams = Streams {
                input: &mut input,
                out: &mut out,
                err: &mut err,
            };
            handler.handle(client, options, &mut streams).await
        };
        Run {
            result,
            out: String::from_utf8(out).unwrap(),
            err: String::from_utf8(err).unwrap(),
        }
    }

    fn pods_handler() -> ResourceHandler {
        ResourceHandler::for_kind(testing::pods())
    }

    fn configmaps() -> ResourceHandler {
        ResourceHandler::for_kind(testing::kind("", "v1", "ConfigMap", "configmaps", true))
    }

    fn names(items: &[Value]) -> Vec<&str> {
        items.iter().map(extract::name).collect()
    }

    #[test]
    fn test_handler_selection() {
        assert!(pods_handler().is_exec_capable());
        let cm = configmaps();
        assert!(!cm.is_exec_capable());
        let metrics = ResourceHandler::for_kind(testing::kind(
            "metrics.k8s.io",
            "v1beta1",
            "PodMetrics",
            "pods",
            true,
        ));
        assert!(matches!(metrics, ResourceHandler::Generic(_)));
    }

    #[test]
    fn test_validation() {
        let cm = configmaps();

        let exec = ActionOptions {
            action: Action::Exec { command: "ls".into() },
            ..Default::default()
        };
        assert!(cm.validate(&exec).is_err());
        assert!(pods_handler().validate(&exec).is_ok());

        let status = ActionOptions {
            filters: FilterSpec {
                phase: Some(PodPhase::Running),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(cm.validate(&status).is_err());
        assert!(pods_handler().validate(&status).is_ok());

        let node_labels = ActionOptions {
            columns: ColumnOptions {
                node_labels: vec!["zone".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(cm.validate(&node_labels).is_err());
        assert!(pods_handler().validate(&node_labels).is_ok());
    }

    #[tokio::test]
    async fn test_empty_filter_returns_everything_in_scope() {
        let client = cluster();
        let options = ActionOptions {
            scope: NamespaceScope::All,
            ..Default::default()
        };
        let items = pods_handler().fetch_matching(&client, &options).await.unwrap();
        assert_eq!(names(&items), vec!["nginx-1", "redis-1", "nginx-2"]);
    }

    #[tokio::test]
    async fn test_namespace_scopes() {
        let client = cluster();
        let handler = pods_handler();

        let default = ActionOptions::default();
        let items = handler.fetch_matching(&client, &default).await.unwrap();
        assert_eq!(names(&items), vec!["nginx-1", "redis-1"]);

        let named = ActionOptions {
            scope: NamespaceScope::Named("prod".into()),
            ..Default::default()
        };
        let items = handler.fetch_matching(&client, &named).await.unwrap();
        assert_eq!(names(&items), vec!["nginx-2"]);
    }

    #[tokio::test]
    async fn test_name_regex_and_label_selector() {
        let client = cluster();
        let options = ActionOptions {
            scope: NamespaceScope::All,
            filters: FilterSpec {
                name: Some(Regex::new("^nginx").unwrap()),
                ..Default::default()
            },
            ..Default::default()
        };
        let items = pods_handler().fetch_matching(&client, &options).await.unwrap();
        assert_eq!(names(&items), vec!["nginx-1", "nginx-2"]);

        let options = ActionOptions {
            scope: NamespaceScope::All,
            filters: FilterSpec {
                label_selector: Some("app=redis".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let items = pods_handler().fetch_matching(&client, &options).await.unwrap();
        assert_eq!(names(&items), vec!["redis-1"]);
    }

    #[tokio::test]
    async fn test_jq_running_pods() {
        let client = cluster();
        let options = ActionOptions {
            scope: NamespaceScope::All,
            filters: FilterSpec {
                query: Some(QueryFilter::compile(r#".status.phase == "Running""#).unwrap()),
                ..Default::default()
            },
            ..Default::default()
        };
        let items = pods_handler().fetch_matching(&client, &options).await.unwrap();
        assert_eq!(names(&items), vec!["nginx-1", "nginx-2"]);
    }

    #[tokio::test]
    async fn test_age_filter_excludes_fresh_pods() {
        let client = cluster();
        let options = ActionOptions {
            scope: NamespaceScope::All,
            filters: FilterSpec {
                min_age: Some(Duration::days(1)),
                ..Default::default()
            },
            ..Default::default()
        };
        let items = pods_handler().fetch_matching(&client, &options).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_sorting() {
        let client = FakeClient::new(vec![
            pod("web-10", "default", "Running"),
            pod("web-2", "default", "Running"),
            pod("web-1", "default", "Running"),
        ]);
        let options = ActionOptions {
            sort: Some(SortOrder::Natural),
            ..Default::default()
        };
        let listed = run(&pods_handler(), &client, &options, "").await;
        listed.result.unwrap();
        let rows: Vec<&str> = listed
            .out
            .lines()
            .skip(1)
            .filter_map(|line| line.split_whitespace().next())
            .collect();
        assert_eq!(rows, vec!["web-1", "web-2", "web-10"]);

        let unsorted = ActionOptions::default();
        let items = pods_handler().fetch_matching(&client, &unsorted).await.unwrap();
        assert_eq!(names(&items), vec!["web-10", "web-2", "web-1"]);
    }

    #[tokio::test]
    async fn test_list_prints_table() {
        let client = cluster();
        let options = ActionOptions {
            scope: NamespaceScope::All,
            ..Default::default()
        };
        let run = run(&pods_handler(), &client, &options, "").await;
        run.result.unwrap();
        let lines: Vec<&str> = run.out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("NAMESPACE"));
        assert!(lines[0].contains("STATUS"));
        assert!(lines[0].ends_with("AGE"));
        assert!(lines[1].starts_with("default"));
        assert!(run.err.is_empty());
    }

    #[tokio::test]
    async fn test_empty_result_prints_nothing() {
        let client = cluster();
        let options = ActionOptions {
            filters: FilterSpec {
                name: Some(Regex::new("^postgres").unwrap()),
                ..Default::default()
            },
            action: Action::Delete,
            ..Default::default()
        };
        let run = run(&pods_handler(), &client, &options, "y\n").await;
        run.result.unwrap();
        assert!(run.out.is_empty());
        assert!(run.err.is_empty());
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_node_label_columns_use_cache() {
        let mut client = cluster();
        client.nodes.insert(
            "node-a".into(),
            BTreeMap::from([("topology.kubernetes.io/zone".into(), "eu-1a".into())]),
        );
        let options = ActionOptions {
            columns: ColumnOptions {
                node_labels: vec!["topology.kubernetes.io/zone".into()],
                ..Default::default()
            },
            no_headers: true,
            ..Default::default()
        };
        let run = run(&pods_handler(), &client, &options, "").await;
        run.result.unwrap();
        let first: Vec<&str> = run.out.lines().next().unwrap().split_whitespace().collect();
        assert_eq!(first[0], "nginx-1");
        assert_eq!(first[2], "node-a");
        assert_eq!(first[3], "eu-1a");
    }

    #[tokio::test]
    async fn test_declined_delete_leaves_cluster_untouched() {
        let client = cluster();
        let options = ActionOptions {
            action: Action::Delete,
            ..Default::default()
        };
        let run = run(&pods_handler(), &client, &options, "n\n").await;
        run.result.unwrap();
        assert!(client.calls().is_empty());
        assert!(run.out.is_empty());
        assert!(run.err.starts_with("The following pods will be deleted:\n- nginx-1\n- redis-1\n"));
        assert!(run.err.ends_with("Deletion cancelled.\n"));
    }

    #[tokio::test]
    async fn test_confirmed_delete_mutates_each_item_once() {
        let client = cluster();
        let options = ActionOptions {
            action: Action::Delete,
            filters: FilterSpec {
                name: Some(Regex::new("^nginx").unwrap()),
                ..Default::default()
            },
            scope: NamespaceScope::All,
            ..Default::default()
        };
        let run = run(&pods_handler(), &client, &options, "yes\n").await;
        run.result.unwrap();
        assert_eq!(
            client.calls(),
            vec![
                ("delete".to_string(), Some("default".to_string()), "nginx-1".to_string()),
                ("delete".to_string(), Some("prod".to_string()), "nginx-2".to_string()),
            ]
        );
        assert_eq!(
            run.out,
            "Deleted pod nginx-1 in namespace default\nDeleted pod nginx-2 in namespace prod\n"
        );
        assert!(run.err.contains("- nginx-2 in namespace prod\n"));
    }

    #[tokio::test]
    async fn test_force_skips_prompt() {
        let client = cluster();
        let options = ActionOptions {
            action: Action::Delete,
            skip_confirm: true,
            ..Default::default()
        };
        let run = run(&pods_handler(), &client, &options, "").await;
        run.result.unwrap();
        assert_eq!(client.calls().len(), 2);
        assert!(run.err.is_empty());
    }

    #[tokio::test]
    async fn test_first_failure_aborts_remaining() {
        let mut client = cluster();
        client.failing = vec!["nginx-1".into()];
        let options = ActionOptions {
            action: Action::Delete,
            skip_confirm: true,
            ..Default::default()
        };
        let run = run(&pods_handler(), &client, &options, "").await;
        let err = run.result.unwrap_err();
        assert_eq!(err.to_string(), "failed to delete pod nginx-1");
        assert!(format!("{:#}", err).contains("the server rejected nginx-1"));
        assert!(client.calls().is_empty());
        assert!(run.out.is_empty());
    }

    #[tokio::test]
    async fn test_patch_cluster_scoped_kind() {
        let client = FakeClient::new(vec![
            json!({"metadata": {"name": "node-a"}}),
            json!({"metadata": {"name": "node-b"}}),
        ]);
        let handler = ResourceHandler::for_kind(testing::kind("", "v1", "Node", "nodes", false));
        let options = ActionOptions {
            action: Action::Patch {
                document: json!({"metadata": {"labels": {"drain": "true"}}}),
                strategy: PatchStrategy::Merge,
            },
            ..Default::default()
        };
        let run = run(&handler, &client, &options, "y\n").await;
        run.result.unwrap();
        assert!(run.err.starts_with("The following nodes will be patched:\n- node-a\n- node-b\n"));
        assert_eq!(run.out, "Patched node node-a\nPatched node node-b\n");
        assert_eq!(client.calls()[0], ("patch".to_string(), None, "node-a".to_string()));
    }

    #[tokio::test]
    async fn test_empty_patch_is_an_error() {
        let client = cluster();
        let options = ActionOptions {
            action: Action::Patch {
                document: Value::Null,
                strategy: PatchStrategy::Strategic,
            },
            ..Default::default()
        };
        let run = run(&pods_handler(), &client, &options, "y\n").await;
        assert!(run.result.is_err());
        assert!(client.calls().is_empty());
        assert!(run.err.is_empty());
    }

    #[tokio::test]
    async fn test_exec_runs_in_each_pod() {
        let client = cluster();
        let options = ActionOptions {
            action: Action::Exec {
                command: "cat  /etc/hostname".into(),
            },
            filters: FilterSpec {
                name: Some(Regex::new("^nginx").unwrap()),
                ..Default::default()
            },
            scope: NamespaceScope::All,
            ..Default::default()
        };
        let run = run(&pods_handler(), &client, &options, "y\n").await;
        run.result.unwrap();
        assert!(run.err.starts_with("The following pods will have the command executed:\n"));
        assert_eq!(run.out, "nginx-1: cat /etc/hostname\nnginx-2: cat /etc/hostname\n");
        assert_eq!(client.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_exec_declined_and_empty_command() {
        let client = cluster();
        let options = ActionOptions {
            action: Action::Exec { command: "ls".into() },
            ..Default::default()
        };
        let run_declined = run(&pods_handler(), &client, &options, "n\n").await;
        run_declined.result.unwrap();
        assert!(run_declined.err.ends_with("Execution cancelled.\n"));
        assert!(client.calls().is_empty());

        let options = ActionOptions {
            action: Action::Exec { command: "   ".into() },
            skip_confirm: true,
            ..Default::default()
        };
        let run_empty = run(&pods_handler(), &client, &options, "").await;
        assert!(run_empty.result.is_err());
    }

    #[tokio::test]
    async fn test_empty_exec_command_fails_before_prompt() {
        let client = cluster();
        let options = ActionOptions {
            action: Action::Exec { command: "".into() },
            ..Default::default()
        };
        let run = run(&pods_handler(), &client, &options, "y\n").await;
        let err = run.result.unwrap_err();
        assert_eq!(err.to_string(), "exec command is required for exec action");
        assert!(!run.err.contains("Are you sure"));
        assert!(run.err.is_empty());
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_list_in_missing_namespace_prints_nothing() {
        let client = cluster();
        let options = ActionOptions {
            scope: NamespaceScope::Named("nope".into()),
            ..Default::default()
        };
        let run = run(&pods_handler(), &client, &options, "").await;
        run.result.unwrap();
        assert!(run.out.is_empty());
        assert!(run.err.is_empty());
        assert_eq!(*client.list_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_runs_in_match_order_despite_sort() {
        let client = FakeClient::new(vec![
            pod("web-10", "default", "Running"),
            pod("web-2", "default", "Running"),
        ]);
        let options = ActionOptions {
            action: Action::Delete,
            sort: Some(SortOrder::Natural),
            ..Default::default()
        };
        let run = run(&pods_handler(), &client, &options, "y\n").await;
        run.result.unwrap();
        assert!(run.err.starts_with("The following pods will be deleted:\n- web-10\n- web-2\n"));
        let order: Vec<String> = client.calls().into_iter().map(|(_, _, name)| name).collect();
        assert_eq!(order, vec!["web-10", "web-2"]);
    }

    #[tokio::test]
    async fn test_exec_on_generic_kind_is_rejected() {
        let client = FakeClient::new(vec![json!({
            "metadata": {"name": "cfg", "namespace": "default"}
        })]);
        let handler = configmaps();
        let options = ActionOptions {
            action: Action::Exec { command: "ls".into() },
            skip_confirm: true,
            ..Default::default()
        };
        let run = run(&handler, &client, &options, "").await;
        assert!(run.result.is_err());
    }
}
