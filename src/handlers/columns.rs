// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Table columns per resource kind.
//!
//! Every column maps one candidate document to a display string. The list is
//! assembled as NAMESPACE (all-namespaces only), NAME, kind-specific columns,
//! label and annotation columns, node-label columns (pods only), AGE.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::extract::{self, NONE, UNKNOWN};
use crate::kubernetes::{ResourceClient, ResourceKind};
use crate::output::{Column, human_duration};

/// Services with more ports than this are shown truncated
const MAX_SERVICE_PORTS: usize = 10;

/// Column-related settings for a run
#[derive(Debug, Clone, Default)]
pub struct ColumnOptions {
    /// Label keys shown as extra columns (`-L`)
    pub labels: Vec<String>,
    pub annotations: Vec<String>,
    /// Node label keys shown for each pod's node (`-N`)
    pub node_labels: Vec<String>,
    pub show_restarts: bool,
    pub show_images: bool,
}

/// Node labels looked up once per node for the duration of a run.
///
/// Populated with `prefetch` before rendering so extractors stay synchronous.
/// A failed lookup is remembered and renders as `<unknown>`.
#[derive(Debug, Default)]
pub struct NodeLabelCache {
    nodes: HashMap<String, Option<BTreeMap<String, String>>>,
}

impl NodeLabelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch labels for every node not yet cached, one lookup per distinct node
    pub async fn prefetch<'a, I>(&mut self, client: &dyn ResourceClient, nodes: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for node in nodes {
            if self.nodes.contains_key(node) {
                continue;
            }
            let labels = match client.node_labels(node).await {
                Ok(labels) => Some(labels),
                Err(e) => {
                    debug!(node = %node, error = %e, "Node lookup failed");
                    None
                }
            };
            self.nodes.insert(node.to_string(), labels);
        }
    }

    /// Label value for a node: `<unknown>` when the node could not be looked
    /// up, `<none>` when it has no such label
    pub fn label(&self, node: &str, key: &str) -> String {
        match self.nodes.get(node) {
            Some(Some(labels)) => labels
                .get(key)
                .cloned()
                .unwrap_or_else(|| NONE.to_string()),
            _ => UNKNOWN.to_string(),
        }
    }
}

/// Column header for a label key: the part after `/` when prefixed, upper-cased
pub fn label_to_header(key: &str) -> String {
    match key.split_once('/') {
        Some((_, name)) if !name.contains('/') => name.to_uppercase(),
        _ => key.to_uppercase(),
    }
}

fn age_at(ts: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    ts.map(|t| human_duration(now - t))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

pub fn namespace_column<'a>() -> Column<'a> {
    Column::new("NAMESPACE", |o: &Value| {
        extract::namespace(o).unwrap_or_default().to_string()
    })
}

pub fn name_column<'a>() -> Column<'a> {
    Column::new("NAME", |o: &Value| extract::name(o).to_string())
}

pub fn age_column<'a>(now: DateTime<Utc>) -> Column<'a> {
    Column::new("AGE", move |o: &Value| {
        age_at(extract::creation_timestamp(o), now)
    })
}

/// STATUS, plus RESTARTS and IMAGES when requested
pub fn pod_columns<'a>(options: &ColumnOptions, now: DateTime<Utc>) -> Vec<Column<'a>> {
    let mut columns = vec![Column::new("STATUS", |o: &Value| {
        extract::pod_phase(o).unwrap_or(UNKNOWN).to_string()
    })];

    if options.show_restarts {
        columns.push(Column::new("RESTARTS", move |o: &Value| {
            let count = extract::pod_restart_count(o);
            match extract::pod_last_restart(o) {
                Some(last) => format!("{} ({} ago)", count, human_duration(now - last)),
                None => count.to_string(),
            }
        }));
    }

    if options.show_images {
        columns.push(Column::new("IMAGES", |o: &Value| {
            extract::pod_images(o).join(", ")
        }));
    }

    columns
}

fn service_ports(svc: &Value) -> String {
    let Some(ports) = extract::nested(svc, &["spec", "ports"]).and_then(Value::as_array) else {
        return NONE.to_string();
    };
    let rendered: Vec<String> = ports
        .iter()
        .map(|p| {
            let port = p.get("port").map(extract::display_value).unwrap_or_default();
            let protocol = p.get("protocol").and_then(Value::as_str).unwrap_or("TCP");
            match p.get("nodePort").filter(|n| !n.is_null()) {
                Some(node_port) => format!(
                    "{}:{}/{}",
                    port,
                    extract::display_value(node_port),
                    protocol
                ),
                None => format!("{}/{}", port, protocol),
            }
        })
        .collect();
    if rendered.len() > MAX_SERVICE_PORTS {
        format!("{} ...", rendered[..MAX_SERVICE_PORTS].join(","))
    } else {
        rendered.join(",")
    }
}

/// TYPE, CLUSTER-IP, EXTERNAL-IP, PORT(S)
pub fn service_columns<'a>() -> Vec<Column<'a>> {
    vec![
        Column::new("TYPE", |o: &Value| {
            extract::nested_str(o, &["spec", "type"])
                .unwrap_or(UNKNOWN)
                .to_string()
        }),
        Column::new("CLUSTER-IP", |o: &Value| {
            extract::nested_str(o, &["spec", "clusterIP"])
                .unwrap_or(NONE)
                .to_string()
        }),
        Column::new("EXTERNAL-IP", |o: &Value| {
            let ips: Vec<&str> = extract::nested_array(o, &["status", "loadBalancer", "ingress"])
                .iter()
                .filter_map(|entry| entry.get("ip").and_then(Value::as_str))
                .collect();
            if ips.is_empty() {
                NONE.to_string()
            } else {
                ips.join(", ")
            }
        }),
        Column::new("PORT(S)", service_ports),
    ]
}

/// Replica columns for deployments, statefulsets and replicasets
pub fn workload_columns<'a>(kind: &ResourceKind) -> Vec<Column<'a>> {
    match kind.plural() {
        "deployments" => vec![
            Column::new("READY", |o: &Value| {
                let (desired, ready, _, _) = extract::replica_counts(o);
                format!("{}/{}", ready, desired)
            }),
            Column::new("UP-TO-DATE", |o: &Value| {
                extract::replica_counts(o).2.to_string()
            }),
            Column::new("AVAILABLE", |o: &Value| {
                extract::replica_counts(o).3.to_string()
            }),
        ],
        "statefulsets" => vec![Column::new("READY", |o: &Value| {
            let (desired, ready, _, _) = extract::replica_counts(o);
            format!("{}/{}", ready, desired)
        })],
        "replicasets" => vec![
            Column::new("DESIRED", |o: &Value| {
                extract::replica_counts(o).0.to_string()
            }),
            Column::new("CURRENT", |o: &Value| {
                extract::nested_i64(o, &["status", "replicas"])
                    .unwrap_or(0)
                    .to_string()
            }),
            Column::new("READY", |o: &Value| {
                extract::replica_counts(o).1.to_string()
            }),
        ],
        _ => Vec::new(),
    }
}

/// Additional printer columns declared by a CRD. `date` columns render as an
/// age; an `Age` column is dropped since AGE is always appended.
pub fn printer_columns<'a>(kind: &'a ResourceKind, now: DateTime<Utc>) -> Vec<Column<'a>> {
    kind.printer_columns
        .iter()
        .filter(|col| !col.name.eq_ignore_ascii_case("age"))
        .map(|col| {
            let is_date = col.column_type == "date";
            Column::new(col.name.to_uppercase(), move |o: &Value| {
                let Some(rendered) = col.json_path.render(o) else {
                    return NONE.to_string();
                };
                if is_date {
                    match extract::parse_timestamp(&rendered) {
                        Some(ts) => human_duration(now - ts),
                        None => rendered,
                    }
                } else {
                    rendered
                }
            })
        })
        .collect()
}

pub fn label_columns<'a>(keys: &'a [String]) -> Vec<Column<'a>> {
    keys.iter()
        .map(|key| {
            Column::new(label_to_header(key), move |o: &Value| {
                extract::label(o, key).unwrap_or(NONE).to_string()
            })
        })
        .collect()
}

pub fn annotation_columns<'a>(keys: &'a [String]) -> Vec<Column<'a>> {
    keys.iter()
        .map(|key| {
            Column::new(label_to_header(key), move |o: &Value| {
                extract::annotation(o, key).unwrap_or(NONE).to_string()
            })
        })
        .collect()
}

/// NODE plus one column per node label key
pub fn node_label_columns<'a>(keys: &'a [String], cache: &'a NodeLabelCache) -> Vec<Column<'a>> {
    if keys.is_empty() {
        return Vec::new();
    }
    let mut columns = vec![Column::new("NODE", |o: &Value| {
        extract::pod_node(o).unwrap_or(UNKNOWN).to_string()
    })];
    columns.extend(keys.iter().map(|key| {
        Column::new(label_to_header(key), move |o: &Value| match extract::pod_node(o) {
            Some(node) => cache.label(node, key),
            None => UNKNOWN.to_string(),
        })
    }));
    columns
}

/// Assemble the full column list around the kind-specific columns
pub fn assemble<'a>(
    show_namespace: bool,
    kind_columns: Vec<Column<'a>>,
    options: &'a ColumnOptions,
    node_columns: Vec<Column<'a>>,
    now: DateTime<Utc>,
) -> Vec<Column<'a>> {
    let mut columns = Vec::new();
    if show_namespace {
        columns.push(namespace_column());
    }
    columns.push(name_column());
    columns.extend(kind_columns);
    columns.extend(label_columns(&options.labels));
    columns.extend(annotation_columns(&options.annotations));
    columns.extend(node_columns);
    columns.push(age_column(now));
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubernetes::testing;
    use crate::kubernetes::{NamespaceScope, PatchStrategy, PrinterColumn};
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;
    use std::io::Write;
    use std::sync::Mutex;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap()
    }

    fn headers(columns: &[Column<'_>]) -> Vec<String> {
        columns.iter().map(|c| c.header.clone()).collect()
    }

    fn pod() -> Value {
        json!({
            "metadata": {
                "name": "web-0",
                "namespace": "default",
                "creationTimestamp": "2025-01-08T12:00:00Z",
                "labels": {"app.kubernetes.io/name": "web"},
                "annotations": {"team": "core"}
            },
            "spec": {
                "nodeName": "node-a",
                "containers": [{"image": "nginx:1.27"}, {"image": "envoy:1.30"}]
            },
            "status": {
                "phase": "Running",
                "containerStatuses": [
                    {"restartCount": 2, "lastState": {"terminated": {"finishedAt": "2025-01-10T11:00:00Z"}}}
                ]
            }
        })
    }

    /// Node lookups only; counts calls per node
    struct NodeOnlyClient {
        nodes: HashMap<String, BTreeMap<String, String>>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ResourceClient for NodeOnlyClient {
        async fn list(
            &self,
            _: &ResourceKind,
            _: &NamespaceScope,
            _: Option<&str>,
        ) -> Result<Vec<Value>> {
            Ok(Vec::new())
        }
        async fn delete(&self, _: &ResourceKind, _: Option<&str>, _: &str) -> Result<()> {
            Ok(())
        }
        async fn patch(
            &self,
            _: &ResourceKind,
            _: Option<&str>,
            _: &str,
            _: &Value,
            _: PatchStrategy,
        ) -> Result<()> {
            Ok(())
        }
        async fn node_labels(&self, node: &str) -> Result<BTreeMap<String, String>> {
            self.calls.lock().unwrap().push(node.to_string());
            self.nodes
                .get(node)
                .cloned()
                .ok_or_else(|| anyhow!("nodes \"{}\" not found", node))
        }
        async fn exec(
            &self,
            _: &str,
            _: &str,
            _: &[String],
            _: &mut (dyn Write + Send),
            _: &mut (dyn Write + Send),
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_label_to_header() {
        assert_eq!(label_to_header("app"), "APP");
        assert_eq!(label_to_header("app.kubernetes.io/name"), "NAME");
        assert_eq!(label_to_header("topology.kubernetes.io/zone"), "ZONE");
        assert_eq!(label_to_header("a/b/c"), "A/B/C");
    }

    #[test]
    fn test_pod_columns() {
        let p = pod();
        let basic = pod_columns(&ColumnOptions::default(), now());
        assert_eq!(headers(&basic), vec!["STATUS"]);
        assert_eq!(basic[0].cell(&p), "Running");
        assert_eq!(basic[0].cell(&json!({})), UNKNOWN);

        let options = ColumnOptions {
            show_restarts: true,
            show_images: true,
            ..Default::default()
        };
        let full = pod_columns(&options, now());
        assert_eq!(headers(&full), vec!["STATUS", "RESTARTS", "IMAGES"]);
        assert_eq!(full[1].cell(&p), "2 (60m ago)");
        assert_eq!(full[1].cell(&json!({"status": {}})), "0");
        assert_eq!(full[2].cell(&p), "nginx:1.27, envoy:1.30");
    }

    #[test]
    fn test_service_columns() {
        let svc = json!({
            "spec": {
                "type": "LoadBalancer",
                "clusterIP": "10.0.0.1",
                "ports": [
                    {"port": 80, "protocol": "TCP", "nodePort": 30080},
                    {"port": 53, "protocol": "UDP"}
                ]
            },
            "status": {"loadBalancer": {"ingress": [{"ip": "1.2.3.4"}, {"ip": "5.6.7.8"}]}}
        });
        let columns = service_columns();
        assert_eq!(headers(&columns), vec!["TYPE", "CLUSTER-IP", "EXTERNAL-IP", "PORT(S)"]);
        let cells: Vec<String> = columns.iter().map(|c| c.cell(&svc)).collect();
        assert_eq!(
            cells,
            vec!["LoadBalancer", "10.0.0.1", "1.2.3.4, 5.6.7.8", "80:30080/TCP,53/UDP"]
        );

        let bare = json!({"spec": {}});
        let cells: Vec<String> = columns.iter().map(|c| c.cell(&bare)).collect();
        assert_eq!(cells, vec![UNKNOWN, NONE, NONE, NONE]);
    }

    #[test]
    fn test_service_ports_truncated() {
        let ports: Vec<Value> = (0..12)
            .map(|i| json!({"port": 8000 + i, "protocol": "TCP"}))
            .collect();
        let svc = json!({"spec": {"ports": ports}});
        let rendered = service_ports(&svc);
        assert!(rendered.ends_with("8009/TCP ..."));
        assert!(!rendered.contains("8010"));
    }

    #[test]
    fn test_workload_columns() {
        let deploy = json!({
            "spec": {"replicas": 3},
            "status": {"replicas": 3, "readyReplicas": 2, "updatedReplicas": 3, "availableReplicas": 2}
        });
        let kind = testing::kind("apps", "v1", "Deployment", "deployments", true);
        let cells: Vec<String> = workload_columns(&kind).iter().map(|c| c.cell(&deploy)).collect();
        assert_eq!(cells, vec!["2/3", "3", "2"]);

        let kind = testing::kind("apps", "v1", "ReplicaSet", "replicasets", true);
        let cells: Vec<String> = workload_columns(&kind).iter().map(|c| c.cell(&deploy)).collect();
        assert_eq!(cells, vec!["3", "3", "2"]);

        let kind = testing::kind("", "v1", "ConfigMap", "configmaps", true);
        assert!(workload_columns(&kind).is_empty());
    }

    #[test]
    fn test_printer_columns() {
        let mut kind = testing::kind("cert-manager.io", "v1", "Certificate", "certificates", true);
        kind.printer_columns = [
            json!({"name": "Ready", "type": "string", "jsonPath": ".status.conditions[?(@.type==\"Ready\")].status"}),
            json!({"name": "Expires", "type": "date", "jsonPath": ".status.notAfter"}),
            json!({"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}),
        ]
        .iter()
        .filter_map(PrinterColumn::from_crd_entry)
        .collect();

        let cert = json!({
            "status": {
                "conditions": [{"type": "Ready", "status": "True"}],
                "notAfter": "2025-01-08T12:00:00Z"
            }
        });
        let columns = printer_columns(&kind, now());
        assert_eq!(headers(&columns), vec!["READY", "EXPIRES"]);
        assert_eq!(columns[0].cell(&cert), "True");
        assert_eq!(columns[1].cell(&cert), "2d");
        assert_eq!(columns[0].cell(&json!({})), NONE);
    }

    #[test]
    fn test_label_and_annotation_columns() {
        let p = pod();
        let labels = vec!["app.kubernetes.io/name".to_string(), "tier".to_string()];
        let columns = label_columns(&labels);
        assert_eq!(headers(&columns), vec!["NAME", "TIER"]);
        assert_eq!(columns[0].cell(&p), "web");
        assert_eq!(columns[1].cell(&p), NONE);

        let annotations = vec!["team".to_string()];
        let columns = annotation_columns(&annotations);
        assert_eq!(columns[0].cell(&p), "core");
    }

    #[tokio::test]
    async fn test_node_label_cache_prefetch() {
        let client = NodeOnlyClient {
            nodes: HashMap::from([(
                "node-a".to_string(),
                BTreeMap::from([("zone".to_string(), "eu-1a".to_string())]),
            )]),
            calls: Mutex::new(Vec::new()),
        };

        let mut cache = NodeLabelCache::new();
        cache
            .prefetch(&client, ["node-a", "node-a", "node-missing", "node-a"])
            .await;
        assert_eq!(cache.nodes.len(), 2);
        assert_eq!(*client.calls.lock().unwrap(), vec!["node-a", "node-missing"]);

        assert_eq!(cache.label("node-a", "zone"), "eu-1a");
        assert_eq!(cache.label("node-a", "rack"), NONE);
        assert_eq!(cache.label("node-missing", "zone"), UNKNOWN);
        assert_eq!(cache.label("never-fetched", "zone"), UNKNOWN);

        // already cached nodes are not fetched again
        cache.prefetch(&client, ["node-a"]).await;
        assert_eq!(client.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_node_label_columns() {
        let mut cache = NodeLabelCache::new();
        cache.nodes.insert(
            "node-a".to_string(),
            Some(BTreeMap::from([(
                "topology.kubernetes.io/zone".to_string(),
                "eu-1a".to_string(),
            )])),
        );
        let keys = vec!["topology.kubernetes.io/zone".to_string()];
        let columns = node_label_columns(&keys, &cache);
        assert_eq!(headers(&columns), vec!["NODE", "ZONE"]);
        assert_eq!(columns[0].cell(&pod()), "node-a");
        assert_eq!(columns[1].cell(&pod()), "eu-1a");

        let unscheduled = json!({"spec": {}, "status": {}});
        assert_eq!(columns[0].cell(&unscheduled), UNKNOWN);
        assert_eq!(columns[1].cell(&unscheduled), UNKNOWN);

        assert!(node_label_columns(&[], &cache).is_empty());
    }

    #[test]
    fn test_assemble_order() {
        let options = ColumnOptions {
            labels: vec!["app".to_string()],
            annotations: vec!["team".to_string()],
            ..Default::default()
        };
        let columns = assemble(
            true,
            pod_columns(&options, now()),
            &options,
            Vec::new(),
            now(),
        );
        assert_eq!(
            headers(&columns),
            vec!["NAMESPACE", "NAME", "STATUS", "APP", "TEAM", "AGE"]
        );
        assert_eq!(columns[5].cell(&pod()), "2d");
        assert_eq!(columns[5].cell(&json!({})), UNKNOWN);

        let columns = assemble(false, Vec::new(), &options, Vec::new(), now());
        assert_eq!(headers(&columns)[0], "NAME");
    }
}
