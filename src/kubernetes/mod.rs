mod client;
pub mod discovery;

pub use client::{KubeResourceClient, ResourceClient};

use kube::discovery::ApiResource;
use serde_json::Value;

use crate::extract::json_path::JsonPath;

/// Additional printer column declared by a CRD
#[derive(Debug, Clone)]
pub struct PrinterColumn {
    pub name: String,
    /// OpenAPI type of the column (`string`, `integer`, `date`, ...)
    pub column_type: String,
    pub json_path: JsonPath,
}

impl PrinterColumn {
    /// Build a column from one `additionalPrinterColumns` entry. Entries with a
    /// non-zero priority belong to the wide output and are skipped.
    pub fn from_crd_entry(entry: &Value) -> Option<Self> {
        let priority = entry.get("priority").and_then(Value::as_i64).unwrap_or(0);
        if priority != 0 {
            return None;
        }
        let name = entry.get("name")?.as_str()?;
        let raw_path = entry.get("jsonPath")?.as_str()?;
        let json_path = match JsonPath::parse(raw_path) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(
                    column = %name,
                    json_path = %raw_path,
                    error = %e,
                    "Skipping printer column"
                );
                return None;
            }
        };
        Some(Self {
            name: name.to_string(),
            column_type: entry
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("string")
                .to_string(),
            json_path,
        })
    }
}

/// A resolved resource type
#[derive(Debug, Clone)]
pub struct ResourceKind {
    pub api_resource: ApiResource,
    pub namespaced: bool,
    /// Lowercase singular name used in report lines ("Deleted pod ...")
    pub singular: String,
    /// Printer columns of a custom resource, empty for built-in kinds
    pub printer_columns: Vec<PrinterColumn>,
}

impl ResourceKind {
    pub fn plural(&self) -> &str {
        &self.api_resource.plural
    }

    pub fn group(&self) -> &str {
        &self.api_resource.group
    }

    /// Core `v1` pods, the only kind supporting exec and pod predicates
    pub fn is_pod(&self) -> bool {
        self.group().is_empty() && self.api_resource.version == "v1" && self.plural() == "pods"
    }

    pub fn is_service(&self) -> bool {
        self.group().is_empty() && self.plural() == "services"
    }

    /// Replica-managing controllers from the `apps` group
    pub fn is_replicated_workload(&self) -> bool {
        self.group() == "apps"
            && matches!(self.plural(), "deployments" | "statefulsets" | "replicasets")
    }
}

/// Where to look for namespaced objects
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NamespaceScope {
    /// The kubeconfig context namespace, falling back to `default`
    #[default]
    Default,
    Named(String),
    All,
}

impl NamespaceScope {
    pub fn is_all(&self) -> bool {
        matches!(self, NamespaceScope::All)
    }
}

/// How a patch document is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PatchStrategy {
    #[default]
    Strategic,
    Merge,
    Json,
}


#[cfg(test)]
mod tests {
    use super::testing::kind;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_predicates() {
        assert!(testing::pods().is_pod());
        assert!(!kind("metrics.k8s.io", "v1beta1", "PodMetrics", "pods", true).is_pod());
        assert!(kind("", "v1", "Service", "services", true).is_service());
        assert!(kind("apps", "v1", "Deployment", "deployments", true).is_replicated_workload());
        assert!(!kind("apps", "v1", "DaemonSet", "daemonsets", true).is_replicated_workload());
    }

    #[test]
    fn test_printer_column_from_crd_entry() {
        let col = PrinterColumn::from_crd_entry(&json!({
            "name": "Ready",
            "type": "string",
            "jsonPath": ".status.conditions[?(@.type==\"Ready\")].status"
        }))
        .unwrap();
        assert_eq!(col.name, "Ready");
        assert_eq!(col.column_type, "string");

        let wide = PrinterColumn::from_crd_entry(&json!({
            "name": "Issuer", "type": "string", "jsonPath": ".spec.issuerRef.name", "priority": 1
        }));
        assert!(wide.is_none());

        let broken = PrinterColumn::from_crd_entry(&json!({
            "name": "Bad", "type": "string", "jsonPath": ".spec..x"
        }));
        assert!(broken.is_none());
    }

    #[test]
    fn test_namespace_scope() {
        assert_eq!(NamespaceScope::default(), NamespaceScope::Default);
        assert!(NamespaceScope::All.is_all());
        assert!(!NamespaceScope::Named("kube-system".into()).is_all());
    }
}
