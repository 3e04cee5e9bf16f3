use chrono::{DateTime, Utc};
use serde_json::Value;

use super::columns::{self, ColumnOptions};
use crate::filter::FilterSpec;
use crate::kubernetes::ResourceKind;
use crate::output::Column;

/// Handler for every kind other than pods
#[derive(Debug, Clone)]
pub struct GenericHandler {
    kind: ResourceKind,
}

impl GenericHandler {
    pub fn new(kind: ResourceKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub fn matches(&self, obj: &Value, filters: &FilterSpec, now: DateTime<Utc>) -> bool {
        filters.matches_common(obj, now)
    }

    /// Service, workload or CRD printer columns, depending on the kind
    pub fn columns<'a>(
        &'a self,
        options: &'a ColumnOptions,
        show_namespace: bool,
        now: DateTime<Utc>,
    ) -> Vec<Column<'a>> {
        let kind_columns = if self.kind.is_service() {
            columns::service_columns()
        } else if self.kind.is_replicated_workload() {
            columns::workload_columns(&self.kind)
        } else {
            columns::printer_columns(&self.kind, now)
        };
        columns::assemble(show_namespace, kind_columns, options, Vec::new(), now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubernetes::testing;
    use chrono::TimeZone;
    use regex::Regex;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_generic_ignores_pod_predicates() {
        let handler = GenericHandler::new(testing::kind("", "v1", "ConfigMap", "configmaps", true));
        let filters = FilterSpec {
            name: Some(Regex::new("^app-").unwrap()),
            ..Default::default()
        };
        let cm = json!({"metadata": {"name": "app-config", "creationTimestamp": "2025-01-01T00:00:00Z"}});
        assert!(handler.matches(&cm, &filters, now()));
        let other = json!({"metadata": {"name": "kube-root-ca.crt"}});
        assert!(!handler.matches(&other, &filters, now()));
    }

    #[test]
    fn test_generic_columns_by_kind() {
        let options = ColumnOptions::default();

        let svc = GenericHandler::new(testing::kind("", "v1", "Service", "services", true));
        let headers: Vec<String> = svc
            .columns(&options, false, now())
            .iter()
            .map(|c| c.header.clone())
            .collect();
        assert_eq!(headers, vec!["NAME", "TYPE", "CLUSTER-IP", "EXTERNAL-IP", "PORT(S)", "AGE"]);

        let deploy =
            GenericHandler::new(testing::kind("apps", "v1", "Deployment", "deployments", true));
        let headers: Vec<String> = deploy
            .columns(&options, true, now())
            .iter()
            .map(|c| c.header.clone())
            .collect();
        assert_eq!(
            headers,
            vec!["NAMESPACE", "NAME", "READY", "UP-TO-DATE", "AVAILABLE", "AGE"]
        );

        let cm = GenericHandler::new(testing::kind("", "v1", "ConfigMap", "configmaps", true));
        let headers: Vec<String> = cm
            .columns(&options, false, now())
            .iter()
            .map(|c| c.header.clone())
            .collect();
        assert_eq!(headers, vec!["NAME", "AGE"]);
    }
}
