use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

use super::Streams;
use super::columns::{self, ColumnOptions, NodeLabelCache};
use crate::extract;
use crate::filter::FilterSpec;
use crate::kubernetes::{ResourceClient, ResourceKind};
use crate::output::Column;

/// Split an exec command on whitespace. An empty command is an error.
pub fn command_argv(command: &str) -> Result<Vec<String>> {
    let argv: Vec<String> = command.split_whitespace().map(str::to_string).collect();
    if argv.is_empty() {
        bail!("exec command is required for exec action");
    }
    Ok(argv)
}

/// Handler for core `v1` pods: pod predicates, pod columns and exec
#[derive(Debug, Clone)]
pub struct PodHandler {
    kind: ResourceKind,
}

impl PodHandler {
    pub fn new(kind: ResourceKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub fn matches(&self, pod: &Value, filters: &FilterSpec, now: DateTime<Utc>) -> bool {
        filters.matches_pod(pod, now)
    }

    pub fn columns<'a>(
        &'a self,
        options: &'a ColumnOptions,
        node_cache: &'a NodeLabelCache,
        show_namespace: bool,
        now: DateTime<Utc>,
    ) -> Vec<Column<'a>> {
        columns::assemble(
            show_namespace,
            columns::pod_columns(options, now),
            options,
            columns::node_label_columns(&options.node_labels, node_cache),
            now,
        )
    }

    /// Run `argv` in every pod, in order. The first failure aborts the rest.
    pub async fn exec(
        &self,
        client: &dyn ResourceClient,
        pods: &[Value],
        argv: &[String],
        streams: &mut Streams<'_>,
    ) -> Result<()> {
        for pod in pods {
            let name = extract::name(pod);
            let namespace = extract::namespace(pod)
                .ok_or_else(|| anyhow!("pod {} has no namespace", name))?;
            info!(pod = %name, namespace = %namespace, command = ?argv, "Executing command");
            client
                .exec(namespace, name, argv, &mut *streams.out, &mut *streams.err)
                .await
                .with_context(|| format!("failed to execute command on pod {}", name))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_argv() {
        assert_eq!(command_argv("cat  /etc/hostname").unwrap(), vec!["cat", "/etc/hostname"]);
        assert_eq!(command_argv(" ls ").unwrap(), vec!["ls"]);
        assert!(command_argv("").is_err());
        assert!(command_argv(" \t ").is_err());
    }
}
