use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{AttachParams, DeleteParams, DynamicObject, ListParams, Patch, PatchParams};
use kube::config::KubeConfigOptions;
use kube::{Api, Client, Config};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use super::{NamespaceScope, PatchStrategy, ResourceKind};

/// Page size for paginated list requests
const PAGE_SIZE: u32 = 500;

/// Field manager recorded on patched objects
const FIELD_MANAGER: &str = "kubectl-find";

/// Remote operations needed by the resource handlers
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// List every object of `kind` in `scope`, following continue tokens.
    /// Each item carries `apiVersion` and `kind`.
    async fn list(
        &self,
        kind: &ResourceKind,
        scope: &NamespaceScope,
        label_selector: Option<&str>,
    ) -> Result<Vec<Value>>;

    /// Delete one object with background propagation
    async fn delete(&self, kind: &ResourceKind, namespace: Option<&str>, name: &str) -> Result<()>;

    async fn patch(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
        document: &Value,
        strategy: PatchStrategy,
    ) -> Result<()>;

    /// Labels of a node
    async fn node_labels(&self, node: &str) -> Result<BTreeMap<String, String>>;

    /// Run `argv` in a pod without stdin or TTY, forwarding its output streams
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        argv: &[String],
        out: &mut (dyn Write + Send),
        err: &mut (dyn Write + Send),
    ) -> Result<()>;
}

/// `ResourceClient` backed by a live API server
#[derive(Clone)]
pub struct KubeResourceClient {
    client: Client,
}

impl KubeResourceClient {
    /// Connect using the kubeconfig, optionally overriding the context
    pub async fn connect(context: Option<&str>) -> Result<Self> {
        let client = match context {
            Some(ctx) => {
                let config = Config::from_kubeconfig(&KubeConfigOptions {
                    context: Some(ctx.to_string()),
                    ..Default::default()
                })
                .await
                .with_context(|| format!("Failed to load kubeconfig for context '{}'", ctx))?;
                Client::try_from(config)
                    .with_context(|| format!("Failed to create client for context '{}'", ctx))?
            }
            None => Client::try_default()
                .await
                .context("Failed to create client from the current kubeconfig context")?,
        };
        debug!(namespace = %client.default_namespace(), "Connected");
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api_for(&self, kind: &ResourceKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = &kind.api_resource;
        match namespace {
            Some(ns) if kind.namespaced => Api::namespaced_with(self.client.clone(), ns, ar),
            None if kind.namespaced => Api::default_namespaced_with(self.client.clone(), ar),
            _ => Api::all_with(self.client.clone(), ar),
        }
    }

    /// List with pagination, using continue tokens to fetch all pages
    async fn list_all(
        &self,
        api: &Api<DynamicObject>,
        base_params: &ListParams,
        plural: &str,
    ) -> Result<Vec<DynamicObject>> {
        let mut all_items: Vec<DynamicObject> = Vec::new();
        let mut continue_token: Option<String> = None;
        let mut page_count = 0u32;

        loop {
            let mut params = base_params.clone().limit(PAGE_SIZE);
            if let Some(ref token) = continue_token {
                params = params.continue_token(token);
            }

            let list = api
                .list(&params)
                .await
                .with_context(|| format!("Failed to list {}", plural))?;

            let items_count = list.items.len();
            all_items.extend(list.items);
            page_count += 1;

            match list.metadata.continue_ {
                Some(token) if !token.is_empty() => {
                    debug!(
                        resource = %plural,
                        page = page_count,
                        items_this_page = items_count,
                        total_so_far = all_items.len(),
                        "Fetched page, continuing"
                    );
                    continue_token = Some(token);
                }
                _ => break,
            }
        }

        if page_count > 1 {
            debug!(
                resource = %plural,
                pages = page_count,
                total_items = all_items.len(),
                "Pagination complete"
            );
        }

        Ok(all_items)
    }
}

/// Build ListParams from the label selector
fn build_list_params(label_selector: Option<&str>) -> ListParams {
    let mut params = ListParams::default();
    if let Some(selector) = label_selector.filter(|s| !s.is_empty()) {
        params = params.labels(selector);
    }
    trace!(label_selector = ?label_selector, "Built ListParams");
    params
}

/// Serialize a listed object, injecting apiVersion and kind which list
/// responses omit per item
fn to_document(item: DynamicObject, kind: &ResourceKind) -> Result<Value> {
    let mut value = serde_json::to_value(item).context("Failed to serialize object")?;
    if let Value::Object(ref mut map) = value {
        map.insert(
            "apiVersion".to_string(),
            Value::String(kind.api_resource.api_version.clone()),
        );
        map.insert(
            "kind".to_string(),
            Value::String(kind.api_resource.kind.clone()),
        );
    }
    Ok(value)
}

fn patch_params() -> PatchParams {
    PatchParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

fn to_kube_patch(document: &Value, strategy: PatchStrategy) -> Result<Patch<Value>> {
    Ok(match strategy {
        PatchStrategy::Strategic => Patch::Strategic(document.clone()),
        PatchStrategy::Merge => Patch::Merge(document.clone()),
        PatchStrategy::Json => {
            let ops: json_patch::Patch = serde_json::from_value(document.clone())
                .context("JSON patch must be an array of operations")?;
            Patch::Json(ops)
        }
    })
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn list(
        &self,
        kind: &ResourceKind,
        scope: &NamespaceScope,
        label_selector: Option<&str>,
    ) -> Result<Vec<Value>> {
        let ar = &kind.api_resource;
        let (api, scope_name): (Api<DynamicObject>, &str) = if !kind.namespaced {
            (Api::all_with(self.client.clone(), ar), "cluster-scoped")
        } else {
            match scope {
                NamespaceScope::All => (Api::all_with(self.client.clone(), ar), "all-namespaces"),
                NamespaceScope::Named(ns) => (
                    Api::namespaced_with(self.client.clone(), ns, ar),
                    "namespaced",
                ),
                NamespaceScope::Default => (
                    Api::default_namespaced_with(self.client.clone(), ar),
                    "default-namespace",
                ),
            }
        };

        debug!(
            resource = %ar.plural,
            group = %ar.group,
            version = %ar.version,
            scope = %scope_name,
            label_selector = ?label_selector,
            "Listing resources"
        );

        let params = build_list_params(label_selector);
        self.list_all(&api, &params, &ar.plural)
            .await?
            .into_iter()
            .map(|item| to_document(item, kind))
            .collect()
    }

    async fn delete(&self, kind: &ResourceKind, namespace: Option<&str>, name: &str) -> Result<()> {
        let api = self.api_for(kind, namespace);
        api.delete(name, &DeleteParams::background()).await?;
        debug!(resource = %kind.plural(), name = %name, namespace = ?namespace, "Deleted");
        Ok(())
    }

    async fn patch(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
        document: &Value,
        strategy: PatchStrategy,
    ) -> Result<()> {
        let patch = to_kube_patch(document, strategy)?;
        let api = self.api_for(kind, namespace);
        api.patch(name, &patch_params(), &patch).await?;
        debug!(
            resource = %kind.plural(),
            name = %name,
            namespace = ?namespace,
            ?strategy,
            "Patched"
        );
        Ok(())
    }

    async fn node_labels(&self, node: &str) -> Result<BTreeMap<String, String>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let node = api
            .get(node)
            .await
            .with_context(|| format!("Failed to get node '{}'", node))?;
        Ok(node.metadata.labels.unwrap_or_default())
    }

    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        argv: &[String],
        out: &mut (dyn Write + Send),
        err: &mut (dyn Write + Send),
    ) -> Result<()> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = AttachParams::default()
            .stdin(false)
            .stdout(true)
            .stderr(true)
            .tty(false);

        debug!(pod = %pod, namespace = %namespace, command = ?argv, "Executing");
        let mut attached = api.exec(pod, argv.to_vec(), &params).await?;

        let mut stdout = attached.stdout();
        let mut stderr = attached.stderr();
        let status = attached.take_status();

        let mut out_buf = vec![0u8; 8192];
        let mut err_buf = vec![0u8; 8192];
        let mut out_open = stdout.is_some();
        let mut err_open = stderr.is_some();

        while out_open || err_open {
            tokio::select! {
                n = read_chunk(&mut stdout, &mut out_buf), if out_open => {
                    let n = n.context("Failed to read remote stdout")?;
                    if n == 0 {
                        out_open = false;
                    } else {
                        out.write_all(&out_buf[..n])?;
                        out.flush()?;
                    }
                }
                n = read_chunk(&mut stderr, &mut err_buf), if err_open => {
                    let n = n.context("Failed to read remote stderr")?;
                    if n == 0 {
                        err_open = false;
                    } else {
                        err.write_all(&err_buf[..n])?;
                        err.flush()?;
                    }
                }
            }
        }

        let status = match status {
            Some(status) => status.await,
            None => None,
        };
        attached
            .join()
            .await
            .map_err(|e| anyhow!("exec stream failed: {}", e))?;

        if let Some(status) = status {
            debug!(?status, "Exec finished");
            if status.status.as_deref() == Some("Failure") {
                bail!(
                    "{}",
                    status
                        .message
                        .unwrap_or_else(|| "command failed".to_string())
                );
            }
        }
        Ok(())
    }
}

async fn read_chunk<R: AsyncRead + Unpin>(
    reader: &mut Option<R>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match reader {
        Some(r) => r.read(buf).await,
        None => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubernetes::testing;
    use serde_json::json;

    #[test]
    fn test_build_list_params() {
        let params = build_list_params(Some("app=web,tier!=db"));
        assert_eq!(params.label_selector.as_deref(), Some("app=web,tier!=db"));

        let params = build_list_params(None);
        assert!(params.label_selector.is_none());

        let params = build_list_params(Some(""));
        assert!(params.label_selector.is_none());
    }

    #[test]
    fn test_to_document_injects_type_meta() {
        let obj: DynamicObject = serde_json::from_value(json!({
            "metadata": {"name": "web-0", "namespace": "default"},
            "spec": {"nodeName": "node-a"}
        }))
        .unwrap();
        let doc = to_document(obj, &testing::pods()).unwrap();
        assert_eq!(doc["apiVersion"], "v1");
        assert_eq!(doc["kind"], "Pod");
        assert_eq!(doc["metadata"]["name"], "web-0");
        assert_eq!(doc["spec"]["nodeName"], "node-a");
    }

    #[test]
    fn test_patch_strategies() {
        let doc = json!({"metadata": {"labels": {"env": "prod"}}});
        assert!(matches!(
            to_kube_patch(&doc, PatchStrategy::Strategic).unwrap(),
            Patch::Strategic(_)
        ));
        assert!(matches!(
            to_kube_patch(&doc, PatchStrategy::Merge).unwrap(),
            Patch::Merge(_)
        ));
        assert!(to_kube_patch(&doc, PatchStrategy::Json).is_err());

        let ops = json!([{"op": "replace", "path": "/spec/replicas", "value": 2}]);
        assert!(matches!(
            to_kube_patch(&ops, PatchStrategy::Json).unwrap(),
            Patch::Json(_)
        ));
    }
}
