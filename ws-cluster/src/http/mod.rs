//! REST backend talking to a Kubernetes/OpenShift API server.

mod exec;
mod tls;
mod watch;

use crate::{ClusterApi, ClusterConfig, ExecHandle, WatchFilter, WatchStream};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;
use ws_core::error::{InfraError, Result};
use ws_model::objects::ResourceKind;

pub struct HttpCluster {
    client: Client,
    base: Url,
    token: Option<String>,
    request_timeout: Duration,
    exec_connector: Option<tokio_tungstenite::Connector>,
}

/// Error body returned by the API server.
#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<Value>,
}

impl HttpCluster {
    pub fn new(config: &ClusterConfig) -> Result<Self> {
        let base = Url::parse(&config.api_url).map_err(|e| {
            InfraError::Internal(format!("Invalid cluster API URL '{}': {}", config.api_url, e))
        })?;

        // No client-wide timeout: watch responses stay open indefinitely
        let client = Client::builder()
            .danger_accept_invalid_certs(config.insecure_skip_tls_verify)
            .user_agent(concat!("ws-runtime/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| InfraError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base,
            token: config.token.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            exec_connector: tls::exec_connector(config.insecure_skip_tls_verify)?,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| InfraError::Internal(format!("Invalid API path '{}': {}", path, e)))
    }

    fn collection_url(&self, kind: ResourceKind, namespace: &str) -> Result<Url> {
        let path = match kind {
            ResourceKind::Route => format!(
                "apis/{}/namespaces/{}/{}",
                kind.api_version(),
                namespace,
                kind.plural()
            ),
            _ => format!("api/v1/namespaces/{}/{}", namespace, kind.plural()),
        };
        self.url(&path)
    }

    fn object_url(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<Url> {
        let collection = self.collection_url(kind, namespace)?;
        self.url(&format!("{}/{}", collection.path(), name))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        self.authorized(request)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| InfraError::infra(format!("Cluster request failed: {e}")))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
        response
            .json()
            .await
            .map_err(|e| InfraError::infra(format!("Unreadable cluster response: {e}")))
    }
}

/// Turn non-success responses into errors carrying the server's message.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Status>(&body)
        .ok()
        .and_then(|s| s.message)
        .unwrap_or_else(|| format!("{} {}", status, body.trim()));

    if status == StatusCode::NOT_FOUND {
        Err(InfraError::NotFound(message))
    } else {
        Err(InfraError::Infrastructure(message))
    }
}

pub(crate) fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl ClusterApi for HttpCluster {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        let url = self.url(&format!("api/v1/namespaces/{}", namespace))?;
        match check(self.send(self.client.get(url)).await?).await {
            Ok(_) => Ok(true),
            Err(InfraError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_namespace(&self, namespace: &str) -> Result<()> {
        let url = self.url("api/v1/namespaces")?;
        let body = json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {"name": namespace},
        });
        check(self.send(self.client.post(url).json(&body)).await?).await?;
        debug!(namespace = %namespace, "Created namespace");
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        let url = self.url(&format!("api/v1/namespaces/{}", namespace))?;
        check(self.send(self.client.delete(url)).await?).await?;
        Ok(())
    }

    async fn create(&self, kind: ResourceKind, namespace: &str, object: Value) -> Result<Value> {
        let url = self.collection_url(kind, namespace)?;
        let response = check(self.send(self.client.post(url).json(&object)).await?).await?;
        Self::read_json(response).await
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Value>> {
        let mut url = self.collection_url(kind, namespace)?;
        if !labels.is_empty() {
            url.query_pairs_mut()
                .append_pair("labelSelector", &label_selector(labels));
        }
        let response = check(self.send(self.client.get(url)).await?).await?;
        let list: ObjectList = Self::read_json(response).await?;
        Ok(list.items)
    }

    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<Option<Value>> {
        let url = self.object_url(kind, namespace, name)?;
        match check(self.send(self.client.get(url)).await?).await {
            Ok(response) => Ok(Some(Self::read_json(response).await?)),
            Err(InfraError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<()> {
        let url = self.object_url(kind, namespace, name)?;
        check(self.send(self.client.delete(url)).await?).await?;
        Ok(())
    }

    async fn watch(
        &self,
        kind: ResourceKind,
        namespace: &str,
        filter: &WatchFilter,
    ) -> Result<WatchStream> {
        watch::open(self, kind, namespace, filter).await
    }

    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[String],
    ) -> Result<ExecHandle> {
        exec::open(self, namespace, pod, container, command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> HttpCluster {
        HttpCluster::new(&ClusterConfig {
            api_url: "https://api.cluster.local:6443".to_string(),
            token: Some("secret".to_string()),
            insecure_skip_tls_verify: false,
            request_timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_collection_paths() {
        let cluster = cluster();
        assert_eq!(
            cluster.collection_url(ResourceKind::Pod, "ws-1").unwrap().as_str(),
            "https://api.cluster.local:6443/api/v1/namespaces/ws-1/pods"
        );
        assert_eq!(
            cluster.collection_url(ResourceKind::Route, "ws-1").unwrap().as_str(),
            "https://api.cluster.local:6443/apis/route.openshift.io/v1/namespaces/ws-1/routes"
        );
        assert_eq!(
            cluster
                .object_url(ResourceKind::PersistentVolumeClaim, "ws-1", "data")
                .unwrap()
                .path(),
            "/api/v1/namespaces/ws-1/persistentvolumeclaims/data"
        );
    }

    #[test]
    fn test_label_selector() {
        let mut labels = BTreeMap::new();
        labels.insert("b".to_string(), "2".to_string());
        labels.insert("a".to_string(), "1".to_string());
        assert_eq!(label_selector(&labels), "a=1,b=2");
    }

    #[test]
    fn test_exec_connector_follows_tls_setting() {
        assert!(cluster().exec_connector.is_none());

        let insecure = HttpCluster::new(&ClusterConfig {
            api_url: "https://api.cluster.local:6443".to_string(),
            insecure_skip_tls_verify: true,
            ..ClusterConfig::default()
        })
        .unwrap();
        assert!(insecure.exec_connector.is_some());
    }

    #[test]
    fn test_invalid_url_rejected() {
        let result = HttpCluster::new(&ClusterConfig {
            api_url: "not a url".to_string(),
            ..ClusterConfig::default()
        });
        assert!(result.is_err());
    }
}
