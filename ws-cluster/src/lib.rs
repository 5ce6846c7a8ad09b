//! Cluster control-plane abstraction.
//!
//! [`ClusterApi`] is the only capability set the orchestrator needs from a cluster:
//! namespaced CRUD, watch subscriptions, exec, and namespace management. Backends
//! implement it over raw JSON objects; the typed, workspace-scoped clients in
//! [`project`] sit on top of it.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use ws_core::error::{InfraError, Result};
use ws_model::objects::{ObjectMeta, ResourceKind};

pub mod config;
pub mod http;
pub mod project;

// When the `test-helpers` feature is enabled, include the in-memory cluster.
#[cfg(any(test, feature = "test-helpers"))]
pub mod memory;

pub use config::ClusterConfig;
pub use project::{
    CleanupPolicy, PodActionHandler, Pods, Project, ProjectFactory, ResourceClient, Routes,
    Services, VolumeClaims,
};

/// Receiving end of a watch subscription; dropping it closes the subscription.
pub type WatchStream = mpsc::UnboundedReceiver<WatchEvent>;

/// Resolves once the remote process of an exec session signals completion.
pub type ExecHandle = oneshot::Receiver<ExecCompletion>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub action: WatchAction,
    pub object: Value,
}

/// Which objects of a kind a watch subscription delivers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchFilter {
    pub name: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl WatchFilter {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            labels: BTreeMap::new(),
        }
    }

    pub fn labelled(labels: BTreeMap<String, String>) -> Self {
        Self { name: None, labels }
    }

    pub fn matches(&self, metadata: &ObjectMeta) -> bool {
        if let Some(name) = &self.name {
            if &metadata.name != name {
                return false;
            }
        }
        self.labels
            .iter()
            .all(|(k, v)| metadata.labels.get(k) == Some(v))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecCompletion {
    /// The remote side closed the session after the process ended.
    Closed,
    /// The session failed or the process reported a failure status.
    Failed(String),
}

/// Primitive capabilities of a namespaced cluster control plane.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Backend name (e.g. "http", "memory").
    fn name(&self) -> &'static str;

    async fn namespace_exists(&self, namespace: &str) -> Result<bool>;

    async fn create_namespace(&self, namespace: &str) -> Result<()>;

    async fn delete_namespace(&self, namespace: &str) -> Result<()>;

    /// Create an object; an existing name is an error, never a silent success.
    async fn create(&self, kind: ResourceKind, namespace: &str, object: Value) -> Result<Value>;

    /// List objects carrying all of the given labels.
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Value>>;

    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<Option<Value>>;

    /// Request deletion; fails with [`InfraError::NotFound`] when the object is absent.
    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<()>;

    async fn watch(
        &self,
        kind: ResourceKind,
        namespace: &str,
        filter: &WatchFilter,
    ) -> Result<WatchStream>;

    /// Start a command in a container; arguments are passed one by one.
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[String],
    ) -> Result<ExecHandle>;
}

/// Creates a cluster backend based on the configuration.
///
/// `http://` and `https://` URLs select the REST backend; `memory://` selects the
/// in-memory cluster when the `test-helpers` feature is enabled.
pub fn get_cluster(config: &ClusterConfig) -> Result<Arc<dyn ClusterApi>> {
    #[cfg(any(test, feature = "test-helpers"))]
    if config.api_url.starts_with("memory://") {
        return Ok(Arc::new(memory::InMemoryCluster::new()));
    }

    if config.api_url.starts_with("http://") || config.api_url.starts_with("https://") {
        return Ok(Arc::new(http::HttpCluster::new(config)?));
    }

    Err(InfraError::Internal(format!(
        "Unknown cluster backend: {}",
        config.api_url
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_url: &str) -> ClusterConfig {
        ClusterConfig {
            api_url: api_url.to_string(),
            ..ClusterConfig::default()
        }
    }

    #[test]
    fn test_get_cluster_memory() {
        let cluster = get_cluster(&config("memory://")).expect("Should create memory cluster");
        assert_eq!(cluster.name(), "memory");
    }

    #[test]
    fn test_get_cluster_http() {
        let cluster = get_cluster(&config("https://api.cluster.local:6443")).unwrap();
        assert_eq!(cluster.name(), "http");
    }

    #[test]
    fn test_get_cluster_unknown() {
        let err = get_cluster(&config("ftp://nowhere")).err().unwrap();
        assert!(err.to_string().contains("Unknown cluster backend"));
    }

    #[test]
    fn test_watch_filter_matching() {
        let mut meta = ObjectMeta::named("pod-a");
        meta.labels.insert("ws".into(), "1".into());

        assert!(WatchFilter::named("pod-a").matches(&meta));
        assert!(!WatchFilter::named("pod-b").matches(&meta));

        let mut labels = BTreeMap::new();
        labels.insert("ws".to_string(), "1".to_string());
        assert!(WatchFilter::labelled(labels.clone()).matches(&meta));

        labels.insert("ws".to_string(), "2".to_string());
        assert!(!WatchFilter::labelled(labels).matches(&meta));
    }
}
