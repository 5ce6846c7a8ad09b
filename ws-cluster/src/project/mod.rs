//! Workspace-scoped view of one namespace.
//!
//! A [`Project`] bundles the per-kind clients for one workspace so resources can be
//! created through one place and removed as a unit.

mod pods;
mod resources;
mod services;

pub use pods::{PodActionHandler, Pods};
pub use resources::{ResourceClient, Routes, VolumeClaims};
pub use services::Services;

use crate::ClusterApi;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use ws_core::error::{InfraError, Result};

/// What cleanup deletes and how long it waits for pods to go away.
#[derive(Debug, Clone)]
pub struct CleanupPolicy {
    pub deletion_timeout: Duration,
    pub preserve_volume_claims: bool,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            deletion_timeout: Duration::from_secs(2 * 60),
            preserve_volume_claims: false,
        }
    }
}

#[derive(Clone)]
pub struct Project {
    name: String,
    workspace_id: String,
    api: Arc<dyn ClusterApi>,
    pods: Pods,
    services: Services,
    routes: Routes,
    volume_claims: VolumeClaims,
    policy: CleanupPolicy,
}

impl Project {
    pub fn new(
        api: Arc<dyn ClusterApi>,
        name: &str,
        workspace_id: &str,
        policy: CleanupPolicy,
    ) -> Self {
        Self {
            name: name.to_string(),
            workspace_id: workspace_id.to_string(),
            pods: Pods::new(api.clone(), name, workspace_id),
            services: Services::new(api.clone(), name, workspace_id),
            routes: Routes::new(api.clone(), name, workspace_id),
            volume_claims: VolumeClaims::new(api.clone(), name, workspace_id),
            api,
            policy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn pods(&self) -> &Pods {
        &self.pods
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    pub fn volume_claims(&self) -> &VolumeClaims {
        &self.volume_claims
    }

    /// Delete every workspace object in the namespace.
    ///
    /// The pod watch is closed first. All deletions are attempted even when one fails;
    /// the first failure is returned.
    #[instrument(skip(self), fields(project = %self.name, workspace = %self.workspace_id))]
    pub async fn cleanup(&self) -> Result<()> {
        self.pods.stop_watch().await;

        let mut results = vec![
            ("pods", self.pods.delete_all(self.policy.deletion_timeout).await),
            ("services", self.services.delete_all().await),
            ("routes", self.routes.delete_all().await),
        ];
        if !self.policy.preserve_volume_claims {
            results.push(("volume claims", self.volume_claims.delete_all().await));
        }

        let mut first_error = None;
        for (what, result) in results {
            if let Err(e) = result {
                warn!(error = %e, "Failed to delete {}", what);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("Project cleaned up");
                Ok(())
            }
        }
    }

    /// Delete the namespace itself.
    pub async fn remove(&self) -> Result<()> {
        self.pods.stop_watch().await;
        match self.api.delete_namespace(&self.name).await {
            Ok(()) => {
                info!(project = %self.name, "Project removed");
                Ok(())
            }
            Err(InfraError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Resolves the namespace a workspace runs in, creating it on demand.
#[derive(Clone)]
pub struct ProjectFactory {
    api: Arc<dyn ClusterApi>,
    policy: CleanupPolicy,
}

impl ProjectFactory {
    pub fn new(api: Arc<dyn ClusterApi>, policy: CleanupPolicy) -> Self {
        Self { api, policy }
    }

    /// Project named after the workspace.
    pub async fn create(&self, workspace_id: &str) -> Result<Project> {
        self.create_named(workspace_id, workspace_id).await
    }

    pub async fn create_named(&self, name: &str, workspace_id: &str) -> Result<Project> {
        if !self.api.namespace_exists(name).await? {
            self.api.create_namespace(name).await?;
            info!(project = %name, "Created project");
        }
        Ok(self.open(name, workspace_id))
    }

    /// Project handle without touching the cluster.
    pub fn open(&self, name: &str, workspace_id: &str) -> Project {
        Project::new(self.api.clone(), name, workspace_id, self.policy.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCluster;
    use ws_model::objects::{
        Container, ObjectMeta, PersistentVolumeClaim, Pod, ResourceKind, Route, Service,
    };

    async fn project(policy: CleanupPolicy) -> (Arc<InMemoryCluster>, Project) {
        let cluster = Arc::new(InMemoryCluster::new());
        let factory = ProjectFactory::new(cluster.clone(), policy);
        let project = factory.create("ws-1").await.unwrap();
        (cluster, project)
    }

    async fn populate(project: &Project) {
        project
            .pods()
            .create(Pod::new("pod", vec![Container::new("main")]))
            .await
            .unwrap();
        project
            .services()
            .create(Service {
                metadata: ObjectMeta::named("svc"),
                ..Default::default()
            })
            .await
            .unwrap();
        project
            .routes()
            .create(Route {
                metadata: ObjectMeta::named("route"),
                ..Default::default()
            })
            .await
            .unwrap();
        project
            .volume_claims()
            .create(PersistentVolumeClaim {
                metadata: ObjectMeta::named("data"),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_factory_creates_namespace_once() {
        let cluster = Arc::new(InMemoryCluster::new());
        let factory = ProjectFactory::new(cluster.clone(), CleanupPolicy::default());

        factory.create("ws-1").await.unwrap();
        let project = factory.create_named("ws-1", "ws-1").await.unwrap();

        assert!(cluster.has_namespace("ws-1"));
        assert_eq!(project.name(), "ws-1");
    }

    #[tokio::test]
    async fn test_cleanup_removes_everything() {
        let (cluster, project) = project(CleanupPolicy::default()).await;
        populate(&project).await;

        project.cleanup().await.unwrap();
        assert_eq!(cluster.object_count("ws-1"), 0);
    }

    #[tokio::test]
    async fn test_cleanup_can_preserve_volume_claims() {
        let policy = CleanupPolicy {
            preserve_volume_claims: true,
            ..CleanupPolicy::default()
        };
        let (cluster, project) = project(policy).await;
        populate(&project).await;

        project.cleanup().await.unwrap();
        assert_eq!(
            cluster.object_names(ResourceKind::PersistentVolumeClaim, "ws-1"),
            vec!["data".to_string()]
        );
        assert_eq!(cluster.object_count("ws-1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_reports_failure_but_deletes_the_rest() {
        let policy = CleanupPolicy {
            deletion_timeout: Duration::from_secs(1),
            ..CleanupPolicy::default()
        };
        let (cluster, project) = project(policy).await;
        populate(&project).await;
        cluster.hold_pod_deletions(true);

        let err = project.cleanup().await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(cluster.object_names(ResourceKind::Pod, "ws-1").len(), 1);
        assert_eq!(cluster.object_count("ws-1"), 1);
    }

    #[tokio::test]
    async fn test_remove_deletes_namespace() {
        let (cluster, project) = project(CleanupPolicy::default()).await;
        populate(&project).await;

        project.remove().await.unwrap();
        assert!(!cluster.has_namespace("ws-1"));
        project.remove().await.unwrap();
    }
}
