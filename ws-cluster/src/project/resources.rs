use crate::ClusterApi;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;
use ws_core::error::{InfraError, Result};
use ws_model::labels::WORKSPACE_ID_LABEL;
use ws_model::objects::{PersistentVolumeClaim, Resource, Route};

pub type Routes = ResourceClient<Route>;
pub type VolumeClaims = ResourceClient<PersistentVolumeClaim>;

/// Namespaced client for one object kind.
///
/// Everything created through it carries the workspace-id label, and listing or bulk
/// deletion only ever sees objects with that label.
pub struct ResourceClient<R: Resource> {
    api: Arc<dyn ClusterApi>,
    namespace: String,
    workspace_id: String,
    _kind: PhantomData<fn() -> R>,
}

impl<R: Resource> Clone for ResourceClient<R> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            namespace: self.namespace.clone(),
            workspace_id: self.workspace_id.clone(),
            _kind: PhantomData,
        }
    }
}

impl<R: Resource> ResourceClient<R> {
    pub fn new(api: Arc<dyn ClusterApi>, namespace: &str, workspace_id: &str) -> Self {
        Self {
            api,
            namespace: namespace.to_string(),
            workspace_id: workspace_id.to_string(),
            _kind: PhantomData,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub(crate) fn api(&self) -> &Arc<dyn ClusterApi> {
        &self.api
    }

    pub(crate) fn workspace_labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert(WORKSPACE_ID_LABEL.to_string(), self.workspace_id.clone());
        labels
    }

    /// Label the object with the workspace id and submit it.
    pub async fn create(&self, resource: R) -> Result<R> {
        let mut resource = resource.with_type_meta();
        resource
            .metadata_mut()
            .labels
            .insert(WORKSPACE_ID_LABEL.to_string(), self.workspace_id.clone());
        self.submit(resource).await
    }

    pub(crate) async fn submit(&self, resource: R) -> Result<R> {
        let object = serde_json::to_value(&resource)?;
        let created = self.api.create(R::KIND, &self.namespace, object).await?;
        debug!(kind = %R::KIND, name = %resource.name(), namespace = %self.namespace, "Created");
        Ok(serde_json::from_value(created)?)
    }

    pub async fn list(&self) -> Result<Vec<R>> {
        self.api
            .list(R::KIND, &self.namespace, &self.workspace_labels())
            .await?
            .into_iter()
            .map(|object| serde_json::from_value(object).map_err(InfraError::from))
            .collect()
    }

    pub async fn get(&self, name: &str) -> Result<Option<R>> {
        match self.api.get(R::KIND, &self.namespace, name).await? {
            Some(object) => Ok(Some(serde_json::from_value(object)?)),
            None => Ok(None),
        }
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.api.delete(R::KIND, &self.namespace, name).await
    }

    /// Delete every object of this kind belonging to the workspace.
    ///
    /// Objects that disappear concurrently are not an error.
    pub async fn delete_all(&self) -> Result<()> {
        for resource in self.list().await? {
            match self.delete(resource.name()).await {
                Ok(()) | Err(InfraError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
