use super::resources::ResourceClient;
use crate::ClusterApi;
use std::sync::Arc;
use ws_core::error::Result;
use ws_model::labels::WORKSPACE_ID_LABEL;
use ws_model::objects::{Resource, Service};

/// Services are scoped twice: by label like every other object, and by selector so
/// they can only ever route to pods of the same workspace.
#[derive(Clone)]
pub struct Services {
    client: ResourceClient<Service>,
}

impl Services {
    pub fn new(api: Arc<dyn ClusterApi>, namespace: &str, workspace_id: &str) -> Self {
        Self {
            client: ResourceClient::new(api, namespace, workspace_id),
        }
    }

    pub async fn create(&self, service: Service) -> Result<Service> {
        let mut service = service.with_type_meta();
        let workspace_id = self.client.workspace_id().to_string();
        service
            .metadata
            .labels
            .insert(WORKSPACE_ID_LABEL.to_string(), workspace_id.clone());
        service
            .spec
            .selector
            .insert(WORKSPACE_ID_LABEL.to_string(), workspace_id);
        self.client.submit(service).await
    }

    pub async fn list(&self) -> Result<Vec<Service>> {
        self.client.list().await
    }

    pub async fn get(&self, name: &str) -> Result<Option<Service>> {
        self.client.get(name).await
    }

    pub async fn delete_all(&self) -> Result<()> {
        self.client.delete_all().await
    }
}
