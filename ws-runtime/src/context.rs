use crate::config::RuntimeConfig;
use crate::provision::provision;
use crate::runtime::{Collaborators, OpenShiftRuntime};
use tracing::info;
use url::Url;
use ws_cluster::ProjectFactory;
use ws_core::error::Result;
use ws_model::environment::Environment;
use ws_model::runtime::RuntimeIdentity;

/// Everything needed to build the runtime of one environment.
pub struct RuntimeContext {
    identity: RuntimeIdentity,
    environment: Environment,
    config: RuntimeConfig,
    projects: ProjectFactory,
    collaborators: Collaborators,
}

impl RuntimeContext {
    pub fn new(
        identity: RuntimeIdentity,
        environment: Environment,
        config: RuntimeConfig,
        projects: ProjectFactory,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            identity,
            environment,
            config,
            projects,
            collaborators,
        }
    }

    pub fn identity(&self) -> &RuntimeIdentity {
        &self.identity
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Namespace the runtime lives in.
    pub fn project_name(&self) -> &str {
        self.config
            .project_name
            .as_deref()
            .unwrap_or(&self.identity.workspace_id)
    }

    /// Websocket endpoint for runtime output, when configured.
    pub fn output_channel(&self) -> Result<Option<Url>> {
        self.config.output_channel_url()
    }

    /// Provision the environment and bind it to its project, creating the
    /// namespace when it does not exist yet.
    pub async fn runtime(&self) -> Result<OpenShiftRuntime> {
        let mut environment = self.environment.clone();
        provision(&mut environment)?;

        let project = self
            .projects
            .create_named(self.project_name(), &self.identity.workspace_id)
            .await?;
        info!(workspace = %self.identity.workspace_id, project = %project.name(), "Runtime context resolved");

        Ok(OpenShiftRuntime::new(
            self.identity.clone(),
            environment,
            project,
            self.config.clone(),
            self.collaborators.clone(),
        ))
    }
}
