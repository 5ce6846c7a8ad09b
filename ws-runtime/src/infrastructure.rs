use crate::bootstrap::{Bootstrapper, ExecBootstrapper};
use crate::config::RuntimeConfig;
use crate::context::RuntimeContext;
use crate::events::EventSink;
use crate::readiness::{HttpServersChecker, ReadinessChecker};
use crate::runtime::{Collaborators, InternalRuntime};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use ws_cluster::{ClusterApi, ProjectFactory};
use ws_core::error::Result;
use ws_model::environment::Environment;
use ws_model::runtime::RuntimeIdentity;

/// A cluster platform able to run environments.
#[async_trait]
pub trait RuntimeInfrastructure: Send + Sync {
    fn name(&self) -> &str;

    async fn create_runtime(
        &self,
        identity: RuntimeIdentity,
        environment: Environment,
    ) -> Result<Box<dyn InternalRuntime>>;
}

pub struct OpenShiftInfrastructure {
    api: Arc<dyn ClusterApi>,
    config: RuntimeConfig,
    projects: ProjectFactory,
    collaborators: Collaborators,
}

impl OpenShiftInfrastructure {
    /// Infrastructure with the exec bootstrapper and the HTTP readiness checker.
    pub fn new(
        api: Arc<dyn ClusterApi>,
        config: RuntimeConfig,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let checker = HttpServersChecker::new(
            config.server_check_timeout(),
            config.server_check_interval(),
            config.server_check_insecure,
        )?;
        let bootstrapper = ExecBootstrapper::new(config.bootstrap_timeout())
            .with_output_channel(config.output_channel_url()?);
        let collaborators = Collaborators {
            bootstrapper: Arc::new(bootstrapper),
            checker: Arc::new(checker),
            events,
        };
        Ok(Self {
            projects: ProjectFactory::new(api.clone(), config.cleanup_policy()),
            api,
            config,
            collaborators,
        })
    }

    pub fn with_bootstrapper(mut self, bootstrapper: Arc<dyn Bootstrapper>) -> Self {
        self.collaborators.bootstrapper = bootstrapper;
        self
    }

    pub fn with_readiness_checker(mut self, checker: Arc<dyn ReadinessChecker>) -> Self {
        self.collaborators.checker = checker;
        self
    }

    pub fn context(&self, identity: RuntimeIdentity, environment: Environment) -> RuntimeContext {
        RuntimeContext::new(
            identity,
            environment,
            self.config.clone(),
            self.projects.clone(),
            self.collaborators.clone(),
        )
    }

    /// Remove leftovers of a workspace; with `remove_project` the namespace goes too.
    pub async fn clean(&self, workspace_id: &str, remove_project: bool) -> Result<()> {
        let name = self
            .config
            .project_name
            .as_deref()
            .unwrap_or(workspace_id);
        if !self.api.namespace_exists(name).await? {
            info!(project = %name, "Project does not exist, nothing to clean");
            return Ok(());
        }

        let project = self.projects.open(name, workspace_id);
        project.cleanup().await?;
        if remove_project {
            project.remove().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RuntimeInfrastructure for OpenShiftInfrastructure {
    fn name(&self) -> &str {
        "openshift"
    }

    async fn create_runtime(
        &self,
        identity: RuntimeIdentity,
        environment: Environment,
    ) -> Result<Box<dyn InternalRuntime>> {
        let runtime = self.context(identity, environment).runtime().await?;
        Ok(Box::new(runtime))
    }
}
