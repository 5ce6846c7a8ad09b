use std::collections::BTreeMap;
use std::time::Duration;
use ws_cluster::Pods;
use ws_core::error::{InfraError, Result};
use ws_model::labels::ORIGINAL_NAME_LABEL;
use ws_model::objects::{Container, Pod, Resource};
use ws_model::runtime::{Machine, MachineStatus, Server, ServerStatus};

/// `<pod>/<container>`, where the pod part is the name the environment declared.
pub fn machine_name(pod: &Pod, container: &Container) -> String {
    let pod_name = pod
        .metadata
        .labels
        .get(ORIGINAL_NAME_LABEL)
        .map(String::as_str)
        .unwrap_or_else(|| pod.name());
    format!("{}/{}", pod_name, container.name)
}

/// One container of a started pod, as tracked by the runtime.
#[derive(Clone)]
pub struct ClusterMachine {
    name: String,
    pod_name: String,
    container_name: String,
    status: MachineStatus,
    servers: BTreeMap<String, Server>,
    pods: Pods,
}

impl ClusterMachine {
    pub fn new(
        name: String,
        pod_name: &str,
        container_name: &str,
        servers: BTreeMap<String, Server>,
        pods: Pods,
    ) -> Self {
        Self {
            name,
            pod_name: pod_name.to_string(),
            container_name: container_name.to_string(),
            status: MachineStatus::Starting,
            servers,
            pods,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pod_name(&self) -> &str {
        &self.pod_name
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn status(&self) -> MachineStatus {
        self.status
    }

    pub fn servers(&self) -> &BTreeMap<String, Server> {
        &self.servers
    }

    pub fn set_status(&mut self, status: MachineStatus) {
        self.status = status;
    }

    /// Mark a server running, returning its URL when it is known.
    pub fn set_server_running(&mut self, server: &str) -> Option<String> {
        let server = self.servers.get_mut(server)?;
        server.status = ServerStatus::Running;
        Some(server.url.clone())
    }

    pub fn snapshot(&self) -> Machine {
        Machine {
            name: self.name.clone(),
            pod_name: self.pod_name.clone(),
            container_name: self.container_name.clone(),
            status: self.status,
            servers: self.servers.clone(),
        }
    }

    /// Wait for the pod to run; a pod that fails instead is an error right away.
    pub async fn wait_running(&self, timeout: Duration) -> Result<()> {
        let pod = self
            .pods
            .wait(&self.pod_name, timeout, |p| p.is_running() || p.is_failed())
            .await?;
        if pod.is_failed() {
            return Err(InfraError::infra(format!(
                "Pod '{}' of machine '{}' failed to start",
                self.pod_name, self.name
            )));
        }
        Ok(())
    }

    pub async fn exec(&self, command: &[String], timeout: Duration) -> Result<()> {
        self.pods
            .exec(&self.pod_name, &self.container_name, timeout, command)
            .await
    }
}
