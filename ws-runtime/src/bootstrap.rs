use crate::machine::ClusterMachine;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;
use ws_core::error::{InfraError, Result};
use ws_model::environment::InstallerConfig;
use ws_model::runtime::RuntimeIdentity;

/// Prepares a running machine by applying its installers.
#[async_trait]
pub trait Bootstrapper: Send + Sync {
    async fn bootstrap(
        &self,
        identity: &RuntimeIdentity,
        installers: &[InstallerConfig],
        machine: &ClusterMachine,
    ) -> Result<()>;
}

/// Variable naming the websocket endpoint that installers stream their output to.
pub const OUTPUT_CHANNEL_ENV: &str = "WS_OUTPUT_CHANNEL";

/// Runs each installer script with `sh -c` inside the machine's container.
pub struct ExecBootstrapper {
    timeout: Duration,
    output_channel: Option<Url>,
}

impl ExecBootstrapper {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            output_channel: None,
        }
    }

    /// Export the output channel endpoint to every installer script.
    pub fn with_output_channel(mut self, output_channel: Option<Url>) -> Self {
        self.output_channel = output_channel;
        self
    }

    fn command(&self, script: &str) -> Vec<String> {
        let mut command = Vec::with_capacity(5);
        if let Some(channel) = &self.output_channel {
            command.push("env".to_string());
            command.push(format!("{}={}", OUTPUT_CHANNEL_ENV, channel));
        }
        command.extend(["sh".to_string(), "-c".to_string(), script.to_string()]);
        command
    }
}

#[async_trait]
impl Bootstrapper for ExecBootstrapper {
    async fn bootstrap(
        &self,
        identity: &RuntimeIdentity,
        installers: &[InstallerConfig],
        machine: &ClusterMachine,
    ) -> Result<()> {
        for installer in installers {
            let Some(script) = installer.script.as_deref() else {
                debug!(installer = %installer.id, "Installer has no script");
                continue;
            };

            info!(
                workspace = %identity.workspace_id,
                machine = %machine.name(),
                installer = %installer.id,
                "Running installer"
            );
            let command = self.command(script);
            machine
                .exec(&command, self.timeout)
                .await
                .map_err(|e| match e {
                    InfraError::Infrastructure(message) => InfraError::Infrastructure(format!(
                        "Installer '{}' failed in machine '{}': {}",
                        installer.id,
                        machine.name(),
                        message
                    )),
                    other => other,
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use ws_cluster::memory::{ExecBehavior, InMemoryCluster};
    use ws_cluster::{ClusterApi, Pods};
    use ws_model::objects::{Container, Pod};

    fn installer(id: &str, script: Option<&str>) -> InstallerConfig {
        InstallerConfig {
            id: id.to_string(),
            version: None,
            script: script.map(str::to_string),
            properties: BTreeMap::new(),
        }
    }

    async fn machine() -> (Arc<InMemoryCluster>, ClusterMachine) {
        let cluster = Arc::new(InMemoryCluster::new());
        cluster.create_namespace("ns").await.unwrap();
        let pods = Pods::new(cluster.clone(), "ns", "ws");
        pods.create(Pod::new("main", vec![Container::new("dev")]))
            .await
            .unwrap();
        let machine = ClusterMachine::new("main/dev".to_string(), "main", "dev", BTreeMap::new(), pods);
        (cluster, machine)
    }

    #[tokio::test]
    async fn test_runs_scripts_in_order() {
        let (cluster, machine) = machine().await;
        let identity = RuntimeIdentity::new("ws", "owner", "default");
        let installers = vec![
            installer("org.example.ws-agent", Some("start-agent")),
            installer("org.example.docs", None),
            installer("org.example.terminal", Some("start-terminal --port 4411")),
        ];

        ExecBootstrapper::new(Duration::from_secs(5))
            .bootstrap(&identity, &installers, &machine)
            .await
            .unwrap();

        let log = cluster.exec_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].command, vec!["sh", "-c", "start-agent"]);
        assert_eq!(log[1].command[2], "start-terminal --port 4411");
        assert_eq!(log[1].container, "dev");
    }

    #[tokio::test]
    async fn test_output_channel_is_exported() {
        let (cluster, machine) = machine().await;
        let identity = RuntimeIdentity::new("ws", "owner", "default");
        let channel = Url::parse("ws://localhost:8071/output").unwrap();

        ExecBootstrapper::new(Duration::from_secs(5))
            .with_output_channel(Some(channel))
            .bootstrap(&identity, &[installer("agent", Some("start-agent"))], &machine)
            .await
            .unwrap();

        assert_eq!(
            cluster.exec_log()[0].command,
            vec![
                "env",
                "WS_OUTPUT_CHANNEL=ws://localhost:8071/output",
                "sh",
                "-c",
                "start-agent"
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_names_installer() {
        let (cluster, machine) = machine().await;
        cluster.set_exec_behavior(ExecBehavior::Fail("exit code 127".to_string()));
        let identity = RuntimeIdentity::new("ws", "owner", "default");

        let err = ExecBootstrapper::new(Duration::from_secs(5))
            .bootstrap(&identity, &[installer("agent", Some("boom"))], &machine)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Installer 'agent' failed in machine 'main/dev'"));
        assert!(err.to_string().contains("exit code 127"));
    }
}
