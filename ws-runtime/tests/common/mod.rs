//! Shared fixtures for runtime integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use ws_cluster::memory::InMemoryCluster;
use ws_core::error::{InfraError, Result};
use ws_model::environment::Environment;
use ws_model::events::RuntimeEvent;
use ws_model::runtime::RuntimeIdentity;
use ws_runtime::{
    ChannelEventSink, ClusterMachine, InternalRuntime, OpenShiftInfrastructure, ReadinessChecker,
    RuntimeConfig, RuntimeInfrastructure,
};

pub const WORKSPACE: &str = "ws-1";

pub const EXAMPLE_ENVIRONMENT: &str = r#"
pods:
  main:
    spec:
      containers:
        - name: main
          image: eclipse/ubuntu_jdk8
machines:
  main/main:
    installers:
      - id: org.eclipse.che.ws-agent
        script: start-agent
    servers:
      http-server:
        port: 8080/tcp
        protocol: http
        path: /api
persistentVolumeClaims:
  data:
    spec:
      accessModes: [ReadWriteOnce]
"#;

/// How the scripted readiness check behaves.
#[derive(Debug, Clone)]
pub enum CheckOutcome {
    Ready,
    Fail(String),
    Hang,
}

/// Readiness checker with a fixed outcome, optionally overridden per machine.
pub struct ScriptedChecker {
    outcome: CheckOutcome,
    per_machine: BTreeMap<String, CheckOutcome>,
}

#[async_trait]
impl ReadinessChecker for ScriptedChecker {
    async fn check(
        &self,
        _identity: &RuntimeIdentity,
        machine: &ClusterMachine,
        ready: mpsc::UnboundedSender<String>,
    ) -> Result<()> {
        let outcome = self
            .per_machine
            .get(machine.name())
            .unwrap_or(&self.outcome);
        match outcome {
            CheckOutcome::Ready => {
                for name in machine.servers().keys() {
                    let _ = ready.send(name.clone());
                }
                Ok(())
            }
            CheckOutcome::Fail(message) => Err(InfraError::Timeout(message.clone())),
            CheckOutcome::Hang => std::future::pending().await,
        }
    }
}

pub struct Fixture {
    pub cluster: Arc<InMemoryCluster>,
    pub infra: OpenShiftInfrastructure,
    pub events: mpsc::UnboundedReceiver<RuntimeEvent>,
}

impl Fixture {
    pub fn new(outcome: CheckOutcome) -> Self {
        Self::with_config(outcome, test_config())
    }

    pub fn with_config(outcome: CheckOutcome, config: RuntimeConfig) -> Self {
        Self::build(outcome, BTreeMap::new(), config)
    }

    pub fn with_outcomes(outcome: CheckOutcome, per_machine: &[(&str, CheckOutcome)]) -> Self {
        let per_machine = per_machine
            .iter()
            .map(|(name, outcome)| (name.to_string(), outcome.clone()))
            .collect();
        Self::build(outcome, per_machine, test_config())
    }

    fn build(
        outcome: CheckOutcome,
        per_machine: BTreeMap<String, CheckOutcome>,
        config: RuntimeConfig,
    ) -> Self {
        let cluster = Arc::new(InMemoryCluster::new());
        let (sink, events) = ChannelEventSink::channel();
        let infra = OpenShiftInfrastructure::new(cluster.clone(), config, Arc::new(sink))
            .expect("infrastructure should build")
            .with_readiness_checker(Arc::new(ScriptedChecker {
                outcome,
                per_machine,
            }));
        Self {
            cluster,
            infra,
            events,
        }
    }

    pub async fn runtime(&self, yaml: &str) -> Arc<dyn InternalRuntime> {
        let environment = Environment::from_yaml(yaml).expect("environment should parse");
        let runtime = self
            .infra
            .create_runtime(RuntimeIdentity::new(WORKSPACE, "owner", "default"), environment)
            .await
            .expect("runtime should be created");
        Arc::from(runtime)
    }

    /// Events published so far.
    pub fn drain_events(&mut self) -> Vec<RuntimeEvent> {
        std::iter::from_fn(|| self.events.try_recv().ok()).collect()
    }
}

pub fn test_config() -> RuntimeConfig {
    RuntimeConfig {
        machine_start_timeout_min: 1,
        bootstrap_timeout_min: 1,
        deletion_timeout_min: 1,
        server_check_timeout_secs: 10,
        server_check_interval_millis: 100,
        server_check_insecure: false,
        project_name: None,
        output_channel: None,
        parallel_machine_start: true,
        preserve_volume_claims: false,
    }
}
