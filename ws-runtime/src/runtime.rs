//! Runtime of one environment on an OpenShift project.
//!
//! Start creates volume claims, Services, Routes and pods (in that order), then brings
//! every machine up: pod running, installers applied, servers ready. Any failure cleans
//! the whole project before the error is returned, so a failed start never leaves
//! objects behind. A pod failing later stops the runtime on its own.

use crate::bootstrap::Bootstrapper;
use crate::config::RuntimeConfig;
use crate::events::EventSink;
use crate::machine::{machine_name, ClusterMachine};
use crate::readiness::ReadinessChecker;
use crate::server::ServerResolver;
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::try_join_all;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use ws_cluster::{PodActionHandler, Project, WatchAction};
use ws_core::error::{InfraError, Result};
use ws_model::environment::Environment;
use ws_model::events::RuntimeEvent;
use ws_model::objects::{Pod, Resource};
use ws_model::runtime::{Machine, MachineStatus, RuntimeIdentity, RuntimeStatus, ServerStatus};

pub const START_INTERRUPTED: &str = "OpenShift environment start was interrupted";

/// A started (or startable) environment.
#[async_trait]
pub trait InternalRuntime: Send + Sync {
    fn identity(&self) -> &RuntimeIdentity;

    fn status(&self) -> RuntimeStatus;

    /// Snapshot of the machines keyed by machine name.
    fn machines(&self) -> BTreeMap<String, Machine>;

    async fn start(&self) -> Result<()>;

    /// Remove everything the runtime created. Stopping twice is not an error.
    async fn stop(&self) -> Result<()>;

    /// Abort a start in progress.
    fn interrupt(&self);
}

/// External collaborators used while starting machines.
#[derive(Clone)]
pub struct Collaborators {
    pub bootstrapper: Arc<dyn Bootstrapper>,
    pub checker: Arc<dyn ReadinessChecker>,
    pub events: Arc<dyn EventSink>,
}

pub struct OpenShiftRuntime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    identity: RuntimeIdentity,
    environment: Environment,
    project: Project,
    config: RuntimeConfig,
    collaborators: Collaborators,
    status: Mutex<RuntimeStatus>,
    machines: DashMap<String, ClusterMachine>,
    abnormally_stopped: AtomicBool,
    // Set when a failing pod cancels the start
    stop_reason: Mutex<Option<String>>,
    cancel: CancellationToken,
}

impl OpenShiftRuntime {
    pub fn new(
        identity: RuntimeIdentity,
        environment: Environment,
        project: Project,
        config: RuntimeConfig,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                identity,
                environment,
                project,
                config,
                collaborators,
                status: Mutex::new(RuntimeStatus::New),
                machines: DashMap::new(),
                abnormally_stopped: AtomicBool::new(false),
                stop_reason: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn project(&self) -> &Project {
        &self.inner.project
    }

    /// The environment after provisioning.
    pub fn environment(&self) -> &Environment {
        &self.inner.environment
    }
}

#[async_trait]
impl InternalRuntime for OpenShiftRuntime {
    fn identity(&self) -> &RuntimeIdentity {
        &self.inner.identity
    }

    fn status(&self) -> RuntimeStatus {
        self.inner.status()
    }

    fn machines(&self) -> BTreeMap<String, Machine> {
        self.inner
            .machines
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }

    async fn start(&self) -> Result<()> {
        self.inner.start().await
    }

    async fn stop(&self) -> Result<()> {
        self.inner.stop().await
    }

    fn interrupt(&self) {
        self.inner.cancel.cancel();
    }
}

impl RuntimeInner {
    fn status(&self) -> RuntimeStatus {
        *self.status.lock().expect("Mutex should not be poisoned")
    }

    /// Move to `to` when the current status is one of `from`; returns the previous status.
    fn transition(&self, from: &[RuntimeStatus], to: RuntimeStatus) -> Option<RuntimeStatus> {
        let mut status = self.status.lock().expect("Mutex should not be poisoned");
        if from.contains(&*status) {
            let previous = *status;
            *status = to;
            Some(previous)
        } else {
            None
        }
    }

    /// Error reported by a start that was cancelled.
    fn cancellation_error(&self) -> InfraError {
        match self
            .stop_reason
            .lock()
            .expect("Mutex should not be poisoned")
            .clone()
        {
            Some(reason) => InfraError::infra(reason),
            None => InfraError::Interrupted(START_INTERRUPTED.to_string()),
        }
    }

    fn publish(&self, event: RuntimeEvent) {
        self.collaborators.events.publish(event);
    }

    #[instrument(skip(self), fields(workspace = %self.identity.workspace_id))]
    async fn start(self: &Arc<Self>) -> Result<()> {
        if self
            .transition(&[RuntimeStatus::New], RuntimeStatus::Starting)
            .is_none()
        {
            return Err(InfraError::InvalidState(format!(
                "Runtime of workspace '{}' is {} and cannot be started",
                self.identity.workspace_id,
                self.status()
            )));
        }
        info!(project = %self.project.name(), "Starting runtime");

        // Cancellation is checked first so no step runs after a stop began
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.cancellation_error()),
            result = self.internal_start() => result,
        };

        match result {
            Ok(()) => {
                if self
                    .transition(&[RuntimeStatus::Starting], RuntimeStatus::Running)
                    .is_none()
                {
                    return Err(self.cancellation_error());
                }
                info!("Runtime is running");
                Ok(())
            }
            Err(e) => {
                let e = if e.is_interrupted() {
                    self.cancellation_error()
                } else {
                    e
                };
                error!(error = %e, "Runtime start failed");

                // A concurrent stop has already moved the status and owns the cleanup
                if self
                    .transition(&[RuntimeStatus::Starting], RuntimeStatus::Failed)
                    .is_some()
                {
                    if let Err(cleanup) = self.internal_stop().await {
                        error!(error = %cleanup, "Failed to clean up project after failed start");
                    }
                }
                Err(e)
            }
        }
    }

    async fn internal_start(self: &Arc<Self>) -> Result<()> {
        let project = &self.project;

        let existing: HashSet<String> = project
            .volume_claims()
            .list()
            .await?
            .iter()
            .map(|claim| claim.name().to_string())
            .collect();
        for claim in self.environment.persistent_volume_claims.values() {
            if existing.contains(claim.name()) {
                debug!(claim = %claim.name(), "Volume claim already exists");
                continue;
            }
            project.volume_claims().create(claim.clone()).await?;
        }

        let mut services = Vec::with_capacity(self.environment.services.len());
        for service in self.environment.services.values() {
            services.push(project.services().create(service.clone()).await?);
        }
        let mut routes = Vec::with_capacity(self.environment.routes.len());
        for route in self.environment.routes.values() {
            routes.push(project.routes().create(route.clone()).await?);
        }

        // Registered before any pod exists so an immediate crash is still seen
        let runtime = Arc::downgrade(self);
        let handler: PodActionHandler = Arc::new(move |_: WatchAction, pod: &Pod| {
            if let Some(runtime) = runtime.upgrade() {
                runtime.on_pod_event(pod);
            }
        });
        project.pods().watch(handler).await?;

        let resolver = ServerResolver::of(services, routes);
        let mut names = Vec::new();
        for pod in self.environment.pods.values() {
            let created = project.pods().create(pod.clone()).await?;
            for container in &created.spec.containers {
                let name = machine_name(&created, container);
                let machine = ClusterMachine::new(
                    name.clone(),
                    created.name(),
                    &container.name,
                    resolver.resolve(&created, container),
                    project.pods().clone(),
                );
                self.machines.insert(name.clone(), machine);
                self.publish(RuntimeEvent::machine(
                    &self.identity,
                    &name,
                    MachineStatus::Starting,
                    None,
                ));
                names.push(name);
            }
        }

        if self.config.parallel_machine_start {
            try_join_all(names.iter().map(|name| self.start_machine(name))).await?;
        } else {
            for name in &names {
                self.start_machine(name).await?;
            }
        }
        Ok(())
    }

    async fn start_machine(&self, name: &str) -> Result<()> {
        let machine = self
            .machines
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                InfraError::infra(format!("Machine '{}' was removed while starting", name))
            })?;

        match self.bring_up(&machine).await {
            Ok(()) => {
                if let Some(mut entry) = self.machines.get_mut(name) {
                    entry.set_status(MachineStatus::Running);
                }
                info!(machine = %name, "Machine is running");
                self.publish(RuntimeEvent::machine(
                    &self.identity,
                    name,
                    MachineStatus::Running,
                    None,
                ));
                Ok(())
            }
            Err(e) => {
                if let Some(mut entry) = self.machines.get_mut(name) {
                    entry.set_status(MachineStatus::Failed);
                }
                self.publish(RuntimeEvent::machine(
                    &self.identity,
                    name,
                    MachineStatus::Failed,
                    Some(e.to_string()),
                ));
                Err(e)
            }
        }
    }

    async fn bring_up(&self, machine: &ClusterMachine) -> Result<()> {
        machine
            .wait_running(self.config.machine_start_timeout())
            .await?;
        self.collaborators
            .bootstrapper
            .bootstrap(
                &self.identity,
                self.environment.installers(machine.name()),
                machine,
            )
            .await?;
        self.check_servers(machine).await
    }

    async fn check_servers(&self, machine: &ClusterMachine) -> Result<()> {
        let (ready_tx, mut ready_rx) = mpsc::unbounded_channel();
        let check = self
            .collaborators
            .checker
            .check(&self.identity, machine, ready_tx);
        let updates = async {
            while let Some(server) = ready_rx.recv().await {
                self.on_server_ready(machine.name(), &server);
            }
        };

        let (result, ()) = tokio::join!(check, updates);
        result
    }

    fn on_server_ready(&self, machine_name: &str, server: &str) {
        let url = match self.machines.get_mut(machine_name) {
            Some(mut machine) => machine.set_server_running(server),
            None => {
                debug!(machine = %machine_name, server = %server, "Machine is gone, ignoring ready server");
                return;
            }
        };

        match url {
            Some(url) => self.publish(RuntimeEvent::server(
                &self.identity,
                machine_name,
                server,
                ServerStatus::Running,
                &url,
            )),
            None => warn!(machine = %machine_name, server = %server, "Unknown server reported ready"),
        }
    }

    fn on_pod_event(self: &Arc<Self>, pod: &Pod) {
        if !pod.is_failed() || self.abnormally_stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let reason = format!("Pod '{}' was abnormally stopped", pod.name());
        warn!(workspace = %self.identity.workspace_id, pod = %pod.name(), "Pod failed, stopping runtime");
        let runtime = Arc::clone(self);
        tokio::spawn(async move { runtime.abnormal_stop(reason).await });
    }

    async fn abnormal_stop(&self, reason: String) {
        let Some(previous) = self.transition(
            &[RuntimeStatus::Starting, RuntimeStatus::Running],
            RuntimeStatus::Stopping,
        ) else {
            return;
        };

        if previous == RuntimeStatus::Starting {
            *self.stop_reason.lock().expect("Mutex should not be poisoned") = Some(reason.clone());
            self.cancel.cancel();
        }

        if let Err(e) = self.internal_stop().await {
            error!(workspace = %self.identity.workspace_id, error = %e, "Failed to stop abnormally terminated runtime");
        }
        self.transition(&[RuntimeStatus::Stopping], RuntimeStatus::Stopped);
        self.publish(RuntimeEvent::abnormal_stop(&self.identity, reason));
    }

    #[instrument(skip(self), fields(workspace = %self.identity.workspace_id))]
    async fn stop(&self) -> Result<()> {
        let previous = match self.transition(
            &[
                RuntimeStatus::New,
                RuntimeStatus::Starting,
                RuntimeStatus::Running,
            ],
            RuntimeStatus::Stopping,
        ) {
            Some(previous) => previous,
            None => {
                debug!(status = %self.status(), "Runtime is not active, nothing to stop");
                return Ok(());
            }
        };

        if previous == RuntimeStatus::Starting {
            self.cancel.cancel();
        }
        info!("Stopping runtime");

        let result = self.internal_stop().await;
        self.transition(&[RuntimeStatus::Stopping], RuntimeStatus::Stopped);
        if result.is_ok() {
            info!("Runtime stopped");
        }
        result
    }

    async fn internal_stop(&self) -> Result<()> {
        let result = self.project.cleanup().await;
        self.machines.clear();
        result
    }
}
