//! In-memory cluster control plane.
//!
//! Behaves like a single namespaced API server: names are unique per kind and namespace,
//! every change is delivered to matching watch subscriptions, routes get a host assigned
//! on creation and pods move through phases according to [`PodStartup`]. Knobs let tests
//! script failures, hanging exec sessions and slow pod removal.

use crate::{ClusterApi, ExecCompletion, ExecHandle, WatchAction, WatchEvent, WatchFilter, WatchStream};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};
use ws_core::error::{InfraError, Result};
use ws_model::objects::{
    ObjectMeta, ResourceKind, POD_PHASE_FAILED, POD_PHASE_PENDING, POD_PHASE_RUNNING,
};

type ObjectKey = (ResourceKind, String, String);

/// Phase a pod reaches right after creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PodStartup {
    #[default]
    Running,
    Pending,
    Failed,
}

/// How exec sessions complete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExecBehavior {
    #[default]
    Complete,
    Fail(String),
    /// Never signal completion.
    Hang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRecord {
    pub namespace: String,
    pub pod: String,
    pub container: String,
    pub command: Vec<String>,
}

struct Watcher {
    kind: ResourceKind,
    namespace: String,
    filter: WatchFilter,
    tx: mpsc::UnboundedSender<WatchEvent>,
}

#[derive(Default)]
struct State {
    namespaces: BTreeSet<String>,
    objects: BTreeMap<ObjectKey, Value>,
    watchers: Vec<Watcher>,
    watch_count: usize,
    resource_version: u64,
    pod_startup: PodStartup,
    exec_behavior: ExecBehavior,
    exec_log: Vec<ExecRecord>,
    hanging_execs: Vec<oneshot::Sender<ExecCompletion>>,
    create_failures: BTreeMap<(ResourceKind, String), String>,
    hold_pod_deletions: bool,
}

pub struct InMemoryCluster {
    state: Mutex<State>,
    route_domain: String,
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::with_route_domain("apps.cluster.local")
    }

    pub fn with_route_domain(domain: &str) -> Self {
        Self {
            state: Mutex::new(State::default()),
            route_domain: domain.to_string(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("Mutex should not be poisoned")
    }

    pub fn set_pod_startup(&self, startup: PodStartup) {
        self.lock().pod_startup = startup;
    }

    pub fn set_exec_behavior(&self, behavior: ExecBehavior) {
        self.lock().exec_behavior = behavior;
    }

    /// Make the next creation of `kind`/`name` fail with `message`.
    pub fn fail_create(&self, kind: ResourceKind, name: &str, message: &str) {
        self.lock()
            .create_failures
            .insert((kind, name.to_string()), message.to_string());
    }

    /// While held, deleted pods stay around (marked as terminating) until
    /// [`InMemoryCluster::finish_pod_deletions`] is called.
    pub fn hold_pod_deletions(&self, hold: bool) {
        self.lock().hold_pod_deletions = hold;
    }

    pub fn finish_pod_deletions(&self) {
        let mut state = self.lock();
        let terminating: Vec<ObjectKey> = state
            .objects
            .iter()
            .filter(|((kind, _, _), object)| {
                *kind == ResourceKind::Pod && !object["metadata"]["deletionTimestamp"].is_null()
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in terminating {
            if let Some(object) = state.objects.remove(&key) {
                state.notify(key.0, &key.1, WatchAction::Deleted, &object);
            }
        }
    }

    /// Move a pod to `phase`, notifying watchers.
    pub fn set_pod_phase(&self, namespace: &str, name: &str, phase: &str) -> Result<()> {
        let mut state = self.lock();
        let key = (ResourceKind::Pod, namespace.to_string(), name.to_string());
        let mut object = state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| InfraError::NotFound(format!("pods \"{}\" not found", name)))?;

        object["status"]["phase"] = json!(phase);
        state.bump(&mut object);
        state.objects.insert(key, object.clone());
        state.notify(ResourceKind::Pod, namespace, WatchAction::Modified, &object);
        Ok(())
    }

    /// Number of watch subscriptions ever opened.
    pub fn watch_count(&self) -> usize {
        self.lock().watch_count
    }

    /// End every open subscription, as an API server does when a watch expires.
    pub fn close_watchers(&self) {
        self.lock().watchers.clear();
    }

    pub fn exec_log(&self) -> Vec<ExecRecord> {
        self.lock().exec_log.clone()
    }

    pub fn object_names(&self, kind: ResourceKind, namespace: &str) -> Vec<String> {
        self.lock()
            .objects
            .keys()
            .filter(|(k, ns, _)| *k == kind && ns == namespace)
            .map(|(_, _, name)| name.clone())
            .collect()
    }

    /// Number of objects of any kind left in a namespace.
    pub fn object_count(&self, namespace: &str) -> usize {
        self.lock()
            .objects
            .keys()
            .filter(|(_, ns, _)| ns == namespace)
            .count()
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.lock().namespaces.contains(namespace)
    }
}

impl State {
    fn bump(&mut self, object: &mut Value) {
        self.resource_version += 1;
        object["metadata"]["resourceVersion"] = json!(self.resource_version.to_string());
    }

    fn notify(&mut self, kind: ResourceKind, namespace: &str, action: WatchAction, object: &Value) {
        self.watchers.retain(|w| !w.tx.is_closed());
        let metadata = metadata_of(object);
        for watcher in &self.watchers {
            if watcher.kind == kind
                && watcher.namespace == namespace
                && watcher.filter.matches(&metadata)
            {
                let _ = watcher.tx.send(WatchEvent {
                    action,
                    object: object.clone(),
                });
            }
        }
    }

    fn require_namespace(&self, namespace: &str) -> Result<()> {
        if self.namespaces.contains(namespace) {
            Ok(())
        } else {
            Err(InfraError::NotFound(format!(
                "namespaces \"{}\" not found",
                namespace
            )))
        }
    }
}

fn metadata_of(object: &Value) -> ObjectMeta {
    object
        .get("metadata")
        .cloned()
        .and_then(|m| serde_json::from_value(m).ok())
        .unwrap_or_default()
}

#[async_trait]
impl ClusterApi for InMemoryCluster {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        Ok(self.lock().namespaces.contains(namespace))
    }

    async fn create_namespace(&self, namespace: &str) -> Result<()> {
        if !self.lock().namespaces.insert(namespace.to_string()) {
            return Err(InfraError::infra(format!(
                "namespaces \"{}\" already exists",
                namespace
            )));
        }
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        let mut state = self.lock();
        state.require_namespace(namespace)?;

        let keys: Vec<ObjectKey> = state
            .objects
            .keys()
            .filter(|(_, ns, _)| ns == namespace)
            .cloned()
            .collect();
        for key in keys {
            if let Some(object) = state.objects.remove(&key) {
                state.notify(key.0, namespace, WatchAction::Deleted, &object);
            }
        }
        state.namespaces.remove(namespace);
        Ok(())
    }

    async fn create(&self, kind: ResourceKind, namespace: &str, object: Value) -> Result<Value> {
        let mut object = object;
        if !object.is_object() {
            return Err(InfraError::Internal(format!("{} must be a JSON object", kind)));
        }

        let mut state = self.lock();
        state.require_namespace(namespace)?;

        let name = metadata_of(&object).name;
        if name.is_empty() {
            return Err(InfraError::infra("metadata.name: Required value"));
        }
        if let Some(message) = state.create_failures.remove(&(kind, name.clone())) {
            return Err(InfraError::infra(message));
        }

        let key = (kind, namespace.to_string(), name.clone());
        if state.objects.contains_key(&key) {
            return Err(InfraError::infra(format!(
                "{} \"{}\" already exists",
                kind.plural(),
                name
            )));
        }

        object["metadata"]["namespace"] = json!(namespace);
        object["metadata"]["uid"] = json!(format!("{}-{}", namespace, state.resource_version + 1));
        match kind {
            ResourceKind::Route if object["spec"]["host"].as_str().unwrap_or("").is_empty() => {
                object["spec"]["host"] =
                    json!(format!("{}-{}.{}", name, namespace, self.route_domain));
            }
            ResourceKind::Pod => {
                object["status"]["phase"] = json!(POD_PHASE_PENDING);
            }
            _ => {}
        }
        state.bump(&mut object);
        state.objects.insert(key.clone(), object.clone());
        state.notify(kind, namespace, WatchAction::Added, &object);

        if kind == ResourceKind::Pod {
            let phase = match state.pod_startup {
                PodStartup::Running => Some(POD_PHASE_RUNNING),
                PodStartup::Failed => Some(POD_PHASE_FAILED),
                PodStartup::Pending => None,
            };
            if let Some(phase) = phase {
                object["status"]["phase"] = json!(phase);
                state.bump(&mut object);
                state.objects.insert(key, object.clone());
                state.notify(kind, namespace, WatchAction::Modified, &object);
            }
        }

        Ok(object)
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Value>> {
        let filter = WatchFilter::labelled(labels.clone());
        Ok(self
            .lock()
            .objects
            .iter()
            .filter(|((k, ns, _), object)| {
                *k == kind && ns == namespace && filter.matches(&metadata_of(object))
            })
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<Option<Value>> {
        let key = (kind, namespace.to_string(), name.to_string());
        Ok(self.lock().objects.get(&key).cloned())
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.lock();
        let key = (kind, namespace.to_string(), name.to_string());
        let Some(mut object) = state.objects.get(&key).cloned() else {
            return Err(InfraError::NotFound(format!(
                "{} \"{}\" not found",
                kind.plural(),
                name
            )));
        };

        if kind == ResourceKind::Pod && state.hold_pod_deletions {
            object["metadata"]["deletionTimestamp"] = json!(Utc::now().to_rfc3339());
            state.bump(&mut object);
            state.objects.insert(key, object.clone());
            state.notify(kind, namespace, WatchAction::Modified, &object);
            return Ok(());
        }

        state.objects.remove(&key);
        state.notify(kind, namespace, WatchAction::Deleted, &object);
        Ok(())
    }

    async fn watch(
        &self,
        kind: ResourceKind,
        namespace: &str,
        filter: &WatchFilter,
    ) -> Result<WatchStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        state.watch_count += 1;
        state.watchers.push(Watcher {
            kind,
            namespace: namespace.to_string(),
            filter: filter.clone(),
            tx,
        });
        Ok(rx)
    }

    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[String],
    ) -> Result<ExecHandle> {
        let mut state = self.lock();
        let key = (ResourceKind::Pod, namespace.to_string(), pod.to_string());
        let object = state
            .objects
            .get(&key)
            .ok_or_else(|| InfraError::NotFound(format!("pods \"{}\" not found", pod)))?;

        let has_container = object["spec"]["containers"]
            .as_array()
            .map(|cs| cs.iter().any(|c| c["name"] == container))
            .unwrap_or(false);
        if !has_container {
            return Err(InfraError::infra(format!(
                "container {} is not valid for pod {}",
                container, pod
            )));
        }

        state.exec_log.push(ExecRecord {
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            container: container.to_string(),
            command: command.to_vec(),
        });

        let (tx, rx) = oneshot::channel();
        match state.exec_behavior.clone() {
            ExecBehavior::Complete => {
                let _ = tx.send(ExecCompletion::Closed);
            }
            ExecBehavior::Fail(message) => {
                let _ = tx.send(ExecCompletion::Failed(message));
            }
            ExecBehavior::Hang => state.hanging_execs.push(tx),
        }
        Ok(rx)
    }
}
