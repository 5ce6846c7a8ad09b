use super::resources::ResourceClient;
use crate::{ClusterApi, ExecCompletion, WatchAction, WatchFilter, WatchStream};
use futures_util::future::try_join_all;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use ws_core::error::{InfraError, Result};
use ws_model::objects::{Pod, Resource};

const WATCH_REOPEN_DELAY: Duration = Duration::from_secs(1);
const WATCH_REOPEN_MAX_DELAY: Duration = Duration::from_secs(30);

/// Callback invoked for every pod event of the workspace.
pub type PodActionHandler = Arc<dyn Fn(WatchAction, &Pod) + Send + Sync>;

#[derive(Default)]
struct PodWatch {
    handlers: RwLock<Vec<PodActionHandler>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl PodWatch {
    fn dispatch(&self, action: WatchAction, pod: &Pod) {
        let handlers = self
            .handlers
            .read()
            .expect("RwLock should not be poisoned")
            .clone();
        for handler in handlers {
            handler(action, pod);
        }
    }
}

/// Pod client with watch, wait, exec and removal-aware deletion.
#[derive(Clone)]
pub struct Pods {
    client: ResourceClient<Pod>,
    watch: Arc<PodWatch>,
}

impl Pods {
    pub fn new(api: Arc<dyn ClusterApi>, namespace: &str, workspace_id: &str) -> Self {
        Self {
            client: ResourceClient::new(api, namespace, workspace_id),
            watch: Arc::new(PodWatch::default()),
        }
    }

    fn api(&self) -> &Arc<dyn ClusterApi> {
        self.client.api()
    }

    fn namespace(&self) -> &str {
        self.client.namespace()
    }

    pub async fn create(&self, pod: Pod) -> Result<Pod> {
        self.client.create(pod).await
    }

    pub async fn list(&self) -> Result<Vec<Pod>> {
        self.client.list().await
    }

    pub async fn get(&self, name: &str) -> Result<Option<Pod>> {
        self.client.get(name).await
    }

    /// Register a handler for the workspace's pod events.
    ///
    /// The first call opens the subscription; later calls only add handlers.
    pub async fn watch(&self, handler: PodActionHandler) -> Result<()> {
        let mut dispatcher = self.watch.dispatcher.lock().await;
        if dispatcher.is_none() {
            let events = self.open_watch().await?;
            let pods = self.clone();
            *dispatcher = Some(tokio::spawn(pods.dispatch_events(events)));
        }

        self.watch
            .handlers
            .write()
            .expect("RwLock should not be poisoned")
            .push(handler);
        Ok(())
    }

    async fn open_watch(&self) -> Result<WatchStream> {
        let filter = WatchFilter::labelled(self.client.workspace_labels());
        self.api().watch(Pod::KIND, self.namespace(), &filter).await
    }

    /// Forward events to the handlers until `stop_watch` aborts the task.
    /// A subscription closed by the server is reopened.
    async fn dispatch_events(self, mut events: WatchStream) {
        loop {
            while let Some(event) = events.recv().await {
                match serde_json::from_value::<Pod>(event.object) {
                    Ok(pod) => self.watch.dispatch(event.action, &pod),
                    Err(e) => warn!(error = %e, "Skipping unreadable pod event"),
                }
            }
            warn!(namespace = %self.namespace(), "Pod watch closed by the server, reopening");
            events = self.reopen_watch().await;
        }
    }

    async fn reopen_watch(&self) -> WatchStream {
        let mut delay = WATCH_REOPEN_DELAY;
        loop {
            tokio::time::sleep(delay).await;
            match self.open_watch().await {
                Ok(events) => {
                    // Transitions made while no subscription was open are replayed from a listing
                    match self.list().await {
                        Ok(pods) => {
                            for pod in &pods {
                                self.watch.dispatch(WatchAction::Modified, pod);
                            }
                        }
                        Err(e) => warn!(error = %e, "Failed to list pods after reopening watch"),
                    }
                    debug!(namespace = %self.namespace(), "Pod watch reopened");
                    return events;
                }
                Err(e) => {
                    warn!(error = %e, retry_in = ?delay, "Failed to reopen pod watch");
                    delay = (delay * 2).min(WATCH_REOPEN_MAX_DELAY);
                }
            }
        }
    }

    /// Close the shared subscription and forget every handler.
    pub async fn stop_watch(&self) {
        if let Some(dispatcher) = self.watch.dispatcher.lock().await.take() {
            dispatcher.abort();
        }
        self.watch
            .handlers
            .write()
            .expect("RwLock should not be poisoned")
            .clear();
    }

    /// Wait until the pod satisfies `predicate`.
    ///
    /// The subscription is opened before the current state is read, so a transition
    /// between the two cannot be missed.
    pub async fn wait<F>(&self, name: &str, timeout: Duration, predicate: F) -> Result<Pod>
    where
        F: Fn(&Pod) -> bool,
    {
        let mut events = self
            .api()
            .watch(Pod::KIND, self.namespace(), &WatchFilter::named(name))
            .await?;

        let current = self.get(name).await?.ok_or_else(|| {
            InfraError::NotFound(format!("Specified pod {} doesn't exist", name))
        })?;
        if predicate(&current) {
            return Ok(current);
        }

        tokio::time::timeout(timeout, next_matching(&mut events, name, &predicate))
            .await
            .map_err(|_| InfraError::Timeout(format!("Waiting for pod '{}' reached timeout", name)))?
    }

    /// Run a command in a container and wait for the remote process to finish.
    pub async fn exec(
        &self,
        pod: &str,
        container: &str,
        timeout: Duration,
        command: &[String],
    ) -> Result<()> {
        let completion = tokio::time::timeout(timeout, self.run_session(pod, container, command))
            .await
            .map_err(|_| {
                InfraError::Timeout("Timeout reached while execution of command".to_string())
            })??;

        match completion {
            ExecCompletion::Closed => Ok(()),
            ExecCompletion::Failed(message) => Err(InfraError::infra(format!(
                "Failed to execute command in container '{}' of pod '{}': {}",
                container, pod, message
            ))),
        }
    }

    async fn run_session(
        &self,
        pod: &str,
        container: &str,
        command: &[String],
    ) -> Result<ExecCompletion> {
        let handle = self
            .api()
            .exec(self.namespace(), pod, container, command)
            .await?;
        handle.await.map_err(|_| {
            InfraError::infra(format!("Exec session in pod '{}' ended unexpectedly", pod))
        })
    }

    /// Delete every workspace pod and wait until the cluster reports each one gone.
    pub async fn delete_all(&self, timeout: Duration) -> Result<()> {
        let pods = self.list().await?;
        let deletions = pods.iter().map(|pod| self.delete_and_wait(pod.name()));

        tokio::time::timeout(timeout, try_join_all(deletions))
            .await
            .map_err(|_| InfraError::Timeout("Waiting for pods removal reached timeout".to_string()))??;
        Ok(())
    }

    async fn delete_and_wait(&self, name: &str) -> Result<()> {
        let mut events = self
            .api()
            .watch(Pod::KIND, self.namespace(), &WatchFilter::named(name))
            .await?;

        match self.client.delete(name).await {
            Ok(()) => {}
            Err(InfraError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        }

        while let Some(event) = events.recv().await {
            if event.action == WatchAction::Deleted {
                debug!(pod = %name, "Pod removed");
                return Ok(());
            }
        }

        match self.get(name).await? {
            None => Ok(()),
            Some(_) => Err(InfraError::infra(format!(
                "Watch closed before pod '{}' was removed",
                name
            ))),
        }
    }
}

async fn next_matching<F>(events: &mut WatchStream, name: &str, predicate: &F) -> Result<Pod>
where
    F: Fn(&Pod) -> bool,
{
    while let Some(event) = events.recv().await {
        if event.action == WatchAction::Deleted {
            return Err(InfraError::infra(format!(
                "Pod '{}' was deleted while waiting for it",
                name
            )));
        }
        let pod: Pod = serde_json::from_value(event.object)?;
        if predicate(&pod) {
            return Ok(pod);
        }
    }
    Err(InfraError::infra(format!(
        "Watch of pod '{}' was closed while waiting for it",
        name
    )))
}
