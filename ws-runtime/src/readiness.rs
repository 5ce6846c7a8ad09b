use crate::machine::ClusterMachine;
use async_trait::async_trait;
use futures_util::future::try_join_all;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;
use ws_core::error::{InfraError, Result};
use ws_model::runtime::RuntimeIdentity;

/// Checks the servers of a machine.
///
/// The name of every server that becomes ready is sent through `ready`; the call
/// resolves once all servers are ready and fails when the check gives up.
#[async_trait]
pub trait ReadinessChecker: Send + Sync {
    async fn check(
        &self,
        identity: &RuntimeIdentity,
        machine: &ClusterMachine,
        ready: mpsc::UnboundedSender<String>,
    ) -> Result<()>;
}

/// Polls http(s) and ws(s) servers until they answer; other servers are ready at once.
pub struct HttpServersChecker {
    client: Client,
    timeout: Duration,
    interval: Duration,
    insecure: bool,
}

impl HttpServersChecker {
    /// `insecure` skips certificate verification for https servers.
    pub fn new(timeout: Duration, interval: Duration, insecure: bool) -> Result<Self> {
        let client = Client::builder()
            .timeout(interval.max(Duration::from_secs(1)))
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(|e| InfraError::Internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            timeout,
            interval,
            insecure,
        })
    }

    pub fn accepts_invalid_certs(&self) -> bool {
        self.insecure
    }

    async fn wait_for(&self, machine: &str, server: &str, url: Url) -> Result<()> {
        let probe = async {
            loop {
                match self.client.get(url.clone()).send().await {
                    Ok(response) if is_ready(response.status()) => return,
                    Ok(response) => {
                        debug!(server = %server, status = %response.status(), "Server not ready")
                    }
                    Err(e) => debug!(server = %server, error = %e, "Server not reachable"),
                }
                tokio::time::sleep(self.interval).await;
            }
        };

        tokio::time::timeout(self.timeout, probe).await.map_err(|_| {
            InfraError::Timeout(format!(
                "Server '{}' of machine '{}' didn't become available within {} seconds",
                server,
                machine,
                self.timeout.as_secs()
            ))
        })
    }
}

fn is_ready(status: StatusCode) -> bool {
    !status.is_server_error() && status != StatusCode::NOT_FOUND
}

/// HTTP URL to probe for a server, if its protocol can be probed at all.
fn probe_url(url: &str) -> Option<Url> {
    let mut url = Url::parse(url).ok()?;
    let scheme = match url.scheme() {
        "http" | "ws" => "http",
        "https" | "wss" => "https",
        _ => return None,
    };
    url.set_scheme(scheme).ok()?;
    Some(url)
}

#[async_trait]
impl ReadinessChecker for HttpServersChecker {
    async fn check(
        &self,
        _identity: &RuntimeIdentity,
        machine: &ClusterMachine,
        ready: mpsc::UnboundedSender<String>,
    ) -> Result<()> {
        let checks = machine.servers().iter().map(|(name, server)| {
            let ready = ready.clone();
            async move {
                if let Some(url) = probe_url(&server.url) {
                    self.wait_for(machine.name(), name, url).await?;
                }
                let _ = ready.send(name.clone());
                Ok::<(), InfraError>(())
            }
        });
        try_join_all(checks).await?;
        Ok(())
    }
}
