use super::HttpCluster;
use crate::{ExecCompletion, ExecHandle};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use url::Url;
use ws_core::error::{InfraError, Result};

const EXEC_PROTOCOL: &str = "v4.channel.k8s.io";
const STATUS_CHANNEL: u8 = 3;

#[derive(Debug, Deserialize)]
struct ExecStatus {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub(super) async fn open(
    cluster: &HttpCluster,
    namespace: &str,
    pod: &str,
    container: &str,
    command: &[String],
) -> Result<ExecHandle> {
    let url = exec_url(&cluster.base, namespace, pod, container, command)?;

    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| InfraError::Internal(format!("Invalid exec request: {e}")))?;
    let headers = request.headers_mut();
    headers.insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(EXEC_PROTOCOL));
    if let Some(token) = &cluster.token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| InfraError::Internal(format!("Invalid bearer token: {e}")))?;
        headers.insert(AUTHORIZATION, value);
    }

    let connector = cluster.exec_connector.clone();
    let (socket, _) = connect_async_tls_with_config(request, None, false, connector)
        .await
        .map_err(|e| {
            InfraError::infra(format!("Failed to open exec session in pod '{}': {}", pod, e))
        })?;

    let (tx, rx) = oneshot::channel();
    let pod = pod.to_string();
    tokio::spawn(async move {
        let completion = drive(socket).await;
        debug!(pod = %pod, completion = ?completion, "Exec session finished");
        let _ = tx.send(completion);
    });
    Ok(rx)
}

/// Build the websocket exec URL; every command argument becomes its own
/// form-encoded `command` parameter.
pub(crate) fn exec_url(
    base: &Url,
    namespace: &str,
    pod: &str,
    container: &str,
    command: &[String],
) -> Result<Url> {
    let mut url = base
        .join(&format!("api/v1/namespaces/{}/pods/{}/exec", namespace, pod))
        .map_err(|e| InfraError::Internal(format!("Invalid exec path: {e}")))?;

    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| InfraError::Internal(format!("Cannot use scheme '{}' for exec", scheme)))?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("container", container);
        query.append_pair("stdout", "true");
        query.append_pair("stderr", "true");
        for arg in command {
            query.append_pair("command", arg);
        }
    }
    Ok(url)
}

async fn drive(mut socket: WebSocketStream<MaybeTlsStream<TcpStream>>) -> ExecCompletion {
    while let Some(message) = socket.next().await {
        match message {
            Ok(Message::Binary(data)) => match data.split_first() {
                Some((&STATUS_CHANNEL, payload)) => return status_completion(payload),
                Some((channel, payload)) => {
                    trace!(channel = *channel, output = %String::from_utf8_lossy(payload), "exec");
                }
                None => {}
            },
            Ok(Message::Close(_)) => return ExecCompletion::Closed,
            Ok(_) => {}
            Err(e) => return ExecCompletion::Failed(e.to_string()),
        }
    }
    ExecCompletion::Closed
}

fn status_completion(payload: &[u8]) -> ExecCompletion {
    match serde_json::from_slice::<ExecStatus>(payload) {
        Ok(status) if status.status.as_deref() == Some("Success") => ExecCompletion::Closed,
        Ok(status) => ExecCompletion::Failed(
            status
                .message
                .unwrap_or_else(|| "command terminated with a failure status".to_string()),
        ),
        Err(e) => ExecCompletion::Failed(format!("Unreadable exec status: {e}")),
    }
}
