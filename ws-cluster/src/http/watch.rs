use super::{check, label_selector, HttpCluster};
use crate::{WatchAction, WatchEvent, WatchFilter, WatchStream};
use futures_util::StreamExt;
use reqwest::Response;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use ws_core::error::{InfraError, Result};
use ws_model::objects::ResourceKind;

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    object: Value,
}

pub(super) async fn open(
    cluster: &HttpCluster,
    kind: ResourceKind,
    namespace: &str,
    filter: &WatchFilter,
) -> Result<WatchStream> {
    let mut url = cluster.collection_url(kind, namespace)?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("watch", "true");
        if let Some(name) = &filter.name {
            query.append_pair("fieldSelector", &format!("metadata.name={}", name));
        }
        if !filter.labels.is_empty() {
            query.append_pair("labelSelector", &label_selector(&filter.labels));
        }
    }

    let response = cluster
        .authorized(cluster.client.get(url))
        .send()
        .await
        .map_err(|e| InfraError::infra(format!("Failed to open {} watch: {e}", kind)))?;
    let response = check(response).await?;

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(forward(response, tx, kind));
    Ok(rx)
}

/// Pump newline-delimited watch events into the subscription until either side closes.
async fn forward(response: Response, tx: mpsc::UnboundedSender<WatchEvent>, kind: ResourceKind) {
    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        tokio::select! {
            _ = tx.closed() => break,
            chunk = stream.next() => match chunk {
                Some(Ok(bytes)) => {
                    buffer.extend_from_slice(&bytes);
                    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = buffer.drain(..=pos).collect();
                        if let Some(event) = parse_line(&line) {
                            if tx.send(event).is_err() {
                                return;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!(kind = %kind, error = %e, "Watch stream failed");
                    break;
                }
                None => break,
            }
        }
    }

    debug!(kind = %kind, "Watch stream closed");
}

fn parse_line(line: &[u8]) -> Option<WatchEvent> {
    let text = std::str::from_utf8(line).ok()?.trim();
    if text.is_empty() {
        return None;
    }

    let raw: RawEvent = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Skipping unreadable watch event");
            return None;
        }
    };

    let action = match raw.event_type.as_str() {
        "ADDED" => WatchAction::Added,
        "MODIFIED" => WatchAction::Modified,
        "DELETED" => WatchAction::Deleted,
        other => {
            debug!(event_type = %other, "Ignoring watch event");
            return None;
        }
    };

    Some(WatchEvent {
        action,
        object: raw.object,
    })
}
