use tokio::sync::mpsc;
use tracing::{info, warn};
use ws_model::events::RuntimeEvent;

/// Receives runtime lifecycle events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: RuntimeEvent);
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn publish(&self, event: RuntimeEvent) {
        match event {
            RuntimeEvent::Machine(e) => match e.error {
                Some(error) => warn!(
                    workspace = %e.identity.workspace_id,
                    machine = %e.machine_name,
                    status = ?e.status,
                    error = %error,
                    "Machine status changed"
                ),
                None => info!(
                    workspace = %e.identity.workspace_id,
                    machine = %e.machine_name,
                    status = ?e.status,
                    "Machine status changed"
                ),
            },
            RuntimeEvent::Server(e) => info!(
                workspace = %e.identity.workspace_id,
                machine = %e.machine_name,
                server = %e.server_name,
                status = ?e.status,
                url = %e.url,
                "Server status changed"
            ),
            RuntimeEvent::Runtime(e) => warn!(
                workspace = %e.identity.workspace_id,
                status = %e.status,
                previous = %e.previous_status,
                failed = e.failed,
                error = e.error.as_deref().unwrap_or(""),
                "Runtime status changed"
            ),
        }
    }
}

/// Forwards events into a channel.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<RuntimeEvent>,
}

impl ChannelEventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RuntimeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn publish(&self, event: RuntimeEvent) {
        // A dropped receiver just means nobody listens anymore
        let _ = self.tx.send(event);
    }
}
