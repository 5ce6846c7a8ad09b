//! Lifecycle events published to the event sink.

use crate::runtime::{MachineStatus, RuntimeIdentity, RuntimeStatus, ServerStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    Machine(MachineStatusEvent),
    Server(ServerStatusEvent),
    Runtime(RuntimeStatusEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatusEvent {
    pub identity: RuntimeIdentity,
    pub machine_name: String,
    pub status: MachineStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatusEvent {
    pub identity: RuntimeIdentity,
    pub machine_name: String,
    pub server_name: String,
    pub status: ServerStatus,
    pub url: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatusEvent {
    pub identity: RuntimeIdentity,
    pub status: RuntimeStatus,
    pub previous_status: RuntimeStatus,
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub time: DateTime<Utc>,
}

impl RuntimeEvent {
    pub fn machine(
        identity: &RuntimeIdentity,
        machine_name: &str,
        status: MachineStatus,
        error: Option<String>,
    ) -> Self {
        RuntimeEvent::Machine(MachineStatusEvent {
            identity: identity.clone(),
            machine_name: machine_name.to_string(),
            status,
            error,
            time: Utc::now(),
        })
    }

    pub fn server(
        identity: &RuntimeIdentity,
        machine_name: &str,
        server_name: &str,
        status: ServerStatus,
        url: &str,
    ) -> Self {
        RuntimeEvent::Server(ServerStatusEvent {
            identity: identity.clone(),
            machine_name: machine_name.to_string(),
            server_name: server_name.to_string(),
            status,
            url: url.to_string(),
            time: Utc::now(),
        })
    }

    /// Runtime stopped on its own (not through a stop request).
    pub fn abnormal_stop(identity: &RuntimeIdentity, error: String) -> Self {
        RuntimeEvent::Runtime(RuntimeStatusEvent {
            identity: identity.clone(),
            status: RuntimeStatus::Stopped,
            previous_status: RuntimeStatus::Running,
            failed: true,
            error: Some(error),
            time: Utc::now(),
        })
    }

    pub fn identity(&self) -> &RuntimeIdentity {
        match self {
            RuntimeEvent::Machine(e) => &e.identity,
            RuntimeEvent::Server(e) => &e.identity,
            RuntimeEvent::Runtime(e) => &e.identity,
        }
    }
}
