//! Runtime identity and read-only snapshots of orchestrator state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable `(workspace, owner, environment)` triple of one runtime instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeIdentity {
    pub workspace_id: String,
    pub owner: String,
    pub env_name: String,
}

impl RuntimeIdentity {
    pub fn new(
        workspace_id: impl Into<String>,
        owner: impl Into<String>,
        env_name: impl Into<String>,
    ) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            owner: owner.into(),
            env_name: env_name.into(),
        }
    }
}

impl fmt::Display for RuntimeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.workspace_id, self.env_name, self.owner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuntimeStatus {
    New,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl RuntimeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RuntimeStatus::Stopped | RuntimeStatus::Failed)
    }
}

impl fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuntimeStatus::New => "NEW",
            RuntimeStatus::Starting => "STARTING",
            RuntimeStatus::Running => "RUNNING",
            RuntimeStatus::Stopping => "STOPPING",
            RuntimeStatus::Stopped => "STOPPED",
            RuntimeStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineStatus {
    Starting,
    Running,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    Starting,
    Running,
}

/// A logical server with its resolved URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub url: String,
    pub status: ServerStatus,
}

impl Server {
    pub fn starting(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: ServerStatus::Starting,
        }
    }
}

/// Snapshot of one container instance as seen by callers of the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    pub name: String,
    pub pod_name: String,
    pub container_name: String,
    pub status: MachineStatus,
    pub servers: BTreeMap<String, Server>,
}
