//! Declarative environment consumed by the orchestrator.
//!
//! The environment is produced and validated elsewhere; the orchestrator only reads it,
//! apart from the provisioning pass that materialises servers into Services and Routes.

use crate::objects::{PersistentVolumeClaim, Pod, Resource, Route, Service, DEFAULT_TRANSPORT};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ws_core::error::{InfraError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    /// Machine configuration keyed by machine name (`<pod>/<container>`).
    #[serde(default)]
    pub machines: IndexMap<String, MachineConfig>,
    #[serde(default)]
    pub pods: IndexMap<String, Pod>,
    #[serde(default)]
    pub services: IndexMap<String, Service>,
    #[serde(default)]
    pub routes: IndexMap<String, Route>,
    #[serde(default)]
    pub persistent_volume_claims: IndexMap<String, PersistentVolumeClaim>,
}

impl Environment {
    /// Parse an environment from YAML. Objects without a `metadata.name` take their map key.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut env: Environment = serde_yaml_ng::from_str(content)?;
        name_from_keys(&mut env.pods);
        name_from_keys(&mut env.services);
        name_from_keys(&mut env.routes);
        name_from_keys(&mut env.persistent_volume_claims);
        Ok(env)
    }

    pub fn machine_config(&self, machine_name: &str) -> Option<&MachineConfig> {
        self.machines.get(machine_name)
    }

    /// Installers declared for a machine; empty when the machine has none.
    pub fn installers(&self, machine_name: &str) -> &[InstallerConfig] {
        self.machines
            .get(machine_name)
            .map(|m| m.installers.as_slice())
            .unwrap_or(&[])
    }
}

fn name_from_keys<R: Resource>(objects: &mut IndexMap<String, R>) {
    for (key, object) in objects.iter_mut() {
        if object.metadata().name.is_empty() {
            object.metadata_mut().name = key.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfig {
    #[serde(default)]
    pub installers: Vec<InstallerConfig>,
    #[serde(default)]
    pub servers: IndexMap<String, ServerConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

/// One installer to run inside a machine during bootstrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallerConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

/// A logical server declared on a machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// `<port>` or `<port>/<transport>`, e.g. `8080/tcp`.
    pub port: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default = "default_external")]
    pub external: bool,
}

fn default_external() -> bool {
    true
}

impl ServerConfig {
    pub fn new(port: &str, protocol: Option<&str>, path: Option<&str>) -> Self {
        Self {
            port: port.to_string(),
            protocol: protocol.map(str::to_string),
            path: path.map(str::to_string),
            external: true,
        }
    }

    /// Same server, reachable only from inside the cluster.
    pub fn internal(mut self) -> Self {
        self.external = false;
        self
    }

    /// Split the port declaration into number and upper-cased transport (TCP when absent).
    pub fn port_spec(&self) -> Result<PortSpec> {
        let (number, transport) = match self.port.split_once('/') {
            Some((number, transport)) => (number, transport.trim().to_uppercase()),
            None => (self.port.as_str(), DEFAULT_TRANSPORT.to_string()),
        };

        let port = number
            .trim()
            .parse::<i32>()
            .ok()
            .filter(|p| (1..=65535).contains(p))
            .ok_or_else(|| {
                InfraError::Internal(format!("Invalid server port '{}'", self.port))
            })?;

        if transport.is_empty() {
            return Err(InfraError::Internal(format!(
                "Invalid server port '{}'",
                self.port
            )));
        }

        Ok(PortSpec { port, transport })
    }
}

/// Parsed `(port, transport)` pair; the grouping key for Service ports and Routes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortSpec {
    pub port: i32,
    pub transport: String,
}
