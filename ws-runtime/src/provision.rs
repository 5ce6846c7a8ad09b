//! Environment preparation applied before any object is created.

use crate::server::ServerExposer;
use tracing::debug;
use ws_core::error::{InfraError, Result};
use ws_model::environment::Environment;
use ws_model::labels::ORIGINAL_NAME_LABEL;

/// Label pods with their declared name and expose every machine's servers.
pub fn provision(env: &mut Environment) -> Result<()> {
    for (name, pod) in env.pods.iter_mut() {
        pod.metadata
            .labels
            .insert(ORIGINAL_NAME_LABEL.to_string(), name.clone());
    }

    let machines: Vec<(String, _)> = env
        .machines
        .iter()
        .filter(|(_, config)| !config.servers.is_empty())
        .map(|(name, config)| (name.clone(), config.servers.clone()))
        .collect();

    for (machine_name, servers) in machines {
        let (pod_name, container_name) = machine_name.split_once('/').ok_or_else(|| {
            InfraError::Internal(format!(
                "Machine name '{}' must have the form <pod>/<container>",
                machine_name
            ))
        })?;
        debug!(machine = %machine_name, servers = servers.len(), "Exposing servers");
        ServerExposer::new(&machine_name, pod_name, container_name, env).expose(&servers)?;
    }
    Ok(())
}
