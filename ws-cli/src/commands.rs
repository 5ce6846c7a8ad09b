// Command handlers for runtime operations

use crate::cli::{Args, Command};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};
use ws_cluster::ClusterApi;
use ws_model::environment::Environment;
use ws_model::runtime::{Machine, RuntimeIdentity};
use ws_runtime::{
    LoggingEventSink, OpenShiftInfrastructure, RuntimeConfig, RuntimeInfrastructure,
};

/// Main command dispatcher
#[must_use = "command execution results should be handled"]
pub async fn execute_command(
    args: Args,
    api: Arc<dyn ClusterApi>,
    config: RuntimeConfig,
) -> Result<()> {
    match args.command {
        Command::Start {
            environment,
            workspace,
            owner,
            env_name,
        } => {
            debug!("Handling start command");
            let identity = RuntimeIdentity::new(workspace, owner, env_name);
            handle_start(api, config, identity, &environment, shutdown_signal()).await
        }
        Command::Clean {
            workspace,
            remove_project,
        } => {
            debug!("Handling clean command");
            handle_clean(api, config, &workspace, remove_project).await
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C, stopping right away");
    }
}

/// Start the environment, report its machines, then stop it once `shutdown` resolves.
///
/// A shutdown requested while machines are still starting interrupts the start,
/// which removes whatever was already created.
pub async fn handle_start(
    api: Arc<dyn ClusterApi>,
    config: RuntimeConfig,
    identity: RuntimeIdentity,
    environment: &Path,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let content = std::fs::read_to_string(environment)
        .with_context(|| format!("Failed to read environment {}", environment.display()))?;
    let environment = Environment::from_yaml(&content)
        .with_context(|| format!("Invalid environment {}", environment.display()))?;

    let infra = OpenShiftInfrastructure::new(api, config, Arc::new(LoggingEventSink))?;
    let runtime = infra.create_runtime(identity, environment).await?;

    let start = runtime.start();
    tokio::pin!(start);
    tokio::pin!(shutdown);
    let interrupted = tokio::select! {
        result = &mut start => {
            result?;
            false
        }
        () = &mut shutdown => true,
    };

    if interrupted {
        info!(workspace = %runtime.identity().workspace_id, "Shutdown requested during start");
        runtime.interrupt();
        match start.await {
            Err(e) if e.is_interrupted() => {
                println!("Start interrupted, created resources removed");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
            // Start won the race; stop it like a running runtime
            Ok(()) => {
                runtime.stop().await?;
                println!("Runtime stopped");
                return Ok(());
            }
        }
    }

    for line in machine_summary(&runtime.machines()) {
        println!("{}", line);
    }
    println!(
        "Runtime of workspace '{}' is running, press Ctrl-C to stop",
        runtime.identity().workspace_id
    );

    shutdown.await;
    info!(workspace = %runtime.identity().workspace_id, "Shutdown requested");
    runtime.stop().await?;
    println!("Runtime stopped");
    Ok(())
}

pub async fn handle_clean(
    api: Arc<dyn ClusterApi>,
    config: RuntimeConfig,
    workspace: &str,
    remove_project: bool,
) -> Result<()> {
    let infra = OpenShiftInfrastructure::new(api, config, Arc::new(LoggingEventSink))?;
    infra
        .clean(workspace, remove_project)
        .await
        .with_context(|| format!("Failed to clean workspace '{}'", workspace))?;
    println!("Workspace '{}' cleaned", workspace);
    Ok(())
}

/// One line per machine followed by one indented line per server.
pub fn machine_summary(machines: &BTreeMap<String, Machine>) -> Vec<String> {
    let mut lines = Vec::new();
    for (name, machine) in machines {
        lines.push(format!("{} ({:?})", name, machine.status));
        for (server, state) in &machine.servers {
            lines.push(format!("  {}: {}", server, state.url));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use ws_model::runtime::{MachineStatus, Server};

    #[test]
    fn test_machine_summary() {
        let mut servers = BTreeMap::new();
        servers.insert("ide".to_string(), Server::starting("http://ide.example.com/"));
        let mut machines = BTreeMap::new();
        machines.insert(
            "main/dev".to_string(),
            Machine {
                name: "main/dev".to_string(),
                pod_name: "main".to_string(),
                container_name: "dev".to_string(),
                status: MachineStatus::Running,
                servers,
            },
        );

        assert_eq!(
            machine_summary(&machines),
            vec![
                "main/dev (Running)".to_string(),
                "  ide: http://ide.example.com/".to_string(),
            ]
        );
    }
}
