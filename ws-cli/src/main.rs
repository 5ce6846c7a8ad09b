use anyhow::Result;
use clap::Parser;
use tracing::info;
use ws_cli::{execute_command, Args};
use ws_cluster::{get_cluster, ClusterConfig};
use ws_runtime::RuntimeConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug {
        "ws_cli=debug,ws_runtime=debug,ws_cluster=debug"
    } else {
        "ws_cli=info,ws_runtime=info,ws_cluster=warn"
    };
    ws_core::tracing_init::init_with_defaults(default_filter)?;

    let cluster_config = ClusterConfig::from_env();
    let runtime_config = RuntimeConfig::from_env();
    info!(api_url = %cluster_config.api_url, "Configuration loaded");

    let api = get_cluster(&cluster_config)?;
    execute_command(args, api, runtime_config).await
}
