use clap::Parser;
use mesh_swarm::cli::{Cli, CliController};
use mesh_swarm::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    logging::init(&config.logging)?;

    // Setup Ctrl+C handler
    let (tx, rx) = tokio::sync::mpsc::channel(1);
    ctrlc::set_handler(move || {
        let _ = tx.blocking_send(());
    })?;

    tracing::info!(
        interval = config.mesh.heartbeat_interval_secs,
        nodes = config.mesh.initial_nodes,
        "Starting mesh"
    );

    let controller = CliController::new(&config);
    controller.run(config.mesh.initial_nodes, rx).await?;

    Ok(())
}
