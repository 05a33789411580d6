//! The node binary: configuration, logging, wiring, shutdown.

use node_runtime::{roles, NodeConfig, SystemContext};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "node.toml".to_string());
    let config = NodeConfig::load(&config_path)?;
    let system = Arc::new(SystemContext::build(&config)?);

    let (ledger_tx, ledger_rx) = roles::ledger_queue();
    let persister = roles::spawn_persister(system.clone(), ledger_rx);
    let timer = roles::spawn_timer(system.clone());

    info!(height = system.blockchain.current_index()?, "node running");

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    drop(ledger_tx);
    timer.abort();
    let _ = persister.await;
    Ok(())
}
