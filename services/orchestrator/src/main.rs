use std::sync::Arc;

use orchestrator::data_source::HttpDataSource;
use orchestrator::ledger_client::HttpLedgerClient;
use orchestrator::{Orchestrator, OrchestratorConfig};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = OrchestratorConfig::from_env();
    tracing::info!(
        ledger = %config.ledger_endpoint,
        operator = %config.ledger_operator_id,
        version = orchestrator::SERVICE_VERSION,
        "Starting aggregation orchestrator"
    );

    let ledger = Arc::new(HttpLedgerClient::new(&config)?);
    let source = Arc::new(HttpDataSource::new(&config)?);
    let orchestrator = Orchestrator::new(ledger, source, config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received, no longer accepting events");
            let _ = shutdown_tx.send(true);
        }
    });

    orchestrator.run(shutdown_rx).await?;

    Ok(())
}
