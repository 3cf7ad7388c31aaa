// rest_api/src/main.rs

// Entry point for the health records REST API server. Wires settings,
// the storage engine and the shutdown signal, then hands off to the
// library's `start_server`.

use anyhow::{Context, Result};
use dotenv::dotenv;
use tokio::sync::oneshot;
use tracing::info;

use rest_api::{load_api_settings, start_server, AppState};
use storage::{create_store, StoreEngineType};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let settings = load_api_settings().context("Failed to load REST API configuration")?;
    let engine: StoreEngineType = settings.storage_engine.parse()?;
    let store = create_store(engine)?;
    let state = AppState::new(store, settings);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down.");
            let _ = shutdown_tx.send(());
        }
    });

    start_server(state, shutdown_rx).await
}
