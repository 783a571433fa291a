use std::sync::Arc;

use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use seqd::api::{start_server, AppState, ServerConfig};
use seqd::contracts::{SeqdError, SequenceStore};
use seqd::storage::{MemorySequenceStore, RocksDbConfig, RocksDbSequenceStore};

#[tokio::main]
async fn main() -> Result<(), SeqdError> {
    let directive = "seqd=info"
        .parse::<Directive>()
        .map_err(|e| SeqdError::Config(e.to_string()))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .init();

    tracing::info!("seqd starting...");

    let store_config = RocksDbConfig::from_env().map_err(SeqdError::Config)?;
    let server_config = ServerConfig::from_env();
    let store_kind = std::env::var("SEQD_STORE").unwrap_or_else(|_| "rocksdb".into());

    match store_kind.to_ascii_lowercase().as_str() {
        "rocksdb" => {
            let data_dir = std::env::var("SEQD_DATA_DIR").unwrap_or_else(|_| "./data".into());
            let store = RocksDbSequenceStore::open_with_config(&data_dir, store_config)?;
            let existing = store.list_sequences()?.len();
            tracing::info!(
                data_dir = %data_dir,
                sequences = existing,
                sync_writes = store.config().sync_writes,
                create_policy = %store.create_policy(),
                "Opened RocksDB sequence store"
            );
            serve(server_config, store).await
        }
        "memory" => {
            tracing::warn!("Using in-memory sequence store; values are lost on exit");
            let store = MemorySequenceStore::with_policy(store_config.create_policy);
            serve(server_config, store).await
        }
        other => Err(SeqdError::Config(format!(
            "unknown SEQD_STORE '{}', expected 'rocksdb' or 'memory'",
            other
        ))),
    }
}

async fn serve<S: SequenceStore + 'static>(
    config: ServerConfig,
    store: S,
) -> Result<(), SeqdError> {
    let state = Arc::new(AppState::new(Arc::new(store)));

    start_server(config, state, shutdown_signal()).await?;

    tracing::info!("seqd stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
