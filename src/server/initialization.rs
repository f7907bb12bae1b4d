// src/server/initialization.rs

//! Handles server initialization, from connecting to the backing store to
//! binding the listeners.

use super::hooks::DefaultHooks;
use super::{Server, metrics_server};
use crate::config::{Config, StoreBackend};
use crate::core::state::ServerState;
use crate::core::store::{MemoryStore, RemoteStore, RemoteStoreConfig, StoreClient};
use anyhow::{Result, anyhow};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Initializes all server components before starting the main loop.
pub async fn setup(config: Config) -> Result<Server> {
    log_startup_info(&config);

    let store = connect_store(&config).await?;
    let hooks = Arc::new(DefaultHooks::new(config.max_clients));
    let metrics_port = config.metrics.port;
    let state = Arc::new(ServerState::new(config, store, hooks));
    info!("Server state initialized.");

    let mut server = Server::bind(state.clone()).await?;
    info!(
        "respgate listening on {}",
        server.local_addr().map_or_else(|_| state.config.listen_addr(), |a| a.to_string())
    );

    if let Some(port) = metrics_port {
        let listener = TcpListener::bind((state.config.host.as_str(), port))
            .await
            .map_err(|e| anyhow!("Failed to bind metrics server on port {}: {}", port, e))?;
        let shutdown_rx = server.ctx.shutdown_tx.subscribe();
        server
            .ctx
            .background_tasks
            .spawn(metrics_server::run_metrics_server(state, listener, shutdown_rx));
    } else {
        info!("Prometheus metrics server is disabled.");
    }

    Ok(server)
}

/// Builds the configured `StoreClient`. An unreachable store is fatal.
async fn connect_store(config: &Config) -> Result<Arc<dyn StoreClient>> {
    match &config.store.backend {
        StoreBackend::Memory => {
            warn!("Using the in-memory store: data is lost when the gateway stops.");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Remote(endpoints) => {
            let store = RemoteStore::connect(RemoteStoreConfig {
                endpoints: endpoints.clone(),
                pool_size: config.store.pool_size,
                request_timeout: config.store.request_timeout(),
            })
            .await
            .map_err(|e| anyhow!("Failed to reach backing store: {}", e))?;
            Ok(Arc::new(store))
        }
    }
}

fn log_startup_info(config: &Config) {
    info!("Starting respgate v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Max clients: {}, outbound queue: {} frames, idle timeout: {}",
        config.max_clients,
        config.outbound_queue_capacity,
        match config.idle_timeout_secs {
            0 => "disabled".to_string(),
            secs => format!("{secs}s"),
        }
    );
}
