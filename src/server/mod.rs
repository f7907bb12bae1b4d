// src/server/mod.rs

use crate::config::Config;
use crate::core::state::ServerState;
use anyhow::{Result, anyhow};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::info;

mod connection_loop;
mod context;
mod hooks;
mod initialization;
mod metrics_server;

pub use hooks::{ConnectionHooks, DefaultHooks};

use context::ServerContext;

/// A bound listener plus everything its connections share.
pub struct Server {
    ctx: ServerContext,
}

impl Server {
    /// Binds the listening socket described by `state.config`.
    ///
    /// Failing to bind is a startup error.
    pub async fn bind(state: Arc<ServerState>) -> Result<Self> {
        let addr = state.config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| anyhow!("Failed to bind {}: {}", addr, e))?;
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            ctx: ServerContext {
                state,
                listener,
                shutdown_tx,
                background_tasks: JoinSet::new(),
            },
        })
    }

    /// The address actually bound, which differs from the configured one for port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.ctx.listener.local_addr()
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.ctx.state
    }

    /// Accepts connections until `shutdown` resolves, then closes every
    /// connection and waits for their teardown.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        connection_loop::run(self.ctx, shutdown).await;
    }

    /// Runs until SIGINT or SIGTERM.
    pub async fn run_until_signal(self) -> Result<()> {
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow!("Failed to register SIGINT handler: {}", e))?;
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow!("Failed to register SIGTERM handler: {}", e))?;

        self.run_until(async move {
            tokio::select! {
                _ = sigint.recv() => info!("SIGINT received, initiating graceful shutdown."),
                _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown."),
            }
        })
        .await;
        Ok(())
    }
}

/// The main server startup function, orchestrating all setup phases.
pub async fn run(config: Config) -> Result<()> {
    // 1. Connect to the store, build the shared state and bind the listeners.
    let server = initialization::setup(config).await?;

    // 2. Serve until a termination signal arrives.
    server.run_until_signal().await
}
