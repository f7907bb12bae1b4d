// src/server/hooks.rs

//! Admission and closure hooks invoked around every connection's lifetime.

use crate::connection::ConnectionInfo;
use crate::core::RespGateError;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

/// Policy and observability extension points.
///
/// `on_accept` runs before a handler is spawned; returning `false` closes the
/// connection immediately. `on_close` runs exactly once for every admitted
/// connection, after its subscriptions have been removed, with the error that
/// ended it (if any).
pub trait ConnectionHooks: Send + Sync + 'static {
    fn on_accept(&self, info: &ConnectionInfo) -> bool;
    fn on_close(&self, info: &ConnectionInfo, error: Option<&RespGateError>);
}

/// Logs connection lifecycle events and enforces the client limit.
#[derive(Debug)]
pub struct DefaultHooks {
    max_clients: usize,
    active: AtomicUsize,
}

impl DefaultHooks {
    pub fn new(max_clients: usize) -> Self {
        Self {
            max_clients,
            active: AtomicUsize::new(0),
        }
    }

    /// Admitted connections that have not closed yet.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

impl ConnectionHooks for DefaultHooks {
    fn on_accept(&self, info: &ConnectionInfo) -> bool {
        let admitted = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_clients).then_some(n + 1)
            })
            .is_ok();
        if admitted {
            info!("Accepted new connection {} from: {}", info.id, info.addr);
        } else {
            warn!(
                "Rejecting connection from {}: max clients ({}) reached.",
                info.addr, self.max_clients
            );
        }
        admitted
    }

    fn on_close(&self, info: &ConnectionInfo, error: Option<&RespGateError>) {
        self.active.fetch_sub(1, Ordering::AcqRel);
        let lifetime = info.connected_at.elapsed();
        match error {
            Some(e) if !e.is_normal_disconnect() => {
                warn!(
                    "Connection {} from {} closed with error after {:?}: {}",
                    info.id,
                    info.remote_addr(),
                    lifetime,
                    e
                );
            }
            _ => info!(
                "Connection {} from {} closed after {:?}.",
                info.id,
                info.remote_addr(),
                lifetime
            ),
        }
    }
}
