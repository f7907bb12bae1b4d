// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection resource management.

use super::session::ConnectionInfo;
use crate::core::RespGateError;
use crate::core::metrics;
use crate::core::state::ServerState;
use std::sync::Arc;
use tracing::debug;

/// An RAII guard that runs a connection's teardown exactly once.
///
/// It is created as soon as a connection is admitted and owned by the task
/// serving it. Whether that task returns, panics, or is aborted, dropping the
/// guard removes every subscription of the connection from the broker and then
/// reports the closure to the hooks.
pub struct ConnectionGuard {
    state: Arc<ServerState>,
    info: ConnectionInfo,
    /// `None` until the handler records how the connection ended.
    outcome: Option<Option<RespGateError>>,
}

impl ConnectionGuard {
    pub fn new(state: Arc<ServerState>, info: ConnectionInfo) -> Self {
        metrics::CONNECTED_CLIENTS.inc();
        Self {
            state,
            info,
            outcome: None,
        }
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// Records why the connection ended. `None` means a clean close.
    pub fn set_outcome(&mut self, error: Option<RespGateError>) {
        self.outcome = Some(error);
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        metrics::CONNECTED_CLIENTS.dec();

        let removed = self.state.broker.unsubscribe_all(self.info.id);
        debug!(
            "ConnectionGuard dropping for {} ({}), removed {} subscriptions.",
            self.info.id, self.info.addr, removed
        );

        let aborted;
        let error = match &self.outcome {
            Some(outcome) => outcome.as_ref(),
            None => {
                aborted = RespGateError::Internal("connection handler aborted".into());
                Some(&aborted)
            }
        };
        self.state.hooks.on_close(&self.info, error);
    }
}
