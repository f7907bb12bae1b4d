// src/core/state/mod.rs

//! Defines the central `ServerState` shared by the accept loop and every
//! connection handler.

use crate::config::Config;
use crate::core::pubsub::Broker;
use crate::core::store::StoreClient;
use crate::server::ConnectionHooks;
use std::fmt;
use std::sync::Arc;

/// Everything a connection needs to serve commands.
///
/// Built once at startup and passed down explicitly, so tests can plug in
/// their own store or hooks.
pub struct ServerState {
    pub config: Config,
    pub store: Arc<dyn StoreClient>,
    pub broker: Broker,
    pub hooks: Arc<dyn ConnectionHooks>,
}

impl ServerState {
    pub fn new(
        config: Config,
        store: Arc<dyn StoreClient>,
        hooks: Arc<dyn ConnectionHooks>,
    ) -> Self {
        Self {
            config,
            store,
            broker: Broker::new(),
            hooks,
        }
    }
}

impl fmt::Debug for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerState")
            .field("config", &self.config)
            .field("broker", &self.broker)
            .finish_non_exhaustive()
    }
}
