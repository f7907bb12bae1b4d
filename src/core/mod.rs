// src/core/mod.rs

//! The central module containing the core logic and data structures of the gateway.

pub mod commands;
pub mod errors;
pub mod handler;
pub mod metrics;
pub mod protocol;
pub mod pubsub;
pub mod state;
pub mod store;

pub use commands::Command;
pub use errors::{RespGateError, StoreError};
pub use protocol::RespValue;
