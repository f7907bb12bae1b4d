// src/lib.rs

pub mod config;
pub mod connection;
pub mod core;
pub mod server;

// Re-export
pub use crate::core::pubsub::Broker;
pub use crate::core::store::{MemoryStore, RemoteStore, StoreClient};
pub use crate::server::Server;
