// src/connection/session.rs

//! Defines the identity and per-session state of a client connection.

use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

/// A process-unique connection identifier. This is the key the broker uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Immutable facts about a connection, handed to the admission and closure hooks.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    pub connected_at: Instant,
}

impl ConnectionInfo {
    pub fn new(id: ConnectionId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
        }
    }

    /// The stable address string identifying the peer.
    pub fn remote_addr(&self) -> String {
        self.addr.to_string()
    }
}

/// The two dispatch modes of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    /// Any recognized command may be issued.
    #[default]
    Normal,
    /// The connection holds at least one subscription and receives pushed messages.
    Subscriber,
}

/// Holds the state specific to a single client session.
#[derive(Debug, Default)]
pub struct SessionState {
    pub mode: SessionMode,
    /// Number of commands dispatched on this connection.
    pub commands_processed: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_subscriber(&self) -> bool {
        self.mode == SessionMode::Subscriber
    }

    /// Switches mode based on the connection's remaining subscription count.
    pub fn update_subscriptions(&mut self, count: usize) {
        self.mode = if count > 0 {
            SessionMode::Subscriber
        } else {
            SessionMode::Normal
        };
    }
}
