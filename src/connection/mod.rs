// src/connection/mod.rs

//! Manages the lifecycle of a single client TCP connection, including command
//! parsing, execution routing, outbound delivery and session state.

mod guard;
mod handler;
mod outbound;
mod session;

pub use guard::ConnectionGuard;
pub use handler::ConnectionHandler;
pub use outbound::{
    ConnectionHandle, OutboundQueue, PushOutcome, ReplyQueue, ReplySlot, outbound_channel,
    run_writer,
};
pub use session::{ConnectionId, ConnectionInfo, SessionMode, SessionState};
