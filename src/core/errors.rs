// src/core/errors.rs

//! Defines the primary error types for the gateway.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing every failure a client connection can observe.
///
/// The `Display` output of each variant is the exact text sent back to the client
/// inside a RESP error reply, so the wording is part of the wire contract.
#[derive(Error, Debug)]
pub enum RespGateError {
    #[error("ERR {0}")]
    Io(Arc<std::io::Error>),

    #[error("ERR incomplete data in stream")]
    IncompleteData,

    #[error("ERR Protocol error: invalid RESP syntax")]
    SyntaxError,

    #[error("ERR Protocol error: {0}")]
    Protocol(String),

    #[error("ERR empty command")]
    EmptyCommand,

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArgumentCount(String),

    #[error(
        "ERR Can't execute '{0}': only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT are allowed in this context"
    )]
    NotAllowedInSubscriberMode(String),

    #[error("ERR {0}")]
    Store(#[from] StoreError),

    #[error("ERR slow subscriber: outbound queue is full")]
    SlowSubscriber,

    #[error("ERR internal error: {0}")]
    Internal(String),
}

/// Failures reported by a `StoreClient` implementation.
///
/// The core never retries on these; they are surfaced to the issuing client as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Backend(String),

    #[error("store I/O error: {0}")]
    Io(String),

    #[error("store request timed out")]
    Timeout,
}

// `std::io::Error` is not cloneable, so it is shared behind an `Arc`.
impl Clone for RespGateError {
    fn clone(&self) -> Self {
        match self {
            RespGateError::Io(e) => RespGateError::Io(Arc::clone(e)),
            RespGateError::IncompleteData => RespGateError::IncompleteData,
            RespGateError::SyntaxError => RespGateError::SyntaxError,
            RespGateError::Protocol(s) => RespGateError::Protocol(s.clone()),
            RespGateError::EmptyCommand => RespGateError::EmptyCommand,
            RespGateError::UnknownCommand(s) => RespGateError::UnknownCommand(s.clone()),
            RespGateError::WrongArgumentCount(s) => RespGateError::WrongArgumentCount(s.clone()),
            RespGateError::NotAllowedInSubscriberMode(s) => {
                RespGateError::NotAllowedInSubscriberMode(s.clone())
            }
            RespGateError::Store(e) => RespGateError::Store(e.clone()),
            RespGateError::SlowSubscriber => RespGateError::SlowSubscriber,
            RespGateError::Internal(s) => RespGateError::Internal(s.clone()),
        }
    }
}

impl PartialEq for RespGateError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RespGateError::Io(e1), RespGateError::Io(e2)) => e1.to_string() == e2.to_string(),
            (RespGateError::Protocol(s1), RespGateError::Protocol(s2)) => s1 == s2,
            (RespGateError::UnknownCommand(s1), RespGateError::UnknownCommand(s2)) => s1 == s2,
            (RespGateError::WrongArgumentCount(s1), RespGateError::WrongArgumentCount(s2)) => {
                s1 == s2
            }
            (
                RespGateError::NotAllowedInSubscriberMode(s1),
                RespGateError::NotAllowedInSubscriberMode(s2),
            ) => s1 == s2,
            (RespGateError::Store(e1), RespGateError::Store(e2)) => e1 == e2,
            (RespGateError::Internal(s1), RespGateError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl RespGateError {
    /// Returns true for transport failures that simply mean the peer went away.
    pub fn is_normal_disconnect(&self) -> bool {
        matches!(self, RespGateError::Io(err) if matches!(
            err.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionAborted
        ))
    }
}

impl From<std::io::Error> for RespGateError {
    fn from(e: std::io::Error) -> Self {
        RespGateError::Io(Arc::new(e))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}
