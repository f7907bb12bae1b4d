// src/core/handler/command_router.rs

//! The central component for routing parsed commands to their handlers.
//!
//! The `Router` receives a parsed `Command` from the `ConnectionHandler`,
//! applies the subscriber-mode gate, and dispatches either to the store
//! forwarders or to the pub/sub broker.

use super::actions;
use crate::connection::{ConnectionHandle, ConnectionInfo, ReplyQueue, SessionState};
use crate::core::metrics;
use crate::core::state::ServerState;
use crate::core::{Command, RespGateError, RespValue};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, info_span};

/// Represents the reply shapes a command can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteResponse {
    /// A single RESP value. This is the most common response type.
    Single(RespValue),
    /// Multiple RESP values, sent sequentially. Used by `UNSUBSCRIBE`.
    Multiple(Vec<RespValue>),
    /// Nothing to send; the replies were already queued through the `ReplyQueue`.
    NoOp,
}

/// The `Router` directs one connection's commands to their handlers.
pub struct Router<'a> {
    state: Arc<ServerState>,
    info: &'a ConnectionInfo,
    conn: &'a ConnectionHandle,
    session: &'a mut SessionState,
    replies: &'a mut ReplyQueue,
}

impl<'a> Router<'a> {
    pub fn new(
        state: Arc<ServerState>,
        info: &'a ConnectionInfo,
        conn: &'a ConnectionHandle,
        session: &'a mut SessionState,
        replies: &'a mut ReplyQueue,
    ) -> Self {
        Self {
            state,
            info,
            conn,
            session,
            replies,
        }
    }

    /// Routes a single command and records its latency.
    pub async fn route(&mut self, command: Command) -> Result<RouteResponse, RespGateError> {
        let command_name = command.name();
        let span = info_span!(
            "command",
            name = %command_name,
            client.addr = %self.info.addr,
            client.id = %self.info.id,
        );

        async move {
            let start_time = Instant::now();
            self.session.commands_processed += 1;
            metrics::COMMANDS_PROCESSED_TOTAL.inc();

            let result = if self.session.is_subscriber() {
                self.handle_subscriber_command(command).await
            } else {
                self.handle_normal_command(command).await
            };

            metrics::COMMAND_LATENCY_SECONDS.observe(start_time.elapsed().as_secs_f64());
            result
        }
        .instrument(span)
        .await
    }

    /// Only the pub/sub control commands, `PING` and `QUIT` are accepted while
    /// the connection holds subscriptions.
    async fn handle_subscriber_command(
        &mut self,
        command: Command,
    ) -> Result<RouteResponse, RespGateError> {
        if !command.command_name().allowed_in_subscriber_mode() {
            return Err(RespGateError::NotAllowedInSubscriberMode(
                command.name().to_string(),
            ));
        }
        match command {
            Command::Ping => Ok(RouteResponse::Single(RespValue::Array(vec![
                RespValue::BulkString(Bytes::from_static(b"pong")),
                RespValue::BulkString(Bytes::new()),
            ]))),
            cmd => self.handle_normal_command(cmd).await,
        }
    }

    async fn handle_normal_command(
        &mut self,
        command: Command,
    ) -> Result<RouteResponse, RespGateError> {
        let state = self.state.clone();
        let broker = &state.broker;

        match command {
            Command::Ping => Ok(RouteResponse::Single(RespValue::SimpleString(
                "PONG".into(),
            ))),
            Command::Quit => Ok(RouteResponse::Single(RespValue::ok())),

            // Key/value commands are forwarded to the store as-is.
            Command::Set { key, value } => {
                actions::store::handle_set(state.store.as_ref(), key, value).await
            }
            Command::Get { key } => actions::store::handle_get(state.store.as_ref(), key).await,
            Command::Del { key } => actions::store::handle_del(state.store.as_ref(), key).await,

            // Pub/Sub commands (transition the connection into/out of subscriber mode).
            Command::Publish { channel, message } => {
                actions::pubsub::handle_publish(broker, channel, message)
            }
            Command::Subscribe { channels } => {
                actions::pubsub::handle_subscribe(
                    channels,
                    self.session,
                    broker,
                    self.conn,
                    self.replies,
                )
                .await
            }
            Command::PSubscribe { patterns } => {
                actions::pubsub::handle_psubscribe(
                    patterns,
                    self.session,
                    broker,
                    self.conn,
                    self.replies,
                )
                .await
            }
            Command::Unsubscribe { channels } => {
                actions::pubsub::handle_unsubscribe(channels, self.session, broker, self.conn)
            }
            Command::PUnsubscribe { patterns } => {
                actions::pubsub::handle_punsubscribe(patterns, self.session, broker, self.conn)
            }
        }
    }
}
