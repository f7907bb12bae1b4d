// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a client connection.

use super::guard::ConnectionGuard;
use super::outbound::{ConnectionHandle, OutboundQueue, ReplyQueue, outbound_channel, run_writer};
use super::session::{ConnectionId, SessionState};
use crate::core::handler::command_router::{RouteResponse, Router};
use crate::core::protocol::{RespFrame, RespFrameCodec};
use crate::core::state::ServerState;
use crate::core::{Command, RespGateError};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

/// How long a closing connection may take to flush what is still queued.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The next step for the connection's main loop to take.
enum NextAction {
    Continue,
    ExitLoop,
}

/// Manages the full lifecycle of a client connection.
///
/// The handler owns the read half of the socket. The write half belongs to a
/// writer task draining the connection's outbound queue, which is shared with
/// the broker through a [`ConnectionHandle`].
pub struct ConnectionHandler {
    reader: FramedRead<OwnedReadHalf, RespFrameCodec>,
    writer: JoinHandle<Result<(), RespGateError>>,
    writer_done: bool,
    replies: ReplyQueue,
    handle: ConnectionHandle,
    state: Arc<ServerState>,
    guard: ConnectionGuard,
    shutdown_rx: broadcast::Receiver<()>,
    session: SessionState,
    last_activity: Instant,
}

impl ConnectionHandler {
    /// Creates a new `ConnectionHandler` and starts its writer task.
    pub fn new(
        socket: TcpStream,
        guard: ConnectionGuard,
        state: Arc<ServerState>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let id = guard.info().id;
        if let Err(e) = socket.set_nodelay(true) {
            debug!("Connection {}: failed to set TCP_NODELAY: {}", id, e);
        }
        let (read_half, write_half) = socket.into_split();
        let (handle, OutboundQueue { replies, rx }) =
            outbound_channel(id, state.config.outbound_queue_capacity);
        let writer = tokio::spawn(run_writer(id, rx, write_half));

        Self {
            reader: FramedRead::new(read_half, RespFrameCodec),
            writer,
            writer_done: false,
            replies,
            handle,
            state,
            guard,
            shutdown_rx,
            session: SessionState::new(),
            last_activity: Instant::now(),
        }
    }

    /// Serves the connection until it closes, then tears it down.
    pub async fn run(mut self) {
        let result = self.serve().await;
        let id = self.guard.info().id;

        let Self {
            writer,
            writer_done,
            replies,
            session,
            mut guard,
            ..
        } = self;

        // Dropping the last strong sender lets the writer finish once the
        // queue is empty.
        drop(replies);
        let error = result.err();
        if !writer_done {
            if matches!(error, Some(RespGateError::SlowSubscriber)) {
                writer.abort();
            } else {
                drain_writer(id, writer).await;
            }
        }

        debug!(
            "Connection {}: served {} commands.",
            id, session.commands_processed
        );
        guard.set_outcome(error);
    }

    /// The main event loop for the connection, handling incoming frames and signals.
    async fn serve(&mut self) -> Result<(), RespGateError> {
        let idle_timeout = self.state.config.idle_timeout();
        loop {
            let idle_deadline = match idle_timeout {
                Some(t) if !self.session.is_subscriber() => Some(self.last_activity + t),
                _ => None,
            };

            tokio::select! {
                // Prioritize shutdown signals over other events.
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!("Connection handler for {} received shutdown signal.", self.guard.info().addr);
                    let shutdown_msg = RespFrame::Error("SHUTDOWN server is shutting down".to_string());
                    self.replies.try_send(shutdown_msg);
                    return Ok(());
                }
                _ = self.replies.killed() => {
                    return Err(RespGateError::SlowSubscriber);
                }
                res = &mut self.writer, if !self.writer_done => {
                    self.writer_done = true;
                    return match res {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => Err(e),
                        Err(e) => Err(RespGateError::Internal(format!("writer task failed: {e}"))),
                    };
                }
                _ = idle_expiry(idle_deadline) => {
                    debug!("Connection {} idle for too long, closing.", self.guard.info().id);
                    return Ok(());
                }
                result = self.reader.next() => {
                    match result {
                        Some(Ok(frame)) => {
                            self.last_activity = Instant::now();
                            debug!("Connection {}: Received frame: {:?}", self.guard.info().id, frame);
                            if let NextAction::ExitLoop = self.process_frame(frame).await? {
                                return Ok(());
                            }
                        }
                        Some(Err(e @ RespGateError::Io(_))) => {
                            if e.is_normal_disconnect() {
                                debug!("Connection from {} closed by peer: {}", self.guard.info().addr, e);
                            }
                            return Err(e);
                        }
                        Some(Err(e)) => {
                            // The byte stream cannot be resynchronized after a framing error.
                            warn!("Protocol error from {}: {}", self.guard.info().addr, e);
                            let _ = self.replies.send(RespFrame::Error(e.to_string())).await;
                            return Err(e);
                        }
                        None => {
                            debug!("Connection from {} closed by peer.", self.guard.info().addr);
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Parses a RESP frame, routes it as a command, and queues the response.
    async fn process_frame(&mut self, frame: RespFrame) -> Result<NextAction, RespGateError> {
        let command = match Command::try_from(frame) {
            Ok(command) => command,
            Err(e) => {
                self.replies.send(RespFrame::Error(e.to_string())).await?;
                return Ok(NextAction::Continue);
            }
        };
        debug!(
            "Connection {}: Received command: {}",
            self.guard.info().id,
            command.name()
        );
        let is_quit = matches!(command, Command::Quit);

        let mut router = Router::new(
            self.state.clone(),
            self.guard.info(),
            &self.handle,
            &mut self.session,
            &mut self.replies,
        );
        let route_response = router.route(command).await;

        match route_response {
            Ok(RouteResponse::Single(response)) => self.replies.send(response.into()).await?,
            Ok(RouteResponse::Multiple(responses)) => {
                for response in responses {
                    self.replies.send(response.into()).await?;
                }
            }
            Ok(RouteResponse::NoOp) => {}
            // The kill switch fired while a reply was waiting for room.
            Err(e @ RespGateError::SlowSubscriber) => return Err(e),
            Err(e) => {
                debug!(
                    "Connection {}: Sending error response: {}",
                    self.guard.info().id,
                    e
                );
                self.replies.send(RespFrame::Error(e.to_string())).await?;
            }
        }

        if is_quit {
            Ok(NextAction::ExitLoop)
        } else {
            Ok(NextAction::Continue)
        }
    }
}

async fn idle_expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn drain_writer(
    id: ConnectionId,
    mut writer: JoinHandle<Result<(), RespGateError>>,
) {
    match timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => {
            if !e.is_normal_disconnect() {
                warn!("Connection {}: writer failed while draining: {}", id, e);
            }
        }
        Ok(Err(e)) => warn!("Connection {}: writer task failed: {}", id, e),
        Err(_) => {
            warn!("Connection {}: timed out flushing queued replies.", id);
            writer.abort();
        }
    }
}
