// src/connection/outbound.rs

//! The bounded per-connection outbound queue and its dedicated writer task.
//!
//! Every frame a connection emits (command replies and published messages
//! alike) travels through one `mpsc` queue, so the client observes them in a
//! single total order. The broker only ever holds a `WeakSender`: it can push
//! while the connection is alive but never keeps the queue open on its own.

use super::session::ConnectionId;
use crate::core::RespGateError;
use crate::core::protocol::{RespFrame, RespFrameCodec};
use futures::SinkExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::FramedWrite;
use tracing::debug;

/// What happened to a frame offered to a connection without waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The frame is queued for the writer task.
    Queued,
    /// The queue was full. The connection has been told to disconnect.
    Overflow,
    /// The connection is already closing; nothing was queued.
    Closed,
}

/// A cheap, cloneable back reference to a live connection.
///
/// This is what the broker stores in its subscription tables. It never owns the
/// connection's lifecycle.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbound: mpsc::WeakSender<RespFrame>,
    kill: broadcast::Sender<()>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Offers a frame to the connection without blocking the caller.
    ///
    /// A full queue means the client is not keeping up; the overflow policy is to
    /// disconnect it rather than drop messages silently.
    pub fn push(&self, frame: RespFrame) -> PushOutcome {
        let Some(tx) = self.outbound.upgrade() else {
            return PushOutcome::Closed;
        };
        match tx.try_send(frame) {
            Ok(()) => PushOutcome::Queued,
            Err(TrySendError::Full(_)) => {
                self.kill();
                PushOutcome::Overflow
            }
            Err(TrySendError::Closed(_)) => PushOutcome::Closed,
        }
    }

    /// Asks the owning handler to close the connection.
    pub fn kill(&self) {
        // No receiver means the handler is already gone.
        let _ = self.kill.send(());
    }
}

/// Room reserved in a connection's queue for one of its own replies.
///
/// Filling a slot never fails and never waits, so it can be done while the
/// broker holds its lock.
#[derive(Debug)]
pub struct ReplySlot<'a>(mpsc::Permit<'a, RespFrame>);

impl ReplySlot<'_> {
    pub fn fill(self, frame: RespFrame) {
        self.0.send(frame);
    }
}

/// The handler's side of the queue: replies go in here, and the kill switch
/// fired by the broker is observed here.
#[derive(Debug)]
pub struct ReplyQueue {
    tx: mpsc::Sender<RespFrame>,
    kill_rx: broadcast::Receiver<()>,
}

impl ReplyQueue {
    /// Queues a reply behind anything already waiting for this client.
    ///
    /// A full queue back-pressures only this connection, unless the broker
    /// decides the client is too slow and fires the kill switch meanwhile.
    pub async fn send(&mut self, frame: RespFrame) -> Result<(), RespGateError> {
        tokio::select! {
            res = self.tx.send(frame) => res.map_err(|_| queue_closed()),
            _ = self.kill_rx.recv() => Err(RespGateError::SlowSubscriber),
        }
    }

    /// Waits for room for one reply, with the same rules as [`ReplyQueue::send`].
    pub async fn reserve(&mut self) -> Result<ReplySlot<'_>, RespGateError> {
        tokio::select! {
            res = self.tx.reserve() => res.map(ReplySlot).map_err(|_| queue_closed()),
            _ = self.kill_rx.recv() => Err(RespGateError::SlowSubscriber),
        }
    }

    /// Reserves room only if some is free right now.
    pub fn try_reserve(&self) -> Option<ReplySlot<'_>> {
        self.tx.try_reserve().ok().map(ReplySlot)
    }

    /// Queues a frame if there is room, dropping it otherwise.
    pub fn try_send(&self, frame: RespFrame) -> bool {
        self.tx.try_send(frame).is_ok()
    }

    /// Resolves once the kill switch of this connection fires.
    pub async fn killed(&mut self) {
        // A lagged receiver also means the switch fired.
        let _ = self.kill_rx.recv().await;
    }

    /// Returns true once the kill switch of this connection has fired.
    pub fn is_killed(&mut self) -> bool {
        self.kill_rx.try_recv().is_ok()
    }
}

fn queue_closed() -> RespGateError {
    RespGateError::Internal("outbound queue closed".into())
}

/// Both ends of a connection's outbound queue, as handed to its owner.
///
/// The handler keeps `replies` and gives `rx` to the writer task.
#[derive(Debug)]
pub struct OutboundQueue {
    pub replies: ReplyQueue,
    pub rx: mpsc::Receiver<RespFrame>,
}

impl OutboundQueue {
    /// Takes the next queued frame, if any.
    pub fn try_recv(&mut self) -> Option<RespFrame> {
        self.rx.try_recv().ok()
    }

    pub fn is_killed(&mut self) -> bool {
        self.replies.is_killed()
    }

    pub async fn send(&mut self, frame: RespFrame) -> Result<(), RespGateError> {
        self.replies.send(frame).await
    }

    pub fn try_reserve(&self) -> Option<ReplySlot<'_>> {
        self.replies.try_reserve()
    }
}

/// Creates the queue for a new connection together with the handle the broker will see.
pub fn outbound_channel(id: ConnectionId, capacity: usize) -> (ConnectionHandle, OutboundQueue) {
    let (tx, rx) = mpsc::channel(capacity);
    let (kill, kill_rx) = broadcast::channel(1);
    let handle = ConnectionHandle {
        id,
        outbound: tx.downgrade(),
        kill,
    };
    let replies = ReplyQueue { tx, kill_rx };
    (handle, OutboundQueue { replies, rx })
}

/// Drains the queue into the socket until every strong sender is gone.
///
/// Frames are fed in batches and flushed whenever the queue runs dry, so a burst
/// of published messages costs one syscall rather than one per frame.
pub async fn run_writer<W>(
    id: ConnectionId,
    mut rx: mpsc::Receiver<RespFrame>,
    writer: W,
) -> Result<(), RespGateError>
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, RespFrameCodec);
    while let Some(frame) = rx.recv().await {
        sink.feed(frame).await?;
        while let Ok(frame) = rx.try_recv() {
            sink.feed(frame).await?;
        }
        sink.flush().await?;
    }
    debug!("Connection {}: outbound queue drained, closing write half.", id);
    sink.get_mut().shutdown().await?;
    Ok(())
}
