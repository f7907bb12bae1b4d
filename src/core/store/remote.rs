// src/core/store/remote.rs

//! A `StoreClient` that forwards to upstream RESP servers.
//!
//! The client keeps a fixed number of pooled connections, each bound to one of
//! the configured endpoints, and hands requests to them round-robin. A pooled
//! connection is opened lazily and thrown away after any transport failure; the
//! next request that lands on that slot reconnects.

use super::StoreClient;
use crate::core::protocol::{RespFrame, RespFrameCodec};
use crate::core::{RespGateError, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

type UpstreamConnection = Framed<TcpStream, RespFrameCodec>;

/// Connection settings for [`RemoteStore`].
#[derive(Debug, Clone)]
pub struct RemoteStoreConfig {
    /// Upstream `host:port` endpoints.
    pub endpoints: Vec<String>,
    pub pool_size: usize,
    /// Per-request deadline. `None` waits as long as the upstream takes.
    pub request_timeout: Option<Duration>,
}

struct PoolSlot {
    endpoint: String,
    conn: Mutex<Option<UpstreamConnection>>,
}

pub struct RemoteStore {
    slots: Vec<PoolSlot>,
    next: AtomicUsize,
    request_timeout: Option<Duration>,
}

impl fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStore")
            .field(
                "endpoints",
                &self.slots.iter().map(|s| &s.endpoint).collect::<Vec<_>>(),
            )
            .field("pool_size", &self.slots.len())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl RemoteStore {
    /// Builds the pool and verifies the upstream answers `PING`.
    ///
    /// Any failure here is a startup error: the gateway must not serve clients
    /// without a reachable backing store.
    pub async fn connect(config: RemoteStoreConfig) -> Result<Self, StoreError> {
        if config.endpoints.is_empty() {
            return Err(StoreError::Unavailable("no store endpoints configured".into()));
        }
        let pool_size = config.pool_size.max(1);
        let slots = (0..pool_size)
            .map(|i| PoolSlot {
                endpoint: config.endpoints[i % config.endpoints.len()].clone(),
                conn: Mutex::new(None),
            })
            .collect();

        let store = Self {
            slots,
            next: AtomicUsize::new(0),
            request_timeout: config.request_timeout,
        };

        match store.request(RespFrame::command(["PING"])).await? {
            RespFrame::SimpleString(s) if s.eq_ignore_ascii_case("PONG") => {}
            RespFrame::Error(e) => return Err(backend_error(e)),
            other => {
                return Err(StoreError::Unavailable(format!(
                    "unexpected reply to PING: {other:?}"
                )));
            }
        }

        info!(
            "Connected to backing store at {} (pool size {}).",
            config.endpoints.join(","),
            pool_size
        );
        Ok(store)
    }

    /// Sends one request on the next pooled connection and waits for its reply.
    async fn request(&self, frame: RespFrame) -> Result<RespFrame, StoreError> {
        let slot = &self.slots[self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len()];
        let mut conn = slot.conn.lock().await;

        let exchange = round_trip(&mut conn, &slot.endpoint, frame);
        let result = match self.request_timeout {
            Some(deadline) => tokio::time::timeout(deadline, exchange)
                .await
                .unwrap_or(Err(StoreError::Timeout)),
            None => exchange.await,
        };

        // After a transport failure or timeout the stream may hold a stale
        // reply, so the connection cannot be reused.
        match &result {
            Err(StoreError::Backend(_)) | Ok(_) => {}
            Err(e) => {
                if conn.take().is_some() {
                    warn!("Dropping upstream connection to {}: {}", slot.endpoint, e);
                }
            }
        }
        result
    }
}

async fn round_trip(
    conn: &mut Option<UpstreamConnection>,
    endpoint: &str,
    frame: RespFrame,
) -> Result<RespFrame, StoreError> {
    if conn.is_none() {
        debug!("Opening upstream connection to {}.", endpoint);
        let socket = TcpStream::connect(endpoint)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{endpoint}: {e}")))?;
        socket.set_nodelay(true)?;
        *conn = Some(Framed::new(socket, RespFrameCodec));
    }
    let framed = conn
        .as_mut()
        .ok_or_else(|| StoreError::Unavailable(endpoint.to_string()))?;

    framed.send(frame).await.map_err(transport_error)?;
    match framed.next().await {
        Some(Ok(reply)) => Ok(reply),
        Some(Err(e)) => Err(transport_error(e)),
        None => Err(StoreError::Io(format!("{endpoint} closed the connection"))),
    }
}

fn transport_error(err: RespGateError) -> StoreError {
    match err {
        RespGateError::Io(e) => StoreError::Io(e.to_string()),
        other => StoreError::Io(other.to_string()),
    }
}

/// Upstream error replies already carry an `ERR ` prefix; the gateway adds its own.
fn backend_error(msg: String) -> StoreError {
    StoreError::Backend(msg.strip_prefix("ERR ").map(str::to_owned).unwrap_or(msg))
}

fn unexpected(command: &str, reply: RespFrame) -> StoreError {
    StoreError::Backend(format!("unexpected reply to {command}: {reply:?}"))
}

#[async_trait]
impl StoreClient for RemoteStore {
    async fn put(&self, key: Bytes, value: Bytes) -> Result<(), StoreError> {
        let request = RespFrame::command([Bytes::from_static(b"SET"), key, value]);
        match self.request(request).await? {
            RespFrame::SimpleString(s) if s == "OK" => Ok(()),
            RespFrame::Error(e) => Err(backend_error(e)),
            other => Err(unexpected("SET", other)),
        }
    }

    async fn get(&self, key: Bytes) -> Result<Option<Bytes>, StoreError> {
        let request = RespFrame::command([Bytes::from_static(b"GET"), key]);
        match self.request(request).await? {
            RespFrame::BulkString(value) => Ok(Some(value)),
            RespFrame::Null => Ok(None),
            RespFrame::Error(e) => Err(backend_error(e)),
            other => Err(unexpected("GET", other)),
        }
    }

    async fn delete(&self, key: Bytes) -> Result<(), StoreError> {
        let request = RespFrame::command([Bytes::from_static(b"DEL"), key]);
        match self.request(request).await? {
            RespFrame::Integer(_) => Ok(()),
            RespFrame::Error(e) => Err(backend_error(e)),
            other => Err(unexpected("DEL", other)),
        }
    }
}
