// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests.
//!
//! `TestServer` runs a real gateway on an ephemeral port; `TestClient` talks to
//! it over TCP with the gateway's own codec.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use respgate::config::Config;
use respgate::connection::{ConnectionId, ConnectionInfo};
use respgate::core::RespGateError;
use respgate::core::StoreError;
use respgate::core::protocol::{RespFrame, RespFrameCodec};
use respgate::core::state::ServerState;
use respgate::core::store::{MemoryStore, StoreClient};
use respgate::server::{ConnectionHooks, DefaultHooks, Server};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

fn init_tracing() {
    // Ignore the error if another test already installed a subscriber.
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("warn"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// A configuration bound to an ephemeral localhost port.
pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Config::default()
    }
}

/// A running gateway instance.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Starts a gateway backed by an in-memory store.
    pub async fn start() -> Self {
        Self::with_store(Arc::new(MemoryStore::new())).await
    }

    pub async fn with_store(store: Arc<dyn StoreClient>) -> Self {
        let config = test_config();
        let hooks = Arc::new(DefaultHooks::new(config.max_clients));
        Self::with_parts(config, store, hooks).await
    }

    pub async fn with_config(config: Config) -> Self {
        let hooks = Arc::new(DefaultHooks::new(config.max_clients));
        Self::with_parts(config, Arc::new(MemoryStore::new()), hooks).await
    }

    pub async fn with_hooks(hooks: Arc<dyn ConnectionHooks>) -> Self {
        Self::with_parts(test_config(), Arc::new(MemoryStore::new()), hooks).await
    }

    pub async fn with_parts(
        config: Config,
        store: Arc<dyn StoreClient>,
        hooks: Arc<dyn ConnectionHooks>,
    ) -> Self {
        init_tracing();
        let state = Arc::new(ServerState::new(config, store, hooks));
        let server = Server::bind(state.clone())
            .await
            .expect("Failed to bind test server");
        let addr = server.local_addr().expect("Failed to read local address");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(async move {
            let _ = shutdown_rx.await;
        }));

        Self {
            addr,
            state,
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    pub async fn connect(&self) -> TestClient {
        TestClient::connect(self.addr).await
    }

    /// Triggers a graceful shutdown and waits for the accept loop to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(Duration::from_secs(15), &mut self.task)
            .await
            .expect("server did not shut down in time")
            .expect("server task panicked");
    }

    /// Waits until the broker no longer tracks any subscription.
    pub async fn wait_for_empty_broker(&self) {
        let broker = &self.state.broker;
        wait_until(|| {
            broker.subscribed_connection_count() == 0
                && broker.channel_count() == 0
                && broker.pattern_count() == 0
        })
        .await;
    }
}

/// Polls `condition` until it holds, failing the test after a few seconds.
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    let deadline = tokio::time::Instant::now() + READ_TIMEOUT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A RESP client speaking to a `TestServer`.
pub struct TestClient {
    framed: Framed<TcpStream, RespFrameCodec>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let socket = TcpStream::connect(addr)
            .await
            .expect("Failed to connect to test server");
        Self {
            framed: Framed::new(socket, RespFrameCodec),
        }
    }

    pub async fn send(&mut self, parts: &[&str]) {
        let frame = RespFrame::command(parts.iter().map(|p| Bytes::copy_from_slice(p.as_bytes())));
        self.send_frame(frame).await;
    }

    pub async fn send_frame(&mut self, frame: RespFrame) {
        self.framed.send(frame).await.expect("Failed to send frame");
    }

    /// Writes bytes straight to the socket, bypassing the encoder.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        let socket = self.framed.get_mut();
        socket.write_all(bytes).await.expect("Failed to write");
        socket.flush().await.expect("Failed to flush");
    }

    /// Reads the next frame, failing the test on timeout or disconnect.
    pub async fn read(&mut self) -> RespFrame {
        match tokio::time::timeout(READ_TIMEOUT, self.framed.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => panic!("read failed: {e}"),
            Ok(None) => panic!("connection closed unexpectedly"),
            Err(_) => panic!("timed out waiting for a frame"),
        }
    }

    /// Sends a command and returns its reply.
    pub async fn command(&mut self, parts: &[&str]) -> RespFrame {
        self.send(parts).await;
        self.read().await
    }

    /// Returns true if the server closes the connection before sending anything else.
    pub async fn is_closed(&mut self) -> bool {
        matches!(
            tokio::time::timeout(READ_TIMEOUT, self.framed.next()).await,
            Ok(None) | Ok(Some(Err(_)))
        )
    }

    /// Asserts that nothing arrives within `wait`.
    pub async fn expect_silence(&mut self, wait: Duration) {
        if let Ok(frame) = tokio::time::timeout(wait, self.framed.next()).await {
            panic!("expected no frame, got {frame:?}");
        }
    }
}

pub fn bulk(s: &str) -> RespFrame {
    RespFrame::BulkString(Bytes::copy_from_slice(s.as_bytes()))
}

pub fn simple(s: &str) -> RespFrame {
    RespFrame::SimpleString(s.to_string())
}

pub fn error(s: &str) -> RespFrame {
    RespFrame::Error(s.to_string())
}

pub fn ack(kind: &str, name: Option<&str>, count: i64) -> RespFrame {
    RespFrame::Array(vec![
        bulk(kind),
        name.map_or(RespFrame::Null, bulk),
        RespFrame::Integer(count),
    ])
}

pub fn message(channel: &str, payload: &str) -> RespFrame {
    RespFrame::Array(vec![bulk("message"), bulk(channel), bulk(payload)])
}

pub fn pmessage(pattern: &str, channel: &str, payload: &str) -> RespFrame {
    RespFrame::Array(vec![
        bulk("pmessage"),
        bulk(pattern),
        bulk(channel),
        bulk(payload),
    ])
}

/// A store that counts every call before delegating to an in-memory map.
#[derive(Debug, Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    pub calls: AtomicUsize,
}

impl RecordingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreClient for RecordingStore {
    async fn put(&self, key: Bytes, value: Bytes) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, value).await
    }

    async fn get(&self, key: Bytes) -> Result<Option<Bytes>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn delete(&self, key: Bytes) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }
}

/// A store whose every call fails with the given error.
#[derive(Debug)]
pub struct FailingStore(pub StoreError);

#[async_trait]
impl StoreClient for FailingStore {
    async fn put(&self, _key: Bytes, _value: Bytes) -> Result<(), StoreError> {
        Err(self.0.clone())
    }

    async fn get(&self, _key: Bytes) -> Result<Option<Bytes>, StoreError> {
        Err(self.0.clone())
    }

    async fn delete(&self, _key: Bytes) -> Result<(), StoreError> {
        Err(self.0.clone())
    }
}

/// Hooks that remember every accept and close.
#[derive(Debug, Default)]
pub struct RecordingHooks {
    pub reject: AtomicBool,
    pub accepted: Mutex<Vec<ConnectionInfo>>,
    pub closed: Mutex<Vec<(ConnectionId, Option<String>)>>,
}

impl RecordingHooks {
    pub fn rejecting() -> Self {
        Self {
            reject: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted.lock().unwrap().len()
    }

    pub fn closed(&self) -> Vec<(ConnectionId, Option<String>)> {
        self.closed.lock().unwrap().clone()
    }
}

impl ConnectionHooks for RecordingHooks {
    fn on_accept(&self, info: &ConnectionInfo) -> bool {
        self.accepted.lock().unwrap().push(info.clone());
        !self.reject.load(Ordering::SeqCst)
    }

    fn on_close(&self, info: &ConnectionInfo, error: Option<&RespGateError>) {
        self.closed
            .lock()
            .unwrap()
            .push((info.id, error.map(|e| e.to_string())));
    }
}
