// src/core/store/mod.rs

//! The key/value collaborator the gateway forwards `set`, `get` and `del` to.
//!
//! The gateway never caches values. Every call goes to the `StoreClient` that
//! was handed to the server at startup, which is also the seam tests use to
//! substitute a fake.

use crate::core::StoreError;
use async_trait::async_trait;
use bytes::Bytes;

pub mod memory;
pub mod remote;

pub use memory::MemoryStore;
pub use remote::{RemoteStore, RemoteStoreConfig};

/// A shared, concurrently usable key/value backend.
///
/// Dropping a returned future cancels the call from the gateway's side. Any
/// deadline is the implementation's business.
#[async_trait]
pub trait StoreClient: Send + Sync + 'static {
    /// Stores `value` under `key`, replacing any previous value.
    async fn put(&self, key: Bytes, value: Bytes) -> Result<(), StoreError>;

    /// Fetches the value under `key`, or `None` if the key is absent.
    async fn get(&self, key: Bytes) -> Result<Option<Bytes>, StoreError>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn delete(&self, key: Bytes) -> Result<(), StoreError>;
}
