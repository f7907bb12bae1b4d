// src/core/store/memory.rs

use super::StoreClient;
use crate::core::StoreError;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

/// An in-process store backed by a sharded concurrent map.
///
/// Used when the gateway runs standalone (`--store memory`) and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<Bytes, Bytes>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn put(&self, key: Bytes, value: Bytes) -> Result<(), StoreError> {
        self.entries.insert(key, value);
        Ok(())
    }

    async fn get(&self, key: Bytes) -> Result<Option<Bytes>, StoreError> {
        Ok(self.entries.get(&key).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, key: Bytes) -> Result<(), StoreError> {
        self.entries.remove(&key);
        Ok(())
    }
}
