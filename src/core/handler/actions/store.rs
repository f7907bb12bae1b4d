// src/core/handler/actions/store.rs

//! `set`, `get` and `del`: thin forwards to the configured `StoreClient`.

use crate::core::handler::command_router::RouteResponse;
use crate::core::metrics;
use crate::core::store::StoreClient;
use crate::core::{RespGateError, RespValue, StoreError};
use bytes::Bytes;
use tracing::debug;

pub async fn handle_set(
    store: &dyn StoreClient,
    key: Bytes,
    value: Bytes,
) -> Result<RouteResponse, RespGateError> {
    store
        .put(key, value)
        .await
        .map_err(|e| store_failure("set", e))?;
    Ok(RouteResponse::Single(RespValue::ok()))
}

pub async fn handle_get(store: &dyn StoreClient, key: Bytes) -> Result<RouteResponse, RespGateError> {
    let value = store.get(key).await.map_err(|e| store_failure("get", e))?;
    Ok(RouteResponse::Single(
        value.map_or(RespValue::Null, RespValue::BulkString),
    ))
}

/// Always replies `1` on success: the store does not say whether the key existed.
pub async fn handle_del(store: &dyn StoreClient, key: Bytes) -> Result<RouteResponse, RespGateError> {
    store.delete(key).await.map_err(|e| store_failure("del", e))?;
    Ok(RouteResponse::Single(RespValue::Integer(1)))
}

fn store_failure(command: &'static str, err: StoreError) -> RespGateError {
    metrics::STORE_ERRORS_TOTAL
        .with_label_values(&[command])
        .inc();
    debug!("Store call for '{}' failed: {}", command, err);
    RespGateError::Store(err)
}
