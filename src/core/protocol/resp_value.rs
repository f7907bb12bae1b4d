// src/core/protocol/resp_value.rs

//! Defines the reply-side value type used by the dispatch layer.

use bytes::Bytes;

/// `RespValue` is what command handlers produce.
///
/// It is converted into a `RespFrame` right before it is queued for the client.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    SimpleString(String),
    BulkString(Bytes),
    Integer(i64),
    Array(Vec<RespValue>),
    Null,
}

impl RespValue {
    /// The `+OK` status reply.
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".into())
    }

    /// Builds the three-element confirmation pushed for every (un)subscription.
    pub fn subscription_ack(kind: &'static str, name: Option<Bytes>, count: usize) -> Self {
        RespValue::Array(vec![
            RespValue::BulkString(Bytes::from_static(kind.as_bytes())),
            name.map_or(RespValue::Null, RespValue::BulkString),
            RespValue::Integer(count as i64),
        ])
    }
}

impl From<RespValue> for super::RespFrame {
    fn from(val: RespValue) -> Self {
        match val {
            RespValue::SimpleString(s) => super::RespFrame::SimpleString(s),
            RespValue::BulkString(b) => super::RespFrame::BulkString(b),
            RespValue::Integer(i) => super::RespFrame::Integer(i),
            RespValue::Array(arr) => {
                super::RespFrame::Array(arr.into_iter().map(Into::into).collect())
            }
            RespValue::Null => super::RespFrame::Null,
        }
    }
}
