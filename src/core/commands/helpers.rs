// src/core/commands/helpers.rs

//! Helpers for turning decoded frames into command arguments.

use crate::core::RespGateError;
use crate::core::protocol::RespFrame;
use bytes::Bytes;

/// Flattens a request frame into its ordered argument list.
///
/// Clients always send an array of bulk strings; anything else is a protocol
/// error that is reported without closing the connection.
pub fn frame_to_args(frame: RespFrame) -> Result<Vec<Bytes>, RespGateError> {
    match frame {
        RespFrame::Array(items) => items.into_iter().map(extract_bytes).collect(),
        _ => Err(RespGateError::Protocol(
            "expected array of bulk strings".to_string(),
        )),
    }
}

/// Extracts `Bytes` from a `RespFrame::BulkString`.
pub fn extract_bytes(frame: RespFrame) -> Result<Bytes, RespGateError> {
    match frame {
        RespFrame::BulkString(bs) => Ok(bs),
        _ => Err(RespGateError::Protocol(
            "expected array of bulk strings".to_string(),
        )),
    }
}

/// Moves exactly `N` arguments into a fixed-size array.
pub fn expect_exact<const N: usize>(
    args: Vec<Bytes>,
    cmd: &str,
) -> Result<[Bytes; N], RespGateError> {
    args.try_into()
        .map_err(|_| RespGateError::WrongArgumentCount(cmd.to_string()))
}

/// Validates that at least `min` arguments are present.
pub fn expect_at_least(
    args: Vec<Bytes>,
    min: usize,
    cmd: &str,
) -> Result<Vec<Bytes>, RespGateError> {
    if args.len() < min {
        Err(RespGateError::WrongArgumentCount(cmd.to_string()))
    } else {
        Ok(args)
    }
}
