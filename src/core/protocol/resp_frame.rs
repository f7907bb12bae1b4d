// src/core/protocol/resp_frame.rs

//! Implements the RESP (REdis Serialization Protocol) frame structure and the
//! corresponding `Encoder` and `Decoder` for network communication.
//!
//! Besides regular RESP arrays the decoder also understands inline commands
//! (`PING\r\n`, `set k "a b"\n`), which is what `telnet`/`nc` users type.

use crate::core::RespGateError;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// The CRLF (Carriage Return, Line Feed) sequence used to terminate lines in RESP.
const CRLF: &[u8] = b"\r\n";
const CRLF_LEN: usize = 2;

// Protocol-level limits to prevent denial-of-service attacks.
const MAX_FRAME_ELEMENTS: usize = 1_024 * 1_024; // Max elements in an array.
const MAX_BULK_STRING_SIZE: usize = 512 * 1024 * 1024; // 512MB max bulk string size.
const MAX_RECURSION_DEPTH: usize = 256;
const MAX_INLINE_SIZE: usize = 64 * 1024;

/// A single frame of the RESP protocol, as exchanged between client and server.
#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    Null,
    NullArray,
    Array(Vec<RespFrame>),
}

impl RespFrame {
    /// Encodes a frame into a fresh `Vec<u8>`.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>, RespGateError> {
        let mut buf = BytesMut::new();
        RespFrameCodec.encode(self.clone(), &mut buf)?;
        Ok(buf.to_vec())
    }

    /// Builds the array-of-bulk-strings frame clients use to send a command.
    pub fn command<I, B>(parts: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        RespFrame::Array(
            parts
                .into_iter()
                .map(|p| RespFrame::BulkString(p.into()))
                .collect(),
        )
    }
}

/// A `tokio_util::codec` implementation for encoding and decoding `RespFrame`s.
#[derive(Debug, Default, Clone, Copy)]
pub struct RespFrameCodec;

impl Encoder<RespFrame> for RespFrameCodec {
    type Error = RespGateError;

    fn encode(&mut self, item: RespFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            RespFrame::SimpleString(s) => {
                dst.extend_from_slice(b"+");
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Error(s) => {
                dst.extend_from_slice(b"-");
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Integer(i) => {
                dst.extend_from_slice(b":");
                dst.extend_from_slice(itoa::Buffer::new().format(i).as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::BulkString(b) => {
                dst.extend_from_slice(b"$");
                dst.extend_from_slice(itoa::Buffer::new().format(b.len()).as_bytes());
                dst.extend_from_slice(CRLF);
                dst.extend_from_slice(&b);
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Null => {
                dst.extend_from_slice(b"$-1\r\n");
            }
            RespFrame::NullArray => {
                dst.extend_from_slice(b"*-1\r\n");
            }
            RespFrame::Array(arr) => {
                dst.extend_from_slice(b"*");
                dst.extend_from_slice(itoa::Buffer::new().format(arr.len()).as_bytes());
                dst.extend_from_slice(CRLF);
                for frame in arr {
                    self.encode(frame, dst)?;
                }
            }
        }
        Ok(())
    }
}

impl Decoder for RespFrameCodec {
    type Item = RespFrame;
    type Error = RespGateError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.is_empty() {
                return Ok(None);
            }

            if !is_resp_type_byte(src[0]) {
                match self.decode_inline(src)? {
                    // A blank inline line carries no command; keep scanning.
                    Some(InlineLine::Blank) => continue,
                    Some(InlineLine::Command(frame)) => return Ok(Some(frame)),
                    None => return Ok(None),
                }
            }

            let mut bytes = &src[..];
            return match self.decode_recursive(&mut bytes, 0) {
                Ok(frame) => {
                    let len = src.len() - bytes.len();
                    src.advance(len);
                    Ok(Some(frame))
                }
                // Not enough bytes buffered yet; wait for more.
                Err(RespGateError::IncompleteData) => Ok(None),
                Err(e) => Err(e),
            };
        }
    }
}

enum InlineLine {
    Blank,
    Command(RespFrame),
}

impl RespFrameCodec {
    fn decode_recursive(
        &self,
        bytes: &mut &[u8],
        depth: usize,
    ) -> Result<RespFrame, RespGateError> {
        if depth > MAX_RECURSION_DEPTH {
            return Err(RespGateError::Protocol(
                "RESP recursion depth limit exceeded".to_string(),
            ));
        }

        if bytes.is_empty() {
            return Err(RespGateError::IncompleteData);
        }

        match bytes[0] {
            b'+' => self.parse_simple_string(bytes),
            b'-' => self.parse_error(bytes),
            b':' => self.parse_integer(bytes),
            b'$' => self.parse_bulk_string(bytes),
            b'*' => self.parse_array(bytes, depth),
            _ => Err(RespGateError::SyntaxError),
        }
    }

    /// Consumes one inline command line from `src`, if a full line is buffered.
    fn decode_inline(&self, src: &mut BytesMut) -> Result<Option<InlineLine>, RespGateError> {
        let Some(newline) = src.iter().position(|&b| b == b'\n') else {
            if src.len() > MAX_INLINE_SIZE {
                return Err(RespGateError::Protocol("too big inline request".to_string()));
            }
            return Ok(None);
        };

        let line = src.split_to(newline + 1);
        let mut content = &line[..newline];
        if content.last() == Some(&b'\r') {
            content = &content[..content.len() - 1];
        }

        let words: Vec<RespFrame> = split_inline_args(content)?
            .into_iter()
            .map(RespFrame::BulkString)
            .collect();

        if words.is_empty() {
            Ok(Some(InlineLine::Blank))
        } else {
            Ok(Some(InlineLine::Command(RespFrame::Array(words))))
        }
    }

    /// Returns the next CRLF-terminated line and advances past it.
    fn parse_line<'a>(&self, bytes: &mut &'a [u8]) -> Result<&'a [u8], RespGateError> {
        if let Some(pos) = find_crlf(bytes) {
            let line = &bytes[..pos];
            *bytes = &bytes[pos + CRLF_LEN..];
            Ok(line)
        } else {
            Err(RespGateError::IncompleteData)
        }
    }

    fn parse_simple_string(&self, bytes: &mut &[u8]) -> Result<RespFrame, RespGateError> {
        *bytes = &bytes[1..];
        let line = self.parse_line(bytes)?;
        Ok(RespFrame::SimpleString(
            String::from_utf8_lossy(line).to_string(),
        ))
    }

    fn parse_error(&self, bytes: &mut &[u8]) -> Result<RespFrame, RespGateError> {
        *bytes = &bytes[1..];
        let line = self.parse_line(bytes)?;
        Ok(RespFrame::Error(String::from_utf8_lossy(line).to_string()))
    }

    fn parse_integer(&self, bytes: &mut &[u8]) -> Result<RespFrame, RespGateError> {
        *bytes = &bytes[1..];
        let line = self.parse_line(bytes)?;
        Ok(RespFrame::Integer(parse_decimal(line)?))
    }

    /// Parses a Bulk String (e.g., `$5\r\nhello\r\n`).
    fn parse_bulk_string(&self, bytes: &mut &[u8]) -> Result<RespFrame, RespGateError> {
        *bytes = &bytes[1..];
        let line = self.parse_line(bytes)?;
        let str_len = parse_decimal(line)?;

        if str_len == -1 {
            return Ok(RespFrame::Null);
        }
        if str_len < 0 {
            return Err(RespGateError::Protocol("invalid bulk length".to_string()));
        }

        let str_len = str_len as usize;
        if str_len > MAX_BULK_STRING_SIZE {
            return Err(RespGateError::Protocol("invalid bulk length".to_string()));
        }

        if bytes.len() < str_len + CRLF_LEN {
            return Err(RespGateError::IncompleteData);
        }

        if &bytes[str_len..str_len + CRLF_LEN] != CRLF {
            return Err(RespGateError::SyntaxError);
        }

        let data = Bytes::copy_from_slice(&bytes[..str_len]);
        *bytes = &bytes[str_len + CRLF_LEN..];
        Ok(RespFrame::BulkString(data))
    }

    /// Parses an Array (e.g., `*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n`).
    fn parse_array(&self, bytes: &mut &[u8], depth: usize) -> Result<RespFrame, RespGateError> {
        *bytes = &bytes[1..];
        let line = self.parse_line(bytes)?;
        let arr_len = parse_decimal(line)?;

        if arr_len == -1 {
            return Ok(RespFrame::NullArray);
        }
        if arr_len < 0 || arr_len as usize > MAX_FRAME_ELEMENTS {
            return Err(RespGateError::Protocol("invalid multibulk length".to_string()));
        }

        let arr_len = arr_len as usize;
        let mut frames = Vec::with_capacity(arr_len.min(1024));
        for _ in 0..arr_len {
            frames.push(self.decode_recursive(bytes, depth + 1)?);
        }
        Ok(RespFrame::Array(frames))
    }
}

fn is_resp_type_byte(b: u8) -> bool {
    matches!(b, b'+' | b'-' | b':' | b'$' | b'*')
}

fn parse_decimal(line: &[u8]) -> Result<i64, RespGateError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(RespGateError::SyntaxError)
}

fn find_crlf(src: &[u8]) -> Option<usize> {
    src.windows(CRLF_LEN).position(|window| window == CRLF)
}

/// Splits an inline command line into its arguments.
///
/// Arguments are separated by whitespace. One wrapped in double or single
/// quotes may contain whitespace, and inside quotes `\n`, `\r`, `\t` and
/// `\<byte>` escapes are understood. A closing quote must end the argument.
fn split_inline_args(line: &[u8]) -> Result<Vec<Bytes>, RespGateError> {
    let unbalanced = || RespGateError::Protocol("unbalanced quotes in request".to_string());
    let mut args = Vec::new();
    let mut i = 0;

    while i < line.len() {
        if line[i].is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let mut arg = Vec::new();
        match line[i] {
            quote @ (b'"' | b'\'') => {
                i += 1;
                loop {
                    match line.get(i) {
                        None => return Err(unbalanced()),
                        Some(b'\\') if i + 1 < line.len() => {
                            arg.push(match line[i + 1] {
                                b'n' => b'\n',
                                b'r' => b'\r',
                                b't' => b'\t',
                                other => other,
                            });
                            i += 2;
                        }
                        Some(&c) if c == quote => {
                            i += 1;
                            if line.get(i).is_some_and(|c| !c.is_ascii_whitespace()) {
                                return Err(unbalanced());
                            }
                            break;
                        }
                        Some(&c) => {
                            arg.push(c);
                            i += 1;
                        }
                    }
                }
            }
            _ => {
                while i < line.len() && !line[i].is_ascii_whitespace() {
                    arg.push(line[i]);
                    i += 1;
                }
            }
        }
        args.push(Bytes::from(arg));
    }

    Ok(args)
}
