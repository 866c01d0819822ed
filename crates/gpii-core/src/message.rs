//! Length-prefixed JSON framing for the service ↔ helper IPC channel.
//!
//! Wire format: a 4-byte big-endian length, followed by that many bytes of
//! UTF-8 JSON decoding to `{"type": string, "payload": any}`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Header size: 4-byte big-endian length prefix.
pub const HEADER_SIZE: usize = 4;

/// Maximum frame payload size (16 MB).
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

pub const TYPE_PING: &str = "ping";
pub const TYPE_PONG: &str = "pong";
pub const TYPE_ERROR: &str = "error";
pub const TYPE_HELLO: &str = "hello";

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("frame too large: {size} bytes (max {MAX_MESSAGE_SIZE})")]
    TooLarge { size: u32 },
    #[error("zero-length frame")]
    ZeroLength,
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A decoded IPC message: `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: serde_json::Value,
}

impl Message {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    pub fn ping(payload: serde_json::Value) -> Self {
        Self::new(TYPE_PING, payload)
    }

    pub fn pong(payload: serde_json::Value) -> Self {
        Self::new(TYPE_PONG, payload)
    }

    pub fn hello(payload: serde_json::Value) -> Self {
        Self::new(TYPE_HELLO, payload)
    }

    /// Encode this message as a complete length-prefixed frame.
    pub fn encode_frame(&self) -> Result<Vec<u8>, FramingError> {
        let body = serde_json::to_vec(self)?;
        if body.len() as u64 > MAX_MESSAGE_SIZE as u64 {
            return Err(FramingError::TooLarge {
                size: body.len() as u32,
            });
        }
        let mut frame = Vec::with_capacity(HEADER_SIZE + body.len());
        frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Decode a single message from a frame body (the bytes *after* the
    /// length prefix has already been read and validated by the transport).
    pub fn decode_body(body: &[u8]) -> Result<Self, FramingError> {
        if body.is_empty() {
            return Err(FramingError::ZeroLength);
        }
        Ok(serde_json::from_slice(body)?)
    }

    /// Parse the 4-byte big-endian length prefix, validating it against the
    /// maximum frame size. Returns the number of body bytes to read next.
    pub fn parse_length_prefix(bytes: [u8; HEADER_SIZE]) -> Result<u32, FramingError> {
        let len = u32::from_be_bytes(bytes);
        if len == 0 {
            return Err(FramingError::ZeroLength);
        }
        if len > MAX_MESSAGE_SIZE {
            return Err(FramingError::TooLarge { size: len });
        }
        Ok(len)
    }

    /// Split the leading frame out of `buf` if a complete one is present.
    /// Returns `(message, bytes_consumed)`, mirroring the incremental
    /// decode used by stream-oriented transports.
    pub fn decode(buf: &[u8]) -> Result<Option<(Self, usize)>, FramingError> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }
        let mut len_bytes = [0u8; HEADER_SIZE];
        len_bytes.copy_from_slice(&buf[..HEADER_SIZE]);
        let len = Self::parse_length_prefix(len_bytes)? as usize;
        if buf.len() < HEADER_SIZE + len {
            return Ok(None);
        }
        let msg = Self::decode_body(&buf[HEADER_SIZE..HEADER_SIZE + len])?;
        Ok(Some((msg, HEADER_SIZE + len)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn roundtrip_ping() {
        let msg = Message::ping(serde_json::json!(42));
        let frame = msg.encode_frame().unwrap();
        let (decoded, consumed) = Message::decode(&frame).unwrap().unwrap();
        assert_eq!(consumed, frame.len());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn decode_incomplete_header_returns_none() {
        let buf = [0u8; 2];
        assert!(Message::decode(&buf).unwrap().is_none());
    }

    #[test]
    fn decode_incomplete_body_returns_none() {
        let msg = Message::new("hello", serde_json::json!({"cwd": "/tmp"}));
        let frame = msg.encode_frame().unwrap();
        let truncated = &frame[..frame.len() - 1];
        assert!(Message::decode(truncated).unwrap().is_none());
    }

    #[test]
    fn zero_length_frame_is_rejected() {
        let err = Message::parse_length_prefix([0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, FramingError::ZeroLength));
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let oversize = MAX_MESSAGE_SIZE + 1;
        let err = Message::parse_length_prefix(oversize.to_be_bytes()).unwrap_err();
        assert!(matches!(err, FramingError::TooLarge { .. }));
    }

    proptest! {
        #[test]
        fn roundtrip_identity(kind in "[a-z]{1,16}", payload in any::<i64>()) {
            let msg = Message::new(kind, serde_json::json!(payload));
            let frame = msg.encode_frame().unwrap();
            let (decoded, consumed) = Message::decode(&frame).unwrap().unwrap();
            prop_assert_eq!(consumed, frame.len());
            prop_assert_eq!(decoded, msg);
        }
    }
}
