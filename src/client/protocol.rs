// Copyright (c) 2025 ADBC Drivers Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Message codec for Cube's native wire protocol.
//!
//! Every frame on the wire is a `u32` big-endian length followed by that
//! many payload bytes. The first payload byte is the message type tag;
//! the rest is tag-specific. All multi-byte integers are big-endian
//! (network order) — unlike the Arrow IPC payloads these messages carry,
//! which are little-endian inside.
//!
//! Primitive encodings:
//! - `u32`: 4 bytes big-endian
//! - `i64`: 8 bytes big-endian, two's complement
//! - `str`: `u32` byte length, then UTF-8 bytes
//! - `opt<str>`: `u8` presence flag (0/1), then `str` if present
//! - `bytes`: `u32` length, then raw bytes

use crate::error::{Error, Result};

/// Protocol version advertised in the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// Message type tags.
pub mod tag {
    pub const HANDSHAKE_REQUEST: u8 = 0x01;
    pub const HANDSHAKE_RESPONSE: u8 = 0x02;
    pub const AUTH_REQUEST: u8 = 0x03;
    pub const AUTH_RESPONSE: u8 = 0x04;
    pub const QUERY_REQUEST: u8 = 0x10;
    pub const QUERY_RESPONSE_SCHEMA: u8 = 0x11;
    pub const QUERY_RESPONSE_BATCH: u8 = 0x12;
    pub const QUERY_COMPLETE: u8 = 0x13;
    pub const ERROR: u8 = 0xFF;
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    HandshakeRequest {
        version: u32,
    },
    HandshakeResponse {
        version: u32,
        server_version: String,
    },
    AuthRequest {
        token: String,
        database: Option<String>,
    },
    AuthResponse {
        success: bool,
        session_id: String,
    },
    QueryRequest {
        sql: String,
    },
    /// A standalone Arrow IPC stream carrying only the result schema.
    QueryResponseSchema {
        ipc: Vec<u8>,
    },
    /// A standalone Arrow IPC stream carrying the schema and the batch.
    QueryResponseBatch {
        ipc: Vec<u8>,
    },
    QueryComplete {
        rows_affected: i64,
    },
    Error {
        code: String,
        message: String,
    },
}

impl Message {
    /// The wire tag of this message.
    pub fn tag(&self) -> u8 {
        match self {
            Message::HandshakeRequest { .. } => tag::HANDSHAKE_REQUEST,
            Message::HandshakeResponse { .. } => tag::HANDSHAKE_RESPONSE,
            Message::AuthRequest { .. } => tag::AUTH_REQUEST,
            Message::AuthResponse { .. } => tag::AUTH_RESPONSE,
            Message::QueryRequest { .. } => tag::QUERY_REQUEST,
            Message::QueryResponseSchema { .. } => tag::QUERY_RESPONSE_SCHEMA,
            Message::QueryResponseBatch { .. } => tag::QUERY_RESPONSE_BATCH,
            Message::QueryComplete { .. } => tag::QUERY_COMPLETE,
            Message::Error { .. } => tag::ERROR,
        }
    }

    /// Encode the frame payload (tag byte + body, no length prefix).
    ///
    /// The transport prepends the big-endian length when writing.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(self.tag());
        match self {
            Message::HandshakeRequest { version } => {
                put_u32(&mut buf, *version);
            }
            Message::HandshakeResponse {
                version,
                server_version,
            } => {
                put_u32(&mut buf, *version);
                put_str(&mut buf, server_version);
            }
            Message::AuthRequest { token, database } => {
                put_str(&mut buf, token);
                put_opt_str(&mut buf, database.as_deref());
            }
            Message::AuthResponse {
                success,
                session_id,
            } => {
                buf.push(u8::from(*success));
                put_str(&mut buf, session_id);
            }
            Message::QueryRequest { sql } => {
                put_str(&mut buf, sql);
            }
            Message::QueryResponseSchema { ipc } | Message::QueryResponseBatch { ipc } => {
                put_bytes(&mut buf, ipc);
            }
            Message::QueryComplete { rows_affected } => {
                put_i64(&mut buf, *rows_affected);
            }
            Message::Error { code, message } => {
                put_str(&mut buf, code);
                put_str(&mut buf, message);
            }
        }
        buf
    }

    /// Decode a frame payload (length prefix already stripped).
    pub fn decode(payload: &[u8]) -> Result<Message> {
        let mut r = Reader::new(payload);
        let tag = r.get_u8()?;
        let message = match tag {
            tag::HANDSHAKE_REQUEST => Message::HandshakeRequest {
                version: r.get_u32()?,
            },
            tag::HANDSHAKE_RESPONSE => Message::HandshakeResponse {
                version: r.get_u32()?,
                server_version: r.get_str()?,
            },
            tag::AUTH_REQUEST => Message::AuthRequest {
                token: r.get_str()?,
                database: r.get_opt_str()?,
            },
            tag::AUTH_RESPONSE => Message::AuthResponse {
                success: r.get_u8()? != 0,
                session_id: r.get_str()?,
            },
            tag::QUERY_REQUEST => Message::QueryRequest { sql: r.get_str()? },
            tag::QUERY_RESPONSE_SCHEMA => Message::QueryResponseSchema {
                ipc: r.get_bytes()?,
            },
            tag::QUERY_RESPONSE_BATCH => Message::QueryResponseBatch {
                ipc: r.get_bytes()?,
            },
            tag::QUERY_COMPLETE => Message::QueryComplete {
                rows_affected: r.get_i64()?,
            },
            tag::ERROR => Message::Error {
                code: r.get_str()?,
                message: r.get_str()?,
            },
            other => {
                return Err(Error::InvalidData(format!(
                    "unknown message tag 0x{other:02x}"
                )))
            }
        };
        Ok(message)
    }
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn put_i64(buf: &mut Vec<u8>, value: i64) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn put_str(buf: &mut Vec<u8>, value: &str) {
    put_u32(buf, value.len() as u32);
    buf.extend_from_slice(value.as_bytes());
}

fn put_opt_str(buf: &mut Vec<u8>, value: Option<&str>) {
    match value {
        Some(s) if !s.is_empty() => {
            buf.push(1);
            put_str(buf, s);
        }
        _ => buf.push(0),
    }
}

fn put_bytes(buf: &mut Vec<u8>, value: &[u8]) {
    put_u32(buf, value.len() as u32);
    buf.extend_from_slice(value);
}

/// Cursor over a frame payload. Every getter bounds-checks and fails with
/// `InvalidData` instead of panicking on truncated input.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| Error::InvalidData(format!("insufficient data for {what}")))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1, "u8")?[0])
    }

    fn get_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4, "u32")?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn get_i64(&mut self) -> Result<i64> {
        let bytes = self.take(8, "i64")?;
        let mut value = [0u8; 8];
        value.copy_from_slice(bytes);
        Ok(i64::from_be_bytes(value))
    }

    fn get_str(&mut self) -> Result<String> {
        let len = self.get_u32()? as usize;
        let bytes = self.take(len, "string")?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::InvalidData("invalid UTF-8 in string field".into()))
    }

    fn get_opt_str(&mut self) -> Result<Option<String>> {
        let present = self.get_u8()?;
        if present != 0 {
            Ok(Some(self.get_str()?))
        } else {
            Ok(None)
        }
    }

    fn get_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.get_u32()? as usize;
        Ok(self.take(len, "bytes")?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(message: Message) {
        let payload = message.encode();
        assert_eq!(payload[0], message.tag());
        let decoded = Message::decode(&payload).unwrap();
        assert_eq!(decoded, message);
        // Re-encoding the decoded message reproduces the same bytes.
        assert_eq!(decoded.encode(), payload);
    }

    #[test]
    fn test_round_trip_all_variants() {
        round_trip(Message::HandshakeRequest {
            version: PROTOCOL_VERSION,
        });
        round_trip(Message::HandshakeResponse {
            version: 1,
            server_version: "cube 1.3.0".into(),
        });
        round_trip(Message::AuthRequest {
            token: "secret-token".into(),
            database: Some("analytics".into()),
        });
        round_trip(Message::AuthRequest {
            token: "secret-token".into(),
            database: None,
        });
        round_trip(Message::AuthResponse {
            success: true,
            session_id: "sess-42".into(),
        });
        round_trip(Message::AuthResponse {
            success: false,
            session_id: String::new(),
        });
        round_trip(Message::QueryRequest {
            sql: "SELECT 42 AS answer".into(),
        });
        round_trip(Message::QueryResponseSchema {
            ipc: vec![0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0],
        });
        round_trip(Message::QueryResponseBatch {
            ipc: vec![1, 2, 3, 4, 5],
        });
        round_trip(Message::QueryComplete { rows_affected: -1 });
        round_trip(Message::QueryComplete {
            rows_affected: i64::MAX,
        });
        round_trip(Message::Error {
            code: "QUERY_ERROR".into(),
            message: "nonexistent_table not found".into(),
        });
    }

    #[test]
    fn test_wire_layout_is_big_endian() {
        let payload = Message::HandshakeRequest { version: 1 }.encode();
        assert_eq!(payload, vec![0x01, 0x00, 0x00, 0x00, 0x01]);

        let payload = Message::QueryComplete { rows_affected: -1 }.encode();
        assert_eq!(payload[0], 0x13);
        assert_eq!(&payload[1..], &[0xFF; 8]);
    }

    #[test]
    fn test_optional_database_flag() {
        let with = Message::AuthRequest {
            token: "t".into(),
            database: Some("db".into()),
        }
        .encode();
        // tag + str("t") + present flag
        assert_eq!(with[6], 1);

        let without = Message::AuthRequest {
            token: "t".into(),
            database: None,
        }
        .encode();
        assert_eq!(without[6], 0);
        assert_eq!(without.len(), 7);
    }

    #[test]
    fn test_decode_unknown_tag() {
        let err = Message::decode(&[0x42]).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn test_decode_truncated_payload() {
        // HandshakeResponse with a string length pointing past the end.
        let mut payload = vec![tag::HANDSHAKE_RESPONSE];
        payload.extend_from_slice(&1u32.to_be_bytes());
        payload.extend_from_slice(&100u32.to_be_bytes());
        payload.extend_from_slice(b"short");
        let err = Message::decode(&payload).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn test_decode_empty_payload() {
        assert!(Message::decode(&[]).is_err());
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let mut payload = vec![tag::QUERY_REQUEST];
        payload.extend_from_slice(&2u32.to_be_bytes());
        payload.extend_from_slice(&[0xC0, 0x80]);
        let err = Message::decode(&payload).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }
}
