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

//! Client for Cube's native Arrow protocol.
//!
//! This module provides:
//! - `protocol`: the typed wire messages and their codec
//! - `transport`: the length-prefixed framing over a blocking socket
//! - `NativeClient`: the three-phase session (handshake, auth, query loop)
//!
//! A client owns exactly one socket and runs at most one query at a time.
//! Any transport-level failure closes the session; a server-reported query
//! error leaves it authenticated and usable.

pub mod protocol;
pub mod transport;

use std::sync::{Mutex, MutexGuard};

use arrow_array::ffi_stream::FFI_ArrowArrayStream;
use tracing::debug;

use crate::error::{Error, Result};
use crate::reader::ipc;
use crate::reader::stream;
use crate::reader::NativeQueryReader;
use protocol::{Message, PROTOCOL_VERSION};
use transport::FrameSocket;

/// Result of a completed query: the batch-side Arrow IPC bytes and the
/// server-reported affected row count (`-1` when unknown).
#[derive(Debug)]
pub struct QueryOutcome {
    pub ipc: Vec<u8>,
    pub rows_affected: i64,
}

/// A session with a Cube native-protocol server.
///
/// State transitions: unconnected, connected (handshake done), then
/// authenticated; closing is terminal and releases the socket. Operations
/// are strictly sequential.
#[derive(Debug, Default)]
pub struct NativeClient {
    socket: Option<FrameSocket>,
    authenticated: bool,
    server_version: Option<String>,
    session_id: Option<String>,
}

impl NativeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the socket is open.
    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Whether the session has passed authentication.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Server version string reported in the handshake response.
    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    /// Session identifier assigned by the server on authentication.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Open the socket and perform the protocol handshake.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        if self.is_connected() {
            return Err(Error::InvalidState("already connected".into()));
        }

        self.socket = Some(FrameSocket::connect(host, port)?);
        debug!("connected to {}:{}, starting handshake", host, port);

        match self.handshake() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    fn handshake(&mut self) -> Result<()> {
        self.send(&Message::HandshakeRequest {
            version: PROTOCOL_VERSION,
        })?;

        match self.read_message()? {
            Message::HandshakeResponse {
                version,
                server_version,
            } => {
                if version != PROTOCOL_VERSION {
                    return Err(Error::Protocol(format!(
                        "protocol version mismatch: client {PROTOCOL_VERSION}, server {version}"
                    )));
                }
                debug!("handshake complete, server version {}", server_version);
                self.server_version = Some(server_version);
                Ok(())
            }
            other => Err(Error::InvalidData(format!(
                "unexpected message during handshake: tag 0x{:02x}",
                other.tag()
            ))),
        }
    }

    /// Authenticate with a bearer token and an optional database name.
    ///
    /// The socket is closed on any failure, including a rejected token.
    pub fn authenticate(&mut self, token: &str, database: Option<&str>) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::InvalidState("not connected".into()));
        }
        if self.authenticated {
            return Err(Error::InvalidState("already authenticated".into()));
        }
        if token.is_empty() {
            return Err(Error::InvalidArgument(
                "authentication requires a token".into(),
            ));
        }

        match self.authenticate_inner(token, database) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    fn authenticate_inner(&mut self, token: &str, database: Option<&str>) -> Result<()> {
        self.send(&Message::AuthRequest {
            token: token.to_string(),
            database: database.map(str::to_string),
        })?;

        match self.read_message()? {
            Message::AuthResponse {
                success,
                session_id,
            } => {
                if !success {
                    return Err(Error::Unauthenticated(
                        "authentication rejected by server".into(),
                    ));
                }
                debug!("authenticated, session {}", session_id);
                self.session_id = Some(session_id);
                self.authenticated = true;
                Ok(())
            }
            other => Err(Error::InvalidData(format!(
                "unexpected message during authentication: tag 0x{:02x}",
                other.tag()
            ))),
        }
    }

    /// Execute a SQL query and collect the batch-side Arrow IPC bytes.
    ///
    /// The receive loop consumes messages until QueryComplete or Error.
    /// Schema-only messages are discarded: the schema and batch messages
    /// are each a complete Arrow IPC stream with its own end-of-stream
    /// marker, so only the batch-side stream is decoded. A server Error
    /// message surfaces as [`Error::Query`] and leaves the session usable;
    /// every other failure closes it.
    pub fn execute_query(&mut self, sql: &str) -> Result<QueryOutcome> {
        if !self.is_connected() {
            return Err(Error::InvalidState("not connected".into()));
        }
        if !self.authenticated {
            return Err(Error::InvalidState("not authenticated".into()));
        }

        match self.execute_query_inner(sql) {
            Err(e) if !matches!(e, Error::Query { .. }) => {
                self.close();
                Err(e)
            }
            other => other,
        }
    }

    fn execute_query_inner(&mut self, sql: &str) -> Result<QueryOutcome> {
        self.send(&Message::QueryRequest {
            sql: sql.to_string(),
        })?;

        let mut ipc: Vec<u8> = Vec::new();
        loop {
            match self.read_message()? {
                Message::QueryResponseSchema { ipc: schema_ipc } => {
                    debug!(
                        "discarding schema-only message ({} bytes)",
                        schema_ipc.len()
                    );
                }
                Message::QueryResponseBatch { ipc: batch_ipc } => {
                    debug!("received batch message ({} bytes)", batch_ipc.len());
                    ipc = batch_ipc;
                }
                Message::QueryComplete { rows_affected } => {
                    debug!("query complete, rows_affected={}", rows_affected);
                    if ipc.is_empty() {
                        return Err(Error::InvalidData("no Arrow IPC data received".into()));
                    }
                    return Ok(QueryOutcome { ipc, rows_affected });
                }
                Message::Error { code, message } => {
                    return Err(Error::Query { code, message });
                }
                other => {
                    return Err(Error::InvalidData(format!(
                        "unexpected message during query: tag 0x{:02x}",
                        other.tag()
                    )));
                }
            }
        }
    }

    /// Execute a query and install the result into a caller-supplied Arrow
    /// C stream handle.
    ///
    /// `out` is reset to a zero-initialized stream before any fallible
    /// work, so callers may unconditionally release it on the error path.
    /// Returns the affected row count on success.
    pub fn execute_query_into(
        &mut self,
        sql: &str,
        out: &mut FFI_ArrowArrayStream,
    ) -> Result<i64> {
        *out = FFI_ArrowArrayStream::empty();

        let outcome = self.execute_query(sql)?;
        let parsed = ipc::parse_stream(&outcome.ipc)?;
        stream::export_reader(Box::new(NativeQueryReader::new(parsed)), out);
        Ok(outcome.rows_affected)
    }

    /// Close the session and release the socket. Terminal and idempotent.
    pub fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            socket.shutdown();
        }
        self.authenticated = false;
        self.session_id = None;
        self.server_version = None;
    }

    fn send(&mut self, message: &Message) -> Result<()> {
        let payload = message.encode();
        self.socket_mut()?.write_frame(&payload)
    }

    fn read_message(&mut self) -> Result<Message> {
        let payload = self.socket_mut()?.read_frame()?;
        Message::decode(&payload)
    }

    fn socket_mut(&mut self) -> Result<&mut FrameSocket> {
        self.socket
            .as_mut()
            .ok_or_else(|| Error::InvalidState("not connected".into()))
    }
}

impl Drop for NativeClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// Lock a shared client, surfacing poisoning as an internal error.
pub(crate) fn lock_client(client: &Mutex<NativeClient>) -> Result<MutexGuard<'_, NativeClient>> {
    client
        .lock()
        .map_err(|_| Error::Internal("native client lock poisoned".into()))
}
