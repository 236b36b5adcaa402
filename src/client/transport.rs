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

//! Framed transport over a blocking TCP socket.
//!
//! Moves whole `(u32 big-endian length, payload)` units and nothing else;
//! payload interpretation belongs to the protocol layer. Reads and writes
//! loop until the exact byte count is satisfied (`read_exact`/`write_all`
//! restart on `Interrupted`). A 0-byte read surfaces as remote close.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};

use crate::error::{Error, Result};

/// Hard cap on an inbound frame payload. Anything larger is rejected as a
/// protocol violation before allocation.
pub const MAX_FRAME_LEN: usize = 100 * 1024 * 1024;

/// A connected stream socket carrying length-prefixed frames.
#[derive(Debug)]
pub struct FrameSocket {
    stream: TcpStream,
}

impl FrameSocket {
    /// Resolve `host:port` and connect.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).map_err(|e| {
            Error::Io(format!("failed to connect to {host}:{port}: {e}"))
        })?;
        Ok(Self { stream })
    }

    /// Read one frame and return its payload (length prefix stripped).
    /// Blocks until the whole frame is available.
    pub fn read_frame(&mut self) -> Result<Vec<u8>> {
        let mut len_buf = [0u8; 4];
        self.read_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;

        if len == 0 || len > MAX_FRAME_LEN {
            return Err(Error::Protocol(format!("invalid frame length: {len}")));
        }

        let mut payload = vec![0u8; len];
        self.read_exact(&mut payload)?;
        Ok(payload)
    }

    /// Write one frame: the big-endian length prefix, then the payload.
    pub fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        let len = u32::try_from(payload.len())
            .map_err(|_| Error::Protocol("frame payload exceeds u32 length".into()))?;
        self.write_all(&len.to_be_bytes())?;
        self.write_all(payload)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.stream.read_exact(buf).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                Error::Io("connection closed by server".into())
            } else {
                Error::Io(format!("socket read error: {e}"))
            }
        })
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.stream
            .write_all(buf)
            .map_err(|e| Error::Io(format!("socket write error: {e}")))
    }

    /// Shut down both directions. Errors are ignored; the peer may already
    /// be gone.
    pub fn shutdown(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn socket_pair() -> (FrameSocket, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || listener.accept().unwrap().0);
        let client = FrameSocket::connect("127.0.0.1", addr.port()).unwrap();
        (client, handle.join().unwrap())
    }

    #[test]
    fn test_frame_round_trip() {
        let (mut client, mut server) = socket_pair();

        let payload = b"\x01\x00\x00\x00\x01";
        client.write_frame(payload).unwrap();

        let mut received = vec![0u8; 4 + payload.len()];
        server.read_exact(&mut received).unwrap();
        assert_eq!(&received[..4], &5u32.to_be_bytes());
        assert_eq!(&received[4..], payload);

        server.write_all(&received).unwrap();
        assert_eq!(client.read_frame().unwrap(), payload);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let (mut client, mut server) = socket_pair();
        let len = (MAX_FRAME_LEN as u32) + 1;
        server.write_all(&len.to_be_bytes()).unwrap();
        let err = client.read_frame().unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "got {err:?}");
    }

    #[test]
    fn test_max_frame_length_word_accepted() {
        // The length word itself passes the guard; the read then fails
        // because the peer never sends the body.
        let (mut client, server) = socket_pair();
        let len = MAX_FRAME_LEN as u32;
        (&server).write_all(&len.to_be_bytes()).unwrap();
        drop(server);
        let err = client.read_frame().unwrap_err();
        assert!(matches!(err, Error::Io(_)), "got {err:?}");
    }

    #[test]
    fn test_zero_length_frame_rejected() {
        let (mut client, mut server) = socket_pair();
        server.write_all(&0u32.to_be_bytes()).unwrap();
        let err = client.read_frame().unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_peer_close_mid_frame() {
        let (mut client, mut server) = socket_pair();
        // Advertise 10 bytes, deliver 3, then close.
        server.write_all(&10u32.to_be_bytes()).unwrap();
        server.write_all(b"abc").unwrap();
        drop(server);
        let err = client.read_frame().unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("closed"));
    }
}
