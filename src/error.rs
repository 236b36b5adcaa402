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

//! Error types for the Cube ADBC driver.

use adbc_core::error::Status;
use thiserror::Error;

/// Result type used throughout the driver.
pub type Result<T> = std::result::Result<T, Error>;

/// Driver error.
///
/// Each variant corresponds to one ADBC status code, so errors crossing the
/// ADBC boundary keep their kind. Server-reported query errors carry the
/// server's code and message verbatim; the session stays usable after one.
#[derive(Debug, Error)]
pub enum Error {
    /// The caller supplied an invalid argument (empty host, bad port, ...).
    #[error("{0}")]
    InvalidArgument(String),

    /// The operation is not permitted in the current connection state.
    #[error("{0}")]
    InvalidState(String),

    /// A socket-level failure: connect, read, write, or unexpected close.
    #[error("{0}")]
    Io(String),

    /// A malformed or oversized frame, or a protocol state violation such
    /// as a version mismatch.
    #[error("{0}")]
    Protocol(String),

    /// A well-framed message whose payload failed to decode.
    #[error("{0}")]
    InvalidData(String),

    /// The server rejected the authentication token.
    #[error("{0}")]
    Unauthenticated(String),

    /// A field type the reader does not implement.
    #[error("{0}")]
    Unsupported(String),

    /// A query error reported by the server. The connection remains usable.
    #[error("Query error [{code}]: {message}")]
    Query { code: String, message: String },

    /// An internal invariant was violated.
    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// The ADBC status code this error maps to.
    pub fn status(&self) -> Status {
        match self {
            Error::InvalidArgument(_) => Status::InvalidArguments,
            Error::InvalidState(_) => Status::InvalidState,
            Error::Io(_) => Status::IO,
            Error::Protocol(_) | Error::InvalidData(_) => Status::InvalidData,
            Error::Unauthenticated(_) => Status::Unauthenticated,
            Error::Unsupported(_) => Status::NotImplemented,
            Error::Query { .. } => Status::Unknown,
            Error::Internal(_) => Status::Internal,
        }
    }

    /// Convert into an [`adbc_core::error::Error`] for the ADBC surface.
    pub fn to_adbc(&self) -> adbc_core::error::Error {
        adbc_core::error::Error::with_message_and_status(self.to_string(), self.status())
    }
}

impl From<Error> for adbc_core::error::Error {
    fn from(value: Error) -> Self {
        value.to_adbc()
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value.to_string())
    }
}
