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

//! Cube ADBC Driver for Rust
//!
//! This crate provides an ADBC (Arrow Database Connectivity) driver for
//! connecting to Cube over its native Arrow protocol.
//!
//! ## Overview
//!
//! The driver implements the standard ADBC traits from `adbc_core`:
//! - [`Driver`] - Entry point for creating database connections
//! - [`Database`] - Holds connection configuration
//! - [`Connection`] - Active session with a Cube server
//! - [`Statement`] - SQL statement execution
//!
//! Underneath the façade sit three layers:
//! - a framed transport moving length-prefixed messages over a blocking
//!   TCP socket
//! - the native protocol codec and session state machine (handshake,
//!   token authentication, query loop)
//! - an Arrow IPC streaming-format reader that materializes the result
//!   batch, exported either as a `RecordBatchReader` or through the
//!   Arrow C stream interface
//!
//! ## Example
//!
//! ```ignore
//! use adbc_core::{Connection as _, Database as _, Driver as _, Statement as _};
//! use adbc_core::options::{OptionDatabase, OptionValue};
//! use adbc_core::Optionable;
//! use cube_adbc::Driver;
//!
//! let mut driver = Driver::new();
//! let mut database = driver.new_database()?;
//! database.set_option(OptionDatabase::Other("adbc.cube.host".into()), OptionValue::String("localhost".into()))?;
//! database.set_option(OptionDatabase::Other("adbc.cube.port".into()), OptionValue::String("4445".into()))?;
//! database.set_option(OptionDatabase::Other("adbc.cube.token".into()), OptionValue::String("...".into()))?;
//!
//! let mut connection = database.new_connection()?;
//! let mut statement = connection.new_statement()?;
//! statement.set_sql_query("SELECT 42 AS answer")?;
//! let reader = statement.execute()?;
//! ```
//!
//! ## Configuration Options
//!
//! | Option | Description |
//! |--------|-------------|
//! | `adbc.cube.host` | Server host |
//! | `adbc.cube.port` | Server port (decimal string) |
//! | `adbc.cube.token` | Bearer token (falls back to `CUBESQL_CUBE_TOKEN`) |
//! | `adbc.cube.database` | Optional database name |
//! | `adbc.cube.connection_mode` | `native` (default) or `postgresql` |
//! | `adbc.cube.user` / `adbc.cube.password` | Reserved for the postgresql mode |
//! | `adbc.cube.log_level` | `off`, `error`, `warn`, `info`, `debug`, `trace` |
//! | `adbc.cube.log_file` | Log file path (stderr when unset) |

pub mod client;
pub mod connection;
pub mod database;
pub mod driver;
pub mod error;
mod logging;
pub mod metadata;
pub mod params;
pub mod reader;
pub mod statement;

// Re-export main types
pub use connection::Connection;
pub use database::{ConnectionMode, Database};
pub use driver::Driver;
pub use error::{Error, Result};
pub use statement::Statement;

// Re-export client types for advanced users
pub use client::{NativeClient, QueryOutcome};

// FFI export — produces the CubeDriverInit symbol when built with
// `cargo build --features ffi`
#[cfg(feature = "ffi")]
adbc_core::export_driver!(CubeDriverInit, crate::driver::Driver);
