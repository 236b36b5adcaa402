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

//! Database implementation for the Cube ADBC driver.

use crate::connection::{Connection, ConnectionConfig};
use crate::error::Error;
use crate::logging::{init_logging, LogConfig};
use adbc_core::error::Result;
use adbc_core::options::{OptionConnection, OptionDatabase, OptionValue};
use adbc_core::Optionable;
use tracing::debug;

/// Environment variable consulted for the bearer token when the
/// `adbc.cube.token` option is not set.
const TOKEN_ENV_VAR: &str = "CUBESQL_CUBE_TOKEN";

/// Transport selected by `adbc.cube.connection_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionMode {
    /// The native Arrow IPC protocol.
    #[default]
    Native,
    /// The PostgreSQL wire protocol (not implemented by this driver).
    PostgreSql,
}

impl ConnectionMode {
    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "native" | "arrow_native" => Some(ConnectionMode::Native),
            "postgresql" | "postgres" => Some(ConnectionMode::PostgreSql),
            _ => None,
        }
    }
}

/// Represents a database instance that holds connection configuration.
///
/// A Database is created from a Driver and is used to establish
/// Connections. Host, port, token, and the optional database name are set
/// on the Database before creating connections.
#[derive(Debug, Default)]
pub struct Database {
    host: Option<String>,
    port: Option<String>,
    token: Option<String>,
    database: Option<String>,
    // Reserved for the PostgreSQL wire transport.
    user: Option<String>,
    password: Option<String>,
    connection_mode: ConnectionMode,
    log_config: LogConfig,
}

impl Database {
    /// Creates a new Database instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the configured host.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Returns the configured port string.
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// Returns the configured database name.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Returns the selected transport.
    pub fn connection_mode(&self) -> ConnectionMode {
        self.connection_mode
    }

    fn set_string(slot: &mut Option<String>, key: &OptionDatabase, value: OptionValue) -> Result<()> {
        if let OptionValue::String(s) = value {
            *slot = Some(s);
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "option '{}' requires a string value",
                key.as_ref()
            ))
            .to_adbc())
        }
    }

    /// The bearer token: the option when set, else the environment.
    fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var(TOKEN_ENV_VAR).ok())
            .filter(|token| !token.is_empty())
    }

    fn parse_port(&self) -> crate::error::Result<u16> {
        let port = self
            .port
            .as_deref()
            .ok_or_else(|| Error::InvalidArgument("option 'adbc.cube.port' is not set".into()))?;
        port.parse::<u16>()
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| Error::InvalidArgument(format!("invalid port '{port}'")))
    }
}

impl Optionable for Database {
    type Option = OptionDatabase;

    fn set_option(&mut self, key: Self::Option, value: OptionValue) -> Result<()> {
        match key {
            OptionDatabase::Other(ref name) => match name.as_str() {
                "adbc.cube.host" => Self::set_string(&mut self.host, &key, value),
                "adbc.cube.port" => Self::set_string(&mut self.port, &key, value),
                "adbc.cube.token" => Self::set_string(&mut self.token, &key, value),
                "adbc.cube.database" => Self::set_string(&mut self.database, &key, value),
                "adbc.cube.user" => Self::set_string(&mut self.user, &key, value),
                "adbc.cube.password" => Self::set_string(&mut self.password, &key, value),
                "adbc.cube.connection_mode" => {
                    let OptionValue::String(s) = value else {
                        return Err(Error::InvalidArgument(
                            "option 'adbc.cube.connection_mode' requires a string value".into(),
                        )
                        .to_adbc());
                    };
                    self.connection_mode = ConnectionMode::parse(&s).ok_or_else(|| {
                        Error::InvalidArgument(format!("unknown connection mode '{s}'")).to_adbc()
                    })?;
                    Ok(())
                }
                "adbc.cube.log_level" => {
                    let mut level = None;
                    Self::set_string(&mut level, &key, value)?;
                    self.log_config.level = level;
                    Ok(())
                }
                "adbc.cube.log_file" => {
                    let mut file = None;
                    Self::set_string(&mut file, &key, value)?;
                    self.log_config.file = file;
                    Ok(())
                }
                _ => Err(Error::InvalidArgument(format!(
                    "unknown database option '{name}'"
                ))
                .to_adbc()),
            },
            _ => Err(Error::InvalidArgument(format!(
                "unknown database option '{}'",
                key.as_ref()
            ))
            .to_adbc()),
        }
    }

    fn get_option_string(&self, key: Self::Option) -> Result<String> {
        let value = match key {
            OptionDatabase::Other(ref name) => match name.as_str() {
                "adbc.cube.host" => self.host.clone(),
                "adbc.cube.port" => self.port.clone(),
                "adbc.cube.database" => self.database.clone(),
                "adbc.cube.user" => self.user.clone(),
                "adbc.cube.connection_mode" => Some(
                    match self.connection_mode {
                        ConnectionMode::Native => "native",
                        ConnectionMode::PostgreSql => "postgresql",
                    }
                    .to_string(),
                ),
                _ => {
                    return Err(Error::InvalidArgument(format!(
                        "unknown database option '{name}'"
                    ))
                    .to_adbc())
                }
            },
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "unknown database option '{}'",
                    key.as_ref()
                ))
                .to_adbc())
            }
        };
        value.ok_or_else(|| {
            Error::InvalidState(format!("option '{}' is not set", key.as_ref())).to_adbc()
        })
    }

    fn get_option_bytes(&self, key: Self::Option) -> Result<Vec<u8>> {
        Err(Error::InvalidArgument(format!(
            "unknown database option '{}'",
            key.as_ref()
        ))
        .to_adbc())
    }

    fn get_option_int(&self, key: Self::Option) -> Result<i64> {
        Err(Error::InvalidArgument(format!(
            "unknown database option '{}'",
            key.as_ref()
        ))
        .to_adbc())
    }

    fn get_option_double(&self, key: Self::Option) -> Result<f64> {
        Err(Error::InvalidArgument(format!(
            "unknown database option '{}'",
            key.as_ref()
        ))
        .to_adbc())
    }
}

impl adbc_core::Database for Database {
    type ConnectionType = Connection;

    fn new_connection(&self) -> Result<Self::ConnectionType> {
        init_logging(&self.log_config);

        if self.connection_mode == ConnectionMode::PostgreSql {
            return Err(adbc_core::error::Error::with_message_and_status(
                "the postgresql connection mode is not implemented; use 'native'",
                adbc_core::error::Status::NotImplemented,
            ));
        }

        let host = self
            .host
            .clone()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                Error::InvalidArgument("option 'adbc.cube.host' is not set".into()).to_adbc()
            })?;
        let port = self.parse_port().map_err(|e| e.to_adbc())?;
        let token = self.resolve_token().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "the native connection mode requires a token (set 'adbc.cube.token' or {TOKEN_ENV_VAR})"
            ))
            .to_adbc()
        })?;

        debug!("creating connection to {}:{}", host, port);

        Connection::new(ConnectionConfig {
            host,
            port,
            token,
            database: self.database.clone(),
        })
        .map_err(|e| e.to_adbc())
    }

    fn new_connection_with_opts(
        &self,
        opts: impl IntoIterator<Item = (OptionConnection, OptionValue)>,
    ) -> Result<Self::ConnectionType> {
        let mut connection = self.new_connection()?;
        for (key, value) in opts {
            connection.set_option(key, value)?;
        }
        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(db: &mut Database, key: &str, value: &str) {
        db.set_option(
            OptionDatabase::Other(key.into()),
            OptionValue::String(value.into()),
        )
        .unwrap();
    }

    #[test]
    fn test_database_set_options() {
        let mut db = Database::new();
        set(&mut db, "adbc.cube.host", "localhost");
        set(&mut db, "adbc.cube.port", "4445");
        set(&mut db, "adbc.cube.token", "secret");
        set(&mut db, "adbc.cube.database", "analytics");

        assert_eq!(db.host(), Some("localhost"));
        assert_eq!(db.port(), Some("4445"));
        assert_eq!(db.database(), Some("analytics"));
        assert_eq!(
            db.get_option_string(OptionDatabase::Other("adbc.cube.host".into()))
                .unwrap(),
            "localhost"
        );
    }

    #[test]
    fn test_connection_mode_parsing() {
        let mut db = Database::new();
        assert_eq!(db.connection_mode(), ConnectionMode::Native);

        set(&mut db, "adbc.cube.connection_mode", "ARROW_NATIVE");
        assert_eq!(db.connection_mode(), ConnectionMode::Native);

        set(&mut db, "adbc.cube.connection_mode", "PostgreSQL");
        assert_eq!(db.connection_mode(), ConnectionMode::PostgreSql);

        let err = db
            .set_option(
                OptionDatabase::Other("adbc.cube.connection_mode".into()),
                OptionValue::String("carrier-pigeon".into()),
            )
            .unwrap_err();
        assert_eq!(err.status, adbc_core::error::Status::InvalidArguments);
    }

    #[test]
    fn test_unknown_option_rejected() {
        let mut db = Database::new();
        let err = db
            .set_option(
                OptionDatabase::Other("adbc.cube.bogus".into()),
                OptionValue::String("x".into()),
            )
            .unwrap_err();
        assert_eq!(err.status, adbc_core::error::Status::InvalidArguments);
    }

    #[test]
    fn test_non_string_value_rejected() {
        let mut db = Database::new();
        let err = db
            .set_option(
                OptionDatabase::Other("adbc.cube.host".into()),
                OptionValue::Int(1),
            )
            .unwrap_err();
        assert_eq!(err.status, adbc_core::error::Status::InvalidArguments);
    }

    #[test]
    fn test_port_validation() {
        let mut db = Database::new();
        set(&mut db, "adbc.cube.port", "4445");
        assert_eq!(db.parse_port().unwrap(), 4445);

        for bad in ["0", "-1", "65536", "not-a-port", ""] {
            set(&mut db, "adbc.cube.port", bad);
            assert!(db.parse_port().is_err(), "{bad:?}");
        }
    }

    #[test]
    fn test_new_connection_missing_options() {
        use adbc_core::Database as _;

        let db = Database::new();
        let err = db.new_connection().unwrap_err();
        assert_eq!(err.status, adbc_core::error::Status::InvalidArguments);
    }

    #[test]
    fn test_postgresql_mode_not_implemented() {
        use adbc_core::Database as _;

        let mut db = Database::new();
        set(&mut db, "adbc.cube.host", "localhost");
        set(&mut db, "adbc.cube.port", "5432");
        set(&mut db, "adbc.cube.token", "secret");
        set(&mut db, "adbc.cube.connection_mode", "postgresql");

        let err = db.new_connection().unwrap_err();
        assert_eq!(err.status, adbc_core::error::Status::NotImplemented);
    }
}
