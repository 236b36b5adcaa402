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

//! Connection implementation for the Cube ADBC driver.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use adbc_core::error::{Result, Status};
use adbc_core::options::{InfoCode, ObjectDepth, OptionConnection, OptionValue};
use adbc_core::{schemas, Optionable};
use arrow_array::builder::{BooleanBuilder, Int32Builder, Int64Builder, StringBuilder};
use arrow_array::{
    Array, ArrayRef, ListArray, MapArray, RecordBatch, RecordBatchIterator, RecordBatchReader,
    StringArray, StructArray, UInt32Array, UnionArray,
};
use arrow_buffer::{OffsetBuffer, ScalarBuffer};
use arrow_schema::{ArrowError, DataType, Field, Schema, UnionFields};
use tracing::debug;

use crate::client::{lock_client, NativeClient};
use crate::error::Error;
use crate::metadata;
use crate::reader::{ipc, NativeQueryReader, ResultReader, ResultReaderAdapter};
use crate::statement::Statement;

/// Configuration passed from Database to Connection.
pub(crate) struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub token: String,
    pub database: Option<String>,
}

/// Represents an active session with a Cube native-protocol server.
///
/// A Connection is created from a Database and creates Statements for
/// executing SQL. It owns the native client; statements share it through
/// a mutex, which also enforces the one-query-at-a-time session rule.
#[derive(Debug)]
pub struct Connection {
    host: String,
    port: u16,
    client: Arc<Mutex<NativeClient>>,
    session_id: String,
}

/// Type alias for the empty reader used by unimplemented methods.
type EmptyReader =
    RecordBatchIterator<std::vec::IntoIter<std::result::Result<RecordBatch, ArrowError>>>;

impl Connection {
    /// Called by `Database::new_connection()`. Dials the server, performs
    /// the handshake, and authenticates before returning.
    pub(crate) fn new(config: ConnectionConfig) -> crate::error::Result<Self> {
        let mut client = NativeClient::new();
        client.connect(&config.host, config.port)?;
        client.authenticate(&config.token, config.database.as_deref())?;

        let session_id = client.session_id().unwrap_or_default().to_string();
        debug!(
            "session {} established with {} ({}:{})",
            session_id,
            client.server_version().unwrap_or("unknown server"),
            config.host,
            config.port
        );

        Ok(Self {
            host: config.host,
            port: config.port,
            client: Arc::new(Mutex::new(client)),
            session_id,
        })
    }

    /// Returns the server host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the server port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the session ID assigned at authentication.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Build the `get_info` result batch: a union-typed value column keyed
    /// by info code. All values this driver reports are strings.
    fn info_batch(codes: Option<HashSet<InfoCode>>) -> Result<RecordBatch> {
        let return_all = codes.is_none();
        let codes = codes.unwrap_or_default();
        let wanted = |code: &InfoCode| return_all || codes.contains(code);

        let mut entries: Vec<(u32, &str)> = Vec::new();
        if wanted(&InfoCode::VendorName) {
            entries.push((Into::<u32>::into(&InfoCode::VendorName), "Cube"));
        }
        if wanted(&InfoCode::DriverName) {
            entries.push((
                Into::<u32>::into(&InfoCode::DriverName),
                "ADBC Cube Driver",
            ));
        }
        if wanted(&InfoCode::DriverVersion) {
            entries.push((
                Into::<u32>::into(&InfoCode::DriverVersion),
                env!("CARGO_PKG_VERSION"),
            ));
        }

        let name_array = UInt32Array::from(entries.iter().map(|e| e.0).collect::<Vec<_>>());
        let string_values =
            StringArray::from(entries.iter().map(|e| e.1).collect::<Vec<_>>());

        // Every entry is a string, so all type ids are 0 and the offsets
        // walk the string child. The other union children stay empty.
        let type_ids: ScalarBuffer<i8> = entries.iter().map(|_| 0i8).collect();
        let offsets: ScalarBuffer<i32> = (0..entries.len() as i32).collect();

        let bool_values = BooleanBuilder::new().finish();
        let int64_values = Int64Builder::new().finish();
        let int32_values = Int32Builder::new().finish();
        let string_list = ListArray::new(
            Arc::new(Field::new("item", DataType::Utf8, true)),
            OffsetBuffer::new(ScalarBuffer::from(vec![0i32])),
            Arc::new(StringBuilder::new().finish()),
            None,
        );
        let map_entry_fields = vec![
            Field::new("key", DataType::Int32, false),
            Field::new_list("value", Field::new_list_field(DataType::Int32, true), true),
        ];
        let map_values = MapArray::try_new(
            Arc::new(Field::new_struct("entries", map_entry_fields.clone(), false)),
            OffsetBuffer::new(ScalarBuffer::from(vec![0i32])),
            StructArray::new(
                map_entry_fields.into(),
                vec![
                    Arc::new(Int32Builder::new().finish()) as ArrayRef,
                    Arc::new(ListArray::new(
                        Arc::new(Field::new("item", DataType::Int32, true)),
                        OffsetBuffer::new(ScalarBuffer::from(vec![0i32])),
                        Arc::new(Int32Builder::new().finish()),
                        None,
                    )),
                ],
                None,
            ),
            None,
            false,
        )?;

        let value_array = UnionArray::try_new(
            UnionFields::new(
                [0, 1, 2, 3, 4, 5],
                [
                    Field::new("string_value", DataType::Utf8, true),
                    Field::new("bool_value", DataType::Boolean, true),
                    Field::new("int64_value", DataType::Int64, true),
                    Field::new("int32_bitmask", DataType::Int32, true),
                    Field::new("string_list", string_list.data_type().clone(), true),
                    Field::new(
                        "int32_to_int32_list_map",
                        map_values.data_type().clone(),
                        true,
                    ),
                ],
            ),
            type_ids,
            Some(offsets),
            vec![
                Arc::new(string_values),
                Arc::new(bool_values),
                Arc::new(int64_values),
                Arc::new(int32_values),
                Arc::new(string_list),
                Arc::new(map_values),
            ],
        )?;

        Ok(RecordBatch::try_new(
            schemas::GET_INFO_SCHEMA.clone(),
            vec![Arc::new(name_array), Arc::new(value_array)],
        )?)
    }
}

impl Optionable for Connection {
    type Option = OptionConnection;

    fn set_option(&mut self, key: Self::Option, _value: OptionValue) -> Result<()> {
        match key {
            // Cube is auto-commit only; accept and ignore.
            OptionConnection::AutoCommit => Ok(()),
            _ => Err(Error::InvalidArgument(format!(
                "unknown connection option '{}'",
                key.as_ref()
            ))
            .to_adbc()),
        }
    }

    fn get_option_string(&self, key: Self::Option) -> Result<String> {
        Err(Error::InvalidArgument(format!(
            "unknown connection option '{}'",
            key.as_ref()
        ))
        .to_adbc())
    }

    fn get_option_bytes(&self, key: Self::Option) -> Result<Vec<u8>> {
        Err(Error::InvalidArgument(format!(
            "unknown connection option '{}'",
            key.as_ref()
        ))
        .to_adbc())
    }

    fn get_option_int(&self, key: Self::Option) -> Result<i64> {
        Err(Error::InvalidArgument(format!(
            "unknown connection option '{}'",
            key.as_ref()
        ))
        .to_adbc())
    }

    fn get_option_double(&self, key: Self::Option) -> Result<f64> {
        Err(Error::InvalidArgument(format!(
            "unknown connection option '{}'",
            key.as_ref()
        ))
        .to_adbc())
    }
}

impl adbc_core::Connection for Connection {
    type StatementType = Statement;

    fn new_statement(&mut self) -> Result<Self::StatementType> {
        Ok(Statement::new(self.client.clone()))
    }

    fn cancel(&mut self) -> Result<()> {
        // No in-band cancellation; hosts shut the socket down out-of-band.
        Ok(())
    }

    fn get_info(&self, codes: Option<HashSet<InfoCode>>) -> Result<impl RecordBatchReader + Send> {
        let batch = Self::info_batch(codes)?;
        let reader: Box<dyn ResultReader + Send> =
            Box::new(NativeQueryReader::from_batch(batch));
        ResultReaderAdapter::new(reader).map_err(|e| e.to_adbc())
    }

    fn get_objects(
        &self,
        _depth: ObjectDepth,
        _catalog: Option<&str>,
        _db_schema: Option<&str>,
        _table_name: Option<&str>,
        _table_type: Option<Vec<&str>>,
        _column_name: Option<&str>,
    ) -> Result<impl RecordBatchReader + Send> {
        Err::<EmptyReader, _>(
            Error::Unsupported("get_objects is not implemented".into()).to_adbc(),
        )
    }

    fn get_table_schema(
        &self,
        catalog: Option<&str>,
        db_schema: Option<&str>,
        table_name: &str,
    ) -> Result<Schema> {
        debug!(
            "get_table_schema: catalog={:?}, db_schema={:?}, table_name={}",
            catalog, db_schema, table_name
        );

        if table_name.is_empty() {
            return Err(Error::InvalidArgument("table name cannot be empty".into()).to_adbc());
        }

        let query = metadata::table_columns_query(db_schema, table_name);
        let outcome = lock_client(&self.client)
            .and_then(|mut client| client.execute_query(&query))
            .map_err(|e| e.to_adbc())?;
        let parsed = ipc::parse_stream(&outcome.ipc).map_err(|e| e.to_adbc())?;

        let columns = match parsed.batch {
            Some(batch) if batch.num_rows() > 0 => batch,
            _ => {
                return Err(adbc_core::error::Error::with_message_and_status(
                    format!("table not found: {table_name}"),
                    Status::NotFound,
                ))
            }
        };

        metadata::table_schema_from_batch(&columns).map_err(|e| e.to_adbc())
    }

    fn get_table_types(&self) -> Result<impl RecordBatchReader + Send> {
        let batch = RecordBatch::try_new(
            schemas::GET_TABLE_TYPES_SCHEMA.clone(),
            vec![Arc::new(StringArray::from(vec!["table", "view"]))],
        )?;
        let reader: Box<dyn ResultReader + Send> =
            Box::new(NativeQueryReader::from_batch(batch));
        ResultReaderAdapter::new(reader).map_err(|e| e.to_adbc())
    }

    fn get_statistic_names(&self) -> Result<impl RecordBatchReader + Send> {
        Err::<EmptyReader, _>(
            Error::Unsupported("get_statistic_names is not implemented".into()).to_adbc(),
        )
    }

    fn get_statistics(
        &self,
        _catalog: Option<&str>,
        _db_schema: Option<&str>,
        _table_name: Option<&str>,
        _approximate: bool,
    ) -> Result<impl RecordBatchReader + Send> {
        Err::<EmptyReader, _>(
            Error::Unsupported("get_statistics is not implemented".into()).to_adbc(),
        )
    }

    fn commit(&mut self) -> Result<()> {
        // Cube is auto-commit only.
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        Err(Error::Unsupported("rollback: Cube is auto-commit only".into()).to_adbc())
    }

    fn read_partition(&self, _partition: impl AsRef<[u8]>) -> Result<impl RecordBatchReader + Send> {
        Err::<EmptyReader, _>(
            Error::Unsupported("read_partition is not implemented".into()).to_adbc(),
        )
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        debug!("closing session {}", self.session_id);
        if let Ok(mut client) = self.client.lock() {
            client.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adbc_core::options::InfoCode;
    use arrow_array::cast::AsArray;

    #[test]
    fn test_info_batch_all_codes() {
        let batch = Connection::info_batch(None).unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.schema(), schemas::GET_INFO_SCHEMA.clone());

        let names = batch.column(0).as_primitive::<arrow_array::types::UInt32Type>();
        let driver_name_code: u32 = (&InfoCode::DriverName).into();
        assert!(names.values().contains(&driver_name_code));
    }

    #[test]
    fn test_info_batch_filtered() {
        let mut codes = HashSet::new();
        codes.insert(InfoCode::DriverName);
        let batch = Connection::info_batch(Some(codes)).unwrap();
        assert_eq!(batch.num_rows(), 1);
    }

    #[test]
    fn test_info_batch_empty_filter() {
        let batch = Connection::info_batch(Some(HashSet::new())).unwrap();
        assert_eq!(batch.num_rows(), 0);
    }
}
