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

//! Statement implementation for the Cube ADBC driver.

use std::sync::{Arc, Mutex};

use adbc_core::error::Result;
use adbc_core::options::{OptionStatement, OptionValue};
use adbc_core::{Optionable, PartitionedResult};
use arrow_array::ffi_stream::FFI_ArrowArrayStream;
use arrow_array::{RecordBatch, RecordBatchReader};
use arrow_schema::Schema;
use tracing::debug;

use crate::client::{lock_client, NativeClient, QueryOutcome};
use crate::error::Error;
use crate::params;
use crate::reader::{ipc, NativeQueryReader, ResultReader, ResultReaderAdapter};

/// Represents a SQL statement executed against a Cube session.
///
/// Statements share the connection's native client; the session runs one
/// query at a time.
#[derive(Debug)]
pub struct Statement {
    client: Arc<Mutex<NativeClient>>,
    query: Option<String>,
    parameters: Option<RecordBatch>,
}

impl Statement {
    pub(crate) fn new(client: Arc<Mutex<NativeClient>>) -> Self {
        Self {
            client,
            query: None,
            parameters: None,
        }
    }

    fn sql(&self) -> crate::error::Result<&str> {
        self.query
            .as_deref()
            .ok_or_else(|| Error::InvalidState("no SQL query set".into()))
    }

    fn run(&self) -> crate::error::Result<QueryOutcome> {
        let sql = self.sql()?;
        if let Some(ref parameters) = self.parameters {
            // The wire protocol has no parameter field yet; values are
            // converted for validation but not transmitted.
            // TODO: send converted parameters once the protocol grows a
            // parameter field on QueryRequest.
            let converted = params::convert_row(parameters, 0)?;
            debug!(
                "executing with {} bound parameters (not transmitted)",
                converted.len()
            );
        }
        lock_client(&self.client)?.execute_query(sql)
    }

    /// Execute the statement into a caller-supplied Arrow C stream handle.
    ///
    /// The handle is zero-initialized before any fallible work, so callers
    /// may release it unconditionally even when this returns an error.
    /// Returns the server-reported affected row count (`-1` if unknown).
    pub fn execute_into_stream(&self, out: &mut FFI_ArrowArrayStream) -> crate::error::Result<i64> {
        *out = FFI_ArrowArrayStream::empty();
        let sql = self.sql()?;
        lock_client(&self.client)?.execute_query_into(sql, out)
    }
}

impl Optionable for Statement {
    type Option = OptionStatement;

    fn set_option(&mut self, key: Self::Option, _value: OptionValue) -> Result<()> {
        match key {
            OptionStatement::TargetTable | OptionStatement::IngestMode => {
                Err(Error::Unsupported("bulk ingestion is not supported".into()).to_adbc())
            }
            _ => Err(Error::InvalidArgument(format!(
                "unknown statement option '{}'",
                key.as_ref()
            ))
            .to_adbc()),
        }
    }

    fn get_option_string(&self, key: Self::Option) -> Result<String> {
        Err(Error::InvalidArgument(format!(
            "unknown statement option '{}'",
            key.as_ref()
        ))
        .to_adbc())
    }

    fn get_option_bytes(&self, key: Self::Option) -> Result<Vec<u8>> {
        Err(Error::InvalidArgument(format!(
            "unknown statement option '{}'",
            key.as_ref()
        ))
        .to_adbc())
    }

    fn get_option_int(&self, key: Self::Option) -> Result<i64> {
        Err(Error::InvalidArgument(format!(
            "unknown statement option '{}'",
            key.as_ref()
        ))
        .to_adbc())
    }

    fn get_option_double(&self, key: Self::Option) -> Result<f64> {
        Err(Error::InvalidArgument(format!(
            "unknown statement option '{}'",
            key.as_ref()
        ))
        .to_adbc())
    }
}

impl adbc_core::Statement for Statement {
    fn bind(&mut self, batch: RecordBatch) -> Result<()> {
        if batch.num_rows() == 0 {
            return Err(
                Error::InvalidArgument("parameter batch must have at least one row".into())
                    .to_adbc(),
            );
        }
        // Convert eagerly so unsupported parameter types fail at bind time.
        params::convert_row(&batch, 0).map_err(|e| e.to_adbc())?;
        self.parameters = Some(batch);
        Ok(())
    }

    fn bind_stream(&mut self, mut reader: Box<dyn RecordBatchReader + Send>) -> Result<()> {
        let batch = reader
            .next()
            .transpose()?
            .ok_or_else(|| Error::InvalidArgument("parameter stream is empty".into()).to_adbc())?;
        self.bind(batch)
    }

    fn cancel(&mut self) -> Result<()> {
        // No in-band cancellation; hosts shut the socket down out-of-band.
        Ok(())
    }

    fn execute(&mut self) -> Result<impl RecordBatchReader + Send> {
        let outcome = self.run().map_err(|e| e.to_adbc())?;
        let parsed = ipc::parse_stream(&outcome.ipc).map_err(|e| e.to_adbc())?;
        let reader: Box<dyn ResultReader + Send> = Box::new(NativeQueryReader::new(parsed));
        ResultReaderAdapter::new(reader).map_err(|e| e.to_adbc())
    }

    fn execute_update(&mut self) -> Result<Option<i64>> {
        let outcome = self.run().map_err(|e| e.to_adbc())?;
        // -1 is the protocol's "unknown" marker.
        if outcome.rows_affected < 0 {
            Ok(None)
        } else {
            Ok(Some(outcome.rows_affected))
        }
    }

    fn execute_schema(&mut self) -> Result<Schema> {
        Err(Error::Unsupported("execute_schema is not implemented".into()).to_adbc())
    }

    fn execute_partitions(&mut self) -> Result<PartitionedResult> {
        Err(Error::Unsupported("execute_partitions is not implemented".into()).to_adbc())
    }

    fn get_parameter_schema(&self) -> Result<Schema> {
        match self.parameters {
            Some(ref batch) => Ok(batch.schema().as_ref().clone()),
            None => Err(Error::InvalidState("no parameters bound".into()).to_adbc()),
        }
    }

    fn prepare(&mut self) -> Result<()> {
        // Queries are sent verbatim; there is no server-side prepare step.
        self.sql().map_err(|e| e.to_adbc())?;
        Ok(())
    }

    fn set_sql_query(&mut self, query: impl AsRef<str>) -> Result<()> {
        self.query = Some(query.as_ref().to_string());
        Ok(())
    }

    fn set_substrait_plan(&mut self, _plan: impl AsRef<[u8]>) -> Result<()> {
        Err(Error::Unsupported("Substrait plans are not supported".into()).to_adbc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adbc_core::Statement as _;
    use arrow_array::Int64Array;
    use arrow_schema::{DataType, Field};

    fn statement() -> Statement {
        Statement::new(Arc::new(Mutex::new(NativeClient::new())))
    }

    #[test]
    fn test_execute_without_query() {
        let mut stmt = statement();
        let err = stmt.execute().err().unwrap();
        assert_eq!(err.status, adbc_core::error::Status::InvalidState);
    }

    #[test]
    fn test_set_sql_query() {
        let mut stmt = statement();
        stmt.set_sql_query("SELECT 1").unwrap();
        assert_eq!(stmt.sql().unwrap(), "SELECT 1");
    }

    #[test]
    fn test_prepare_requires_query() {
        let mut stmt = statement();
        assert!(stmt.prepare().is_err());
        stmt.set_sql_query("SELECT 1").unwrap();
        assert!(stmt.prepare().is_ok());
    }

    #[test]
    fn test_bind_and_parameter_schema() {
        let mut stmt = statement();
        assert!(stmt.get_parameter_schema().is_err());

        let schema = Arc::new(Schema::new(vec![Field::new("p0", DataType::Int64, true)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![5i64]))]).unwrap();
        stmt.bind(batch).unwrap();

        let param_schema = stmt.get_parameter_schema().unwrap();
        assert_eq!(param_schema.field(0).name(), "p0");
    }

    #[test]
    fn test_bind_empty_batch_rejected() {
        let mut stmt = statement();
        let schema = Arc::new(Schema::new(vec![Field::new("p0", DataType::Int64, true)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Int64Array::from(Vec::<i64>::new()))],
        )
        .unwrap();
        assert!(stmt.bind(batch).is_err());
    }

    #[test]
    fn test_execute_into_stream_zeroes_handle_on_error() {
        // No query set: the call fails, but the handle must still be a
        // safely releasable zero-initialized stream.
        let stmt = statement();
        let mut stream = FFI_ArrowArrayStream::empty();
        assert!(stmt.execute_into_stream(&mut stream).is_err());
        assert!(stream.release.is_none());
        assert!(stream.private_data.is_null());
    }
}
