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

//! Result readers for native query results.
//!
//! This module provides:
//! - `ipc`: the Arrow IPC streaming-format parser
//! - `stream`: the Arrow C stream export for FFI consumers
//! - `NativeQueryReader`: the single-shot reader over a parsed result
//! - `ResultReaderAdapter`: bridges `ResultReader` to arrow's
//!   `RecordBatchReader`

pub mod ipc;
pub mod stream;

use arrow_array::{RecordBatch, RecordBatchReader};
use arrow_schema::{ArrowError, SchemaRef};

use crate::error::Result;
use ipc::ParsedStream;

/// Trait for result readers.
pub trait ResultReader: Send {
    /// Get the schema of the result.
    fn schema(&self) -> Result<SchemaRef>;

    /// Get the next record batch, or None at end of results.
    fn next_batch(&mut self) -> Result<Option<RecordBatch>>;
}

/// Reader over one parsed native query result.
///
/// The native protocol delivers at most one batch per query, so the reader
/// is single-shot: it yields that batch (if any) once, then reports end of
/// stream. The schema stays available throughout.
#[derive(Debug)]
pub struct NativeQueryReader {
    schema: SchemaRef,
    batch: Option<RecordBatch>,
}

impl NativeQueryReader {
    /// Wrap a parsed IPC stream.
    pub fn new(parsed: ParsedStream) -> Self {
        Self {
            schema: parsed.schema,
            batch: parsed.batch,
        }
    }

    /// Build a reader over an already-materialized batch (used for
    /// driver-produced metadata results).
    pub(crate) fn from_batch(batch: RecordBatch) -> Self {
        Self {
            schema: batch.schema(),
            batch: Some(batch),
        }
    }
}

impl ResultReader for NativeQueryReader {
    fn schema(&self) -> Result<SchemaRef> {
        Ok(self.schema.clone())
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        Ok(self.batch.take())
    }
}

/// Adapter to make a ResultReader work as arrow's RecordBatchReader.
pub struct ResultReaderAdapter {
    inner: Box<dyn ResultReader + Send>,
    schema: SchemaRef,
}

impl ResultReaderAdapter {
    /// Create a new adapter wrapping a ResultReader.
    pub fn new(inner: Box<dyn ResultReader + Send>) -> Result<Self> {
        let schema = inner.schema()?;
        Ok(Self { inner, schema })
    }
}

impl RecordBatchReader for ResultReaderAdapter {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }
}

impl Iterator for ResultReaderAdapter {
    type Item = std::result::Result<RecordBatch, ArrowError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => None,
            Err(e) => Some(Err(ArrowError::ExternalError(Box::new(
                std::io::Error::other(e.to_string()),
            )))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::Int64Array;
    use arrow_schema::{DataType, Field, Schema};
    use std::sync::Arc;

    fn test_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "answer",
            DataType::Int64,
            true,
        )]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![42i64]))]).unwrap()
    }

    #[test]
    fn test_reader_is_single_shot() {
        let batch = test_batch();
        let mut reader = NativeQueryReader::from_batch(batch);

        assert!(reader.schema().is_ok());
        let first = reader.next_batch().unwrap();
        assert_eq!(first.unwrap().num_rows(), 1);

        // Exhausted after one batch; schema still available.
        assert!(reader.next_batch().unwrap().is_none());
        assert!(reader.next_batch().unwrap().is_none());
        assert_eq!(reader.schema().unwrap().fields().len(), 1);
    }

    #[test]
    fn test_empty_result_reader() {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "answer",
            DataType::Int64,
            true,
        )]));
        let mut reader = NativeQueryReader::new(ParsedStream {
            schema: schema.clone(),
            batch: None,
        });

        assert_eq!(reader.schema().unwrap(), schema);
        assert!(reader.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_adapter_iterates_once() {
        let reader = NativeQueryReader::from_batch(test_batch());
        let mut adapter = ResultReaderAdapter::new(Box::new(reader)).unwrap();

        assert_eq!(
            RecordBatchReader::schema(&adapter).field(0).name(),
            "answer"
        );
        let batch = adapter.next().unwrap().unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert!(adapter.next().is_none());
    }
}
