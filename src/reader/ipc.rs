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

//! Arrow IPC streaming-format parser for native query results.
//!
//! Walks the encapsulated message framing directly: a `0xFFFFFFFF`
//! continuation word, a little-endian metadata length, a FlatBuffer-encoded
//! `Message`, padding to the next 8-byte boundary, then (for record
//! batches) the body buffers. The FlatBuffer metadata itself is decoded
//! with the generated bindings from `arrow_ipc`; the framing walk, the
//! buffer cursor, and the value materialization live here.
//!
//! The server sends one schema and at most one record batch per query, so
//! the parser handles exactly that shape: a stream that ends (or hits the
//! end-of-stream marker) before a batch yields a schema with no batch.
//! Values are copied out of the body through typed builders; the source
//! buffer can be dropped as soon as parsing returns.

use std::sync::Arc;

use arrow_array::builder::{
    BinaryBuilder, BooleanBuilder, Date32Builder, Date64Builder, Float32Builder, Float64Builder,
    Int16Builder, Int32Builder, Int64Builder, Int8Builder, StringBuilder,
    Time64MicrosecondBuilder, TimestampMicrosecondBuilder, UInt16Builder, UInt32Builder,
    UInt64Builder, UInt8Builder,
};
use arrow_array::{ArrayRef, RecordBatch, RecordBatchOptions};
use arrow_schema::{DataType, Field, Schema, SchemaRef, TimeUnit};

use crate::error::{Error, Result};

/// Marker distinguishing an IPC message from end-of-stream.
const CONTINUATION_MARKER: u32 = 0xFFFF_FFFF;

/// A parsed stream: the schema plus the single record batch, if present.
#[derive(Debug)]
pub struct ParsedStream {
    pub schema: SchemaRef,
    pub batch: Option<RecordBatch>,
}

/// Parse one Arrow IPC byte stream into a schema and at most one batch.
pub fn parse_stream(data: &[u8]) -> Result<ParsedStream> {
    if data.is_empty() {
        return Err(Error::InvalidData("empty Arrow IPC buffer".into()));
    }

    let mut cursor = StreamCursor::new(data);

    let schema_bytes = cursor
        .next_message()?
        .ok_or_else(|| Error::InvalidData("Arrow IPC stream ends before the schema".into()))?;
    let message = arrow_ipc::root_as_message(schema_bytes)
        .map_err(|e| Error::InvalidData(format!("invalid Schema FlatBuffer: {e}")))?;
    if message.header_type() != arrow_ipc::MessageHeader::Schema {
        return Err(Error::InvalidData(format!(
            "expected a Schema message, got {:?}",
            message.header_type()
        )));
    }
    let fb_schema = message
        .header_as_schema()
        .ok_or_else(|| Error::InvalidData("Schema message has no schema header".into()))?;
    let schema = Arc::new(schema_from_flatbuffer(fb_schema)?);

    let Some(batch_bytes) = cursor.next_message()? else {
        // End of stream before any batch: a valid empty result.
        return Ok(ParsedStream {
            schema,
            batch: None,
        });
    };
    let message = arrow_ipc::root_as_message(batch_bytes)
        .map_err(|e| Error::InvalidData(format!("invalid RecordBatch FlatBuffer: {e}")))?;
    if message.header_type() != arrow_ipc::MessageHeader::RecordBatch {
        return Err(Error::InvalidData(format!(
            "expected a RecordBatch message, got {:?}",
            message.header_type()
        )));
    }
    let fb_batch = message
        .header_as_record_batch()
        .ok_or_else(|| Error::InvalidData("RecordBatch message has no batch header".into()))?;
    let body_len = usize::try_from(message.bodyLength())
        .map_err(|_| Error::InvalidData("negative record batch body length".into()))?;
    let body = cursor.take_body(body_len)?;

    let batch = decode_record_batch(&schema, fb_batch, body)?;
    Ok(ParsedStream {
        schema,
        batch: Some(batch),
    })
}

/// Cursor over the encapsulated-message framing.
struct StreamCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> StreamCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_u32_le(&mut self) -> Result<u32> {
        let end = self.pos + 4;
        if end > self.data.len() {
            return Err(Error::InvalidData(
                "truncated Arrow IPC message header".into(),
            ));
        }
        let word = u32::from_le_bytes(self.data[self.pos..end].try_into().unwrap());
        self.pos = end;
        Ok(word)
    }

    /// Advance past the next metadata block and return its FlatBuffer
    /// bytes. Returns `None` at the end-of-stream marker or when the
    /// buffer is exhausted. The cursor lands on the following 8-byte
    /// boundary, where a record batch body would start.
    fn next_message(&mut self) -> Result<Option<&'a [u8]>> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }

        let continuation = self.read_u32_le()?;
        if continuation != CONTINUATION_MARKER {
            return Err(Error::Protocol(format!(
                "invalid Arrow IPC continuation marker 0x{continuation:08x}"
            )));
        }

        let len = self.read_u32_le()? as usize;
        if len == 0 {
            // End-of-stream marker.
            return Ok(None);
        }

        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                Error::InvalidData("Arrow IPC metadata extends past the buffer".into())
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = (end + 7) & !7;
        Ok(Some(bytes))
    }

    fn take_body(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                Error::InvalidData("Arrow IPC body extends past the buffer".into())
            })?;
        let body = &self.data[self.pos..end];
        self.pos = end;
        Ok(body)
    }
}

/// Convert the FlatBuffer schema into an Arrow schema, mapping each field
/// through the supported type subset.
fn schema_from_flatbuffer(fb: arrow_ipc::Schema<'_>) -> Result<Schema> {
    let fields = fb
        .fields()
        .ok_or_else(|| Error::InvalidData("Schema message has no fields vector".into()))?;

    let mut out = Vec::with_capacity(fields.len());
    for field in fields.iter() {
        out.push(field_from_flatbuffer(field)?);
    }
    Ok(Schema::new(out))
}

fn field_from_flatbuffer(field: arrow_ipc::Field<'_>) -> Result<Field> {
    let name = field.name().unwrap_or_default();

    let data_type = match field.type_type() {
        arrow_ipc::Type::Int => {
            let int = field
                .type_as_int()
                .ok_or_else(|| Error::InvalidData("Int field has no Int table".into()))?;
            match (int.bitWidth(), int.is_signed()) {
                (8, true) => DataType::Int8,
                (16, true) => DataType::Int16,
                (32, true) => DataType::Int32,
                (64, true) => DataType::Int64,
                (8, false) => DataType::UInt8,
                (16, false) => DataType::UInt16,
                (32, false) => DataType::UInt32,
                (64, false) => DataType::UInt64,
                (width, _) => {
                    return Err(Error::Unsupported(format!(
                        "unsupported integer width {width} for field '{name}'"
                    )))
                }
            }
        }
        arrow_ipc::Type::FloatingPoint => {
            let fp = field.type_as_floating_point().ok_or_else(|| {
                Error::InvalidData("FloatingPoint field has no FloatingPoint table".into())
            })?;
            match fp.precision() {
                arrow_ipc::Precision::SINGLE => DataType::Float32,
                arrow_ipc::Precision::DOUBLE => DataType::Float64,
                other => {
                    return Err(Error::Unsupported(format!(
                        "unsupported floating-point precision {other:?} for field '{name}'"
                    )))
                }
            }
        }
        arrow_ipc::Type::Bool => DataType::Boolean,
        arrow_ipc::Type::Utf8 => DataType::Utf8,
        arrow_ipc::Type::Binary => DataType::Binary,
        arrow_ipc::Type::Date => {
            let date = field
                .type_as_date()
                .ok_or_else(|| Error::InvalidData("Date field has no Date table".into()))?;
            match date.unit() {
                arrow_ipc::DateUnit::DAY => DataType::Date32,
                arrow_ipc::DateUnit::MILLISECOND => DataType::Date64,
                other => {
                    return Err(Error::Unsupported(format!(
                        "unsupported date unit {other:?} for field '{name}'"
                    )))
                }
            }
        }
        arrow_ipc::Type::Time => DataType::Time64(TimeUnit::Microsecond),
        arrow_ipc::Type::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
        other => {
            return Err(Error::Unsupported(format!(
                "unsupported Arrow type {other:?} for field '{name}'"
            )))
        }
    };

    Ok(Field::new(name, data_type, field.nullable()))
}

/// Cursor over the record batch's `buffers` vector, resolving each entry
/// against the body bytes.
struct BufferCursor<'a> {
    body: &'a [u8],
    buffers: Vec<(i64, i64)>,
    next: usize,
}

impl<'a> BufferCursor<'a> {
    fn next_buffer(&mut self, field_name: &str) -> Result<&'a [u8]> {
        if self.next >= self.buffers.len() {
            return Err(Error::InvalidData(format!(
                "record batch ran out of buffers at field '{field_name}'"
            )));
        }
        let (raw_offset, raw_length) = self.buffers[self.next];
        self.next += 1;

        let offset = usize::try_from(raw_offset)
            .map_err(|_| Error::InvalidData("negative buffer offset".into()))?;
        let length = usize::try_from(raw_length)
            .map_err(|_| Error::InvalidData("negative buffer length".into()))?;
        let end = offset
            .checked_add(length)
            .filter(|end| *end <= self.body.len())
            .ok_or_else(|| {
                Error::InvalidData(format!(
                    "buffer for field '{field_name}' extends past the batch body"
                ))
            })?;
        Ok(&self.body[offset..end])
    }
}

fn decode_record_batch(
    schema: &SchemaRef,
    batch: arrow_ipc::RecordBatch<'_>,
    body: &[u8],
) -> Result<RecordBatch> {
    let rows = usize::try_from(batch.length())
        .map_err(|_| Error::InvalidData("negative record batch length".into()))?;
    let nodes = batch
        .nodes()
        .ok_or_else(|| Error::InvalidData("record batch has no field nodes".into()))?;
    let buffers = batch
        .buffers()
        .ok_or_else(|| Error::InvalidData("record batch has no buffers vector".into()))?;

    if nodes.len() != schema.fields().len() {
        return Err(Error::InvalidData(format!(
            "record batch has {} field nodes but the schema has {} fields",
            nodes.len(),
            schema.fields().len()
        )));
    }

    let mut cursor = BufferCursor {
        body,
        buffers: (0..buffers.len())
            .map(|i| {
                let buffer = buffers.get(i);
                (buffer.offset(), buffer.length())
            })
            .collect(),
        next: 0,
    };

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
    for (i, field) in schema.fields().iter().enumerate() {
        let node = nodes.get(i);
        if usize::try_from(node.length()).ok() != Some(rows) {
            return Err(Error::InvalidData(format!(
                "field '{}' has {} rows, batch has {rows}",
                field.name(),
                node.length()
            )));
        }
        columns.push(decode_column(field.as_ref(), rows, &mut cursor)?);
    }

    RecordBatch::try_new_with_options(
        schema.clone(),
        columns,
        &RecordBatchOptions::new().with_row_count(Some(rows)),
    )
    .map_err(|e| Error::Internal(format!("failed to assemble record batch: {e}")))
}

/// Build one column, consuming this field's buffers from the cursor:
/// validity first, then an offsets buffer for variable-length types, then
/// the data buffer.
fn decode_column(field: &Field, rows: usize, cursor: &mut BufferCursor<'_>) -> Result<ArrayRef> {
    let name = field.name();

    let validity = cursor.next_buffer(name)?;
    let validity = if validity.is_empty() {
        // A zero-length validity buffer means every row is valid.
        None
    } else {
        if validity.len() < rows.div_ceil(8) {
            return Err(Error::InvalidData(format!(
                "validity buffer for field '{name}' is too small"
            )));
        }
        Some(validity)
    };

    macro_rules! fixed {
        ($builder:ty, $native:ty) => {{
            let data = cursor.next_buffer(name)?;
            let width = std::mem::size_of::<$native>();
            let needed = rows
                .checked_mul(width)
                .ok_or_else(|| Error::InvalidData("record batch length overflow".into()))?;
            if data.len() < needed {
                return Err(Error::InvalidData(format!(
                    "data buffer for field '{name}' is {} bytes, need {needed}",
                    data.len()
                )));
            }
            let mut builder = <$builder>::with_capacity(rows);
            for (i, chunk) in data[..needed].chunks_exact(width).enumerate() {
                if bit_is_set(validity, i) {
                    builder.append_value(<$native>::from_le_bytes(chunk.try_into().unwrap()));
                } else {
                    builder.append_null();
                }
            }
            Ok(Arc::new(builder.finish()) as ArrayRef)
        }};
    }

    match field.data_type() {
        DataType::Int8 => fixed!(Int8Builder, i8),
        DataType::Int16 => fixed!(Int16Builder, i16),
        DataType::Int32 => fixed!(Int32Builder, i32),
        DataType::Int64 => fixed!(Int64Builder, i64),
        DataType::UInt8 => fixed!(UInt8Builder, u8),
        DataType::UInt16 => fixed!(UInt16Builder, u16),
        DataType::UInt32 => fixed!(UInt32Builder, u32),
        DataType::UInt64 => fixed!(UInt64Builder, u64),
        DataType::Float32 => fixed!(Float32Builder, f32),
        DataType::Float64 => fixed!(Float64Builder, f64),
        DataType::Date32 => fixed!(Date32Builder, i32),
        DataType::Date64 => fixed!(Date64Builder, i64),
        DataType::Time64(TimeUnit::Microsecond) => fixed!(Time64MicrosecondBuilder, i64),
        DataType::Timestamp(TimeUnit::Microsecond, None) => {
            fixed!(TimestampMicrosecondBuilder, i64)
        }
        DataType::Boolean => {
            let data = cursor.next_buffer(name)?;
            if data.len() < rows.div_ceil(8) {
                return Err(Error::InvalidData(format!(
                    "boolean data buffer for field '{name}' is too small"
                )));
            }
            let mut builder = BooleanBuilder::with_capacity(rows);
            for i in 0..rows {
                if bit_is_set(validity, i) {
                    builder.append_value(data[i / 8] & (1 << (i % 8)) != 0);
                } else {
                    builder.append_null();
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        DataType::Utf8 => {
            let offsets = cursor.next_buffer(name)?;
            let data = cursor.next_buffer(name)?;
            let mut builder = StringBuilder::with_capacity(rows, data.len());
            for i in 0..rows {
                if bit_is_set(validity, i) {
                    let bytes = var_len_slice(name, offsets, data, i)?;
                    let value = std::str::from_utf8(bytes).map_err(|_| {
                        Error::InvalidData(format!(
                            "invalid UTF-8 in string field '{name}' at row {i}"
                        ))
                    })?;
                    builder.append_value(value);
                } else {
                    builder.append_null();
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        DataType::Binary => {
            let offsets = cursor.next_buffer(name)?;
            let data = cursor.next_buffer(name)?;
            let mut builder = BinaryBuilder::with_capacity(rows, data.len());
            for i in 0..rows {
                if bit_is_set(validity, i) {
                    builder.append_value(var_len_slice(name, offsets, data, i)?);
                } else {
                    builder.append_null();
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        other => Err(Error::Unsupported(format!(
            "unsupported Arrow type {other} for field '{name}'"
        ))),
    }
}

fn bit_is_set(validity: Option<&[u8]>, i: usize) -> bool {
    validity.is_none_or(|v| v[i / 8] & (1 << (i % 8)) != 0)
}

/// Row `i` of a variable-length column: `offsets[i]..offsets[i+1]` into the
/// data buffer. Offsets are little-endian i32.
fn var_len_slice<'a>(
    field_name: &str,
    offsets: &[u8],
    data: &'a [u8],
    i: usize,
) -> Result<&'a [u8]> {
    let needed = (i + 2) * 4;
    if offsets.len() < needed {
        return Err(Error::InvalidData(format!(
            "offsets buffer for field '{field_name}' is too small"
        )));
    }
    let start = i32::from_le_bytes(offsets[i * 4..i * 4 + 4].try_into().unwrap());
    let end = i32::from_le_bytes(offsets[(i + 1) * 4..(i + 1) * 4 + 4].try_into().unwrap());
    if start < 0 || end < start || end as usize > data.len() {
        return Err(Error::InvalidData(format!(
            "offsets for field '{field_name}' are out of range at row {i}"
        )));
    }
    Ok(&data[start as usize..end as usize])
}
