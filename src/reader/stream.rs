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

//! Arrow C stream export for result readers.
//!
//! Installs the four C-ABI callbacks (`get_schema`, `get_next`,
//! `get_last_error`, `release`) over an owned [`ResultReader`]. The stream
//! handle exclusively owns the reader: `release` destroys it, nulls
//! `private_data`, and clears the `release` pointer, so releasing twice or
//! releasing a zero-initialized handle is safe. `get_next` follows the C
//! stream convention of writing an array with a null `release` at end of
//! stream and returning success.

use std::os::raw::{c_char, c_int, c_void};

use arrow_array::ffi::FFI_ArrowArray;
use arrow_array::ffi_stream::FFI_ArrowArrayStream;
use arrow_array::{Array, StructArray};
use arrow_schema::ffi::FFI_ArrowSchema;

use crate::reader::ResultReader;

const EIO: c_int = 5;
const EINVAL: c_int = 22;

static LAST_ERROR: &[u8] = b"cube native result stream error\0";

struct StreamState {
    reader: Box<dyn ResultReader + Send>,
}

/// Install `reader` into the caller-supplied stream handle.
///
/// Any previously installed stream is released first, so a handle that was
/// zero-initialized (or holds an earlier result) can be passed in
/// unconditionally. After this call the handle owns the reader.
pub fn export_reader(reader: Box<dyn ResultReader + Send>, out: &mut FFI_ArrowArrayStream) {
    if let Some(release) = out.release {
        unsafe { release(out) };
    }

    let state = Box::new(StreamState { reader });
    out.get_schema = Some(stream_get_schema);
    out.get_next = Some(stream_get_next);
    out.get_last_error = Some(stream_get_last_error);
    out.release = Some(stream_release);
    out.private_data = Box::into_raw(state) as *mut c_void;
}

unsafe extern "C" fn stream_get_schema(
    stream: *mut FFI_ArrowArrayStream,
    out: *mut FFI_ArrowSchema,
) -> c_int {
    let Some(state) = stream_state(stream) else {
        return EINVAL;
    };
    let Ok(schema) = state.reader.schema() else {
        return EINVAL;
    };
    match FFI_ArrowSchema::try_from(schema.as_ref()) {
        Ok(ffi_schema) => {
            std::ptr::write_unaligned(out, ffi_schema);
            0
        }
        Err(_) => EINVAL,
    }
}

unsafe extern "C" fn stream_get_next(
    stream: *mut FFI_ArrowArrayStream,
    out: *mut FFI_ArrowArray,
) -> c_int {
    let Some(state) = stream_state(stream) else {
        return EINVAL;
    };
    match state.reader.next_batch() {
        Ok(Some(batch)) => {
            let data = StructArray::from(batch).into_data();
            std::ptr::write_unaligned(out, FFI_ArrowArray::new(&data));
            0
        }
        Ok(None) => {
            // End of stream: an array whose release is null.
            std::ptr::write_unaligned(out, FFI_ArrowArray::empty());
            0
        }
        Err(_) => EIO,
    }
}

unsafe extern "C" fn stream_get_last_error(_stream: *mut FFI_ArrowArrayStream) -> *const c_char {
    LAST_ERROR.as_ptr() as *const c_char
}

unsafe extern "C" fn stream_release(stream: *mut FFI_ArrowArrayStream) {
    if stream.is_null() {
        return;
    }
    let stream = &mut *stream;
    if !stream.private_data.is_null() {
        drop(Box::from_raw(stream.private_data as *mut StreamState));
        stream.private_data = std::ptr::null_mut();
    }
    stream.release = None;
}

unsafe fn stream_state<'a>(stream: *mut FFI_ArrowArrayStream) -> Option<&'a mut StreamState> {
    if stream.is_null() {
        return None;
    }
    let private_data = (*stream).private_data;
    if private_data.is_null() {
        return None;
    }
    Some(&mut *(private_data as *mut StreamState))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::NativeQueryReader;
    use arrow_array::cast::AsArray;
    use arrow_array::ffi_stream::ArrowArrayStreamReader;
    use arrow_array::types::Int64Type;
    use arrow_array::{Int64Array, RecordBatch, RecordBatchReader};
    use arrow_schema::{DataType, Field, Schema};
    use std::ffi::CStr;
    use std::sync::Arc;

    fn exported_stream() -> FFI_ArrowArrayStream {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "answer",
            DataType::Int64,
            true,
        )]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![42i64]))]).unwrap();
        let mut stream = FFI_ArrowArrayStream::empty();
        export_reader(Box::new(NativeQueryReader::from_batch(batch)), &mut stream);
        stream
    }

    #[test]
    fn test_round_trip_through_stream_reader() {
        let stream = exported_stream();
        let mut reader = ArrowArrayStreamReader::try_new(stream).unwrap();

        let schema = reader.schema();
        assert_eq!(schema.field(0).name(), "answer");

        let batch = reader.next().unwrap().unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(batch.column(0).as_primitive::<Int64Type>().value(0), 42);

        assert!(reader.next().is_none());
    }

    #[test]
    fn test_get_next_end_of_stream_convention() {
        let mut stream = exported_stream();

        let mut array = FFI_ArrowArray::empty();
        let rc = unsafe { (stream.get_next.unwrap())(&mut stream, &mut array) };
        assert_eq!(rc, 0);
        // First call yields a live array.
        assert!(!array.is_released());
        drop(array);

        // Second call signals end of stream: success with a released array.
        let mut array = FFI_ArrowArray::empty();
        let rc = unsafe { (stream.get_next.unwrap())(&mut stream, &mut array) };
        assert_eq!(rc, 0);
        assert!(array.is_released());

        unsafe { (stream.release.unwrap())(&mut stream) };
    }

    #[test]
    fn test_get_last_error_is_static() {
        let mut stream = exported_stream();
        let message = unsafe {
            CStr::from_ptr((stream.get_last_error.unwrap())(&mut stream))
        };
        assert!(!message.to_bytes().is_empty());
        unsafe { (stream.release.unwrap())(&mut stream) };
    }

    #[test]
    fn test_release_clears_handle_and_is_idempotent() {
        let mut stream = exported_stream();
        let release = stream.release.unwrap();

        unsafe { release(&mut stream) };
        assert!(stream.release.is_none());
        assert!(stream.private_data.is_null());

        // Calling the callback again on the cleared handle is a no-op.
        unsafe { release(&mut stream) };
        assert!(stream.release.is_none());
    }

    #[test]
    fn test_zero_initialized_handle_is_safe() {
        // Callers release unconditionally on error paths; a handle that was
        // never populated has a null release and must be left alone.
        let stream = FFI_ArrowArrayStream::empty();
        assert!(stream.release.is_none());
        assert!(stream.private_data.is_null());
    }

    #[test]
    fn test_export_releases_prior_installation() {
        let mut stream = exported_stream();

        // Install a second reader over the first; the first must be
        // released rather than leaked, and the new one must be live.
        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, true)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![7i64]))]).unwrap();
        export_reader(Box::new(NativeQueryReader::from_batch(batch)), &mut stream);

        let mut reader = ArrowArrayStreamReader::try_new(stream).unwrap();
        assert_eq!(reader.schema().field(0).name(), "n");
        let batch = reader.next().unwrap().unwrap();
        assert_eq!(batch.column(0).as_primitive::<Int64Type>().value(0), 7);
    }
}
