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

//! Conversion of Arrow parameter values to the server's text literal form.
//!
//! Booleans become `true`/`false`, integers their decimal form, floats
//! fixed-point with 6 (f32) or 15 (f64) fractional digits, binary a `\x`
//! hex string, dates `YYYY-MM-DD`, and timestamps ISO-8601 with six
//! fractional digits. Nulls convert to an empty string flagged as null.

use arrow_array::cast::AsArray;
use arrow_array::types::{
    Date32Type, Date64Type, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type,
    Time64MicrosecondType, TimestampMicrosecondType, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow_array::{Array, RecordBatch};
use arrow_schema::{DataType, TimeUnit};
use chrono::{DateTime, NaiveDate};

use crate::error::{Error, Result};

/// Days from 0001-01-01 (the `chrono` common-era anchor) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// One converted parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextParam {
    pub value: String,
    pub is_null: bool,
}

impl TextParam {
    fn null() -> Self {
        Self {
            value: String::new(),
            is_null: true,
        }
    }

    fn value(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            is_null: false,
        }
    }
}

/// Convert one row of a parameter batch, one literal per column.
pub fn convert_row(batch: &RecordBatch, row: usize) -> Result<Vec<TextParam>> {
    if row >= batch.num_rows() {
        return Err(Error::InvalidArgument(format!(
            "parameter row {row} out of range ({} rows)",
            batch.num_rows()
        )));
    }
    batch
        .columns()
        .iter()
        .map(|column| convert_value(column.as_ref(), row))
        .collect()
}

/// Convert a single Arrow value to its text literal.
pub fn convert_value(array: &dyn Array, row: usize) -> Result<TextParam> {
    if row >= array.len() {
        return Err(Error::InvalidArgument(format!(
            "parameter row {row} out of range ({} rows)",
            array.len()
        )));
    }
    if array.is_null(row) {
        return Ok(TextParam::null());
    }

    let text = match array.data_type() {
        DataType::Int8 => array.as_primitive::<Int8Type>().value(row).to_string(),
        DataType::Int16 => array.as_primitive::<Int16Type>().value(row).to_string(),
        DataType::Int32 => array.as_primitive::<Int32Type>().value(row).to_string(),
        DataType::Int64 => array.as_primitive::<Int64Type>().value(row).to_string(),
        DataType::UInt8 => array.as_primitive::<UInt8Type>().value(row).to_string(),
        DataType::UInt16 => array.as_primitive::<UInt16Type>().value(row).to_string(),
        DataType::UInt32 => array.as_primitive::<UInt32Type>().value(row).to_string(),
        DataType::UInt64 => array.as_primitive::<UInt64Type>().value(row).to_string(),
        DataType::Float32 => {
            format!("{:.6}", array.as_primitive::<Float32Type>().value(row))
        }
        DataType::Float64 => {
            format!("{:.15}", array.as_primitive::<Float64Type>().value(row))
        }
        DataType::Boolean => {
            if array.as_boolean().value(row) {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        DataType::Utf8 => array.as_string::<i32>().value(row).to_string(),
        DataType::Binary => {
            let bytes = array.as_binary::<i32>().value(row);
            let mut text = String::with_capacity(2 + bytes.len() * 2);
            text.push_str("\\x");
            for byte in bytes {
                text.push_str(&format!("{byte:02x}"));
            }
            text
        }
        DataType::Date32 => format_date(array.as_primitive::<Date32Type>().value(row))?,
        DataType::Date64 => {
            // Date64 is milliseconds since the epoch.
            let millis = array.as_primitive::<Date64Type>().value(row);
            format_date(i32::try_from(millis.div_euclid(86_400_000)).map_err(|_| {
                Error::InvalidData(format!("date64 value {millis} out of range"))
            })?)?
        }
        DataType::Time64(TimeUnit::Microsecond) => {
            let micros = array.as_primitive::<Time64MicrosecondType>().value(row);
            let hours = (micros / 3_600_000_000) % 24;
            let minutes = (micros / 60_000_000) % 60;
            let seconds = (micros / 1_000_000) % 60;
            let fraction = micros % 1_000_000;
            format!("{hours:02}:{minutes:02}:{seconds:02}.{fraction:06}")
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            let micros = array.as_primitive::<TimestampMicrosecondType>().value(row);
            let datetime = DateTime::from_timestamp_micros(micros).ok_or_else(|| {
                Error::InvalidData(format!("timestamp value {micros} out of range"))
            })?;
            datetime.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
        }
        other => {
            return Err(Error::Unsupported(format!(
                "unsupported parameter type {other}"
            )))
        }
    };
    Ok(TextParam::value(text))
}

fn format_date(days: i32) -> Result<String> {
    let date = days
        .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| Error::InvalidData(format!("date value {days} out of range")))?;
    Ok(date.format("%Y-%m-%d").to_string())
}
