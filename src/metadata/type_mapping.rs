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

//! Cube SQL type-name mapping to Arrow types.
//!
//! The mapping is purely lexical: names are trimmed and compared
//! case-insensitively. Decimal, JSON, and UUID types fall back to strings
//! (decimal128 support would be needed for lossless numerics); names the
//! driver has never heard of fall back to binary so queries keep working.

use arrow_schema::{DataType, TimeUnit};

/// Map a Cube SQL type name to an Arrow `DataType`.
pub fn cube_type_to_arrow(type_name: &str) -> DataType {
    let normalized = type_name.trim().to_lowercase();

    match normalized.as_str() {
        // Integer types
        "bigint" | "int8" => DataType::Int64,
        "integer" | "int" | "int4" => DataType::Int32,
        "smallint" | "int2" => DataType::Int16,
        "tinyint" | "int1" => DataType::Int8,

        // Unsigned integer types
        "ubigint" | "uint8" => DataType::UInt64,
        "uinteger" | "uint" | "uint4" => DataType::UInt32,
        "usmallint" | "uint2" => DataType::UInt16,
        "utinyint" | "uint1" => DataType::UInt8,

        // Floating point types
        "double" | "double precision" | "float8" => DataType::Float64,
        "real" | "float" | "float4" => DataType::Float32,

        // Boolean
        "boolean" | "bool" => DataType::Boolean,

        // Strings
        "varchar" | "character varying" | "text" | "char" | "string" => DataType::Utf8,

        // Binary
        "bytea" | "binary" | "varbinary" => DataType::Binary,

        // Temporal
        "date" => DataType::Date32,
        "time" | "time without time zone" | "time with time zone" => {
            DataType::Time64(TimeUnit::Microsecond)
        }
        "timestamp" | "timestamp without time zone" | "timestamp with time zone"
        | "timestamptz" => DataType::Timestamp(TimeUnit::Microsecond, None),

        // Lossy string fallbacks: decimals, JSON, UUID
        "numeric" | "decimal" | "number" | "json" | "jsonb" | "uuid" => DataType::Utf8,

        // Unknown types: permissive binary fallback
        _ => DataType::Binary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_names() {
        assert_eq!(cube_type_to_arrow("bigint"), DataType::Int64);
        assert_eq!(cube_type_to_arrow("int8"), DataType::Int64);
        assert_eq!(cube_type_to_arrow("integer"), DataType::Int32);
        assert_eq!(cube_type_to_arrow("int4"), DataType::Int32);
        assert_eq!(cube_type_to_arrow("smallint"), DataType::Int16);
        assert_eq!(cube_type_to_arrow("tinyint"), DataType::Int8);
        assert_eq!(cube_type_to_arrow("ubigint"), DataType::UInt64);
        assert_eq!(cube_type_to_arrow("uint2"), DataType::UInt16);
    }

    #[test]
    fn test_float_bool_string_binary_names() {
        assert_eq!(cube_type_to_arrow("double precision"), DataType::Float64);
        assert_eq!(cube_type_to_arrow("float8"), DataType::Float64);
        assert_eq!(cube_type_to_arrow("real"), DataType::Float32);
        assert_eq!(cube_type_to_arrow("bool"), DataType::Boolean);
        assert_eq!(cube_type_to_arrow("character varying"), DataType::Utf8);
        assert_eq!(cube_type_to_arrow("text"), DataType::Utf8);
        assert_eq!(cube_type_to_arrow("bytea"), DataType::Binary);
    }

    #[test]
    fn test_temporal_names() {
        assert_eq!(cube_type_to_arrow("date"), DataType::Date32);
        assert_eq!(
            cube_type_to_arrow("time without time zone"),
            DataType::Time64(TimeUnit::Microsecond)
        );
        assert_eq!(
            cube_type_to_arrow("timestamptz"),
            DataType::Timestamp(TimeUnit::Microsecond, None)
        );
    }

    #[test]
    fn test_lossy_and_permissive_fallbacks() {
        assert_eq!(cube_type_to_arrow("numeric"), DataType::Utf8);
        assert_eq!(cube_type_to_arrow("decimal"), DataType::Utf8);
        assert_eq!(cube_type_to_arrow("jsonb"), DataType::Utf8);
        assert_eq!(cube_type_to_arrow("uuid"), DataType::Utf8);
        assert_eq!(cube_type_to_arrow("geometry"), DataType::Binary);
        assert_eq!(cube_type_to_arrow(""), DataType::Binary);
    }

    #[test]
    fn test_case_and_whitespace_invariance() {
        // The mapping is invariant under case and surrounding whitespace.
        for name in ["BIGINT", "BigInt", "  bigint  ", "\tBIGINT\n"] {
            assert_eq!(cube_type_to_arrow(name), DataType::Int64, "{name:?}");
        }
        assert_eq!(
            cube_type_to_arrow(" Timestamp With Time Zone "),
            DataType::Timestamp(TimeUnit::Microsecond, None)
        );
    }
}
