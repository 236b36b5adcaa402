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

//! Schema metadata helpers.
//!
//! Cube follows PostgreSQL conventions for `information_schema`, so table
//! metadata is fetched with ordinary queries over the native protocol and
//! assembled into Arrow schemas here.

mod type_mapping;

pub use type_mapping::cube_type_to_arrow;

use arrow_array::cast::AsArray;
use arrow_array::{Array, RecordBatch, StringArray};
use arrow_schema::{Field, Schema};

use crate::error::{Error, Result};

/// Build the `information_schema.columns` query for a table.
///
/// Single quotes in identifiers are doubled.
// TODO: switch to bound parameters once the wire protocol grows a
// parameter field.
pub fn table_columns_query(db_schema: Option<&str>, table_name: &str) -> String {
    let mut query = format!(
        "SELECT column_name, data_type, is_nullable \
         FROM information_schema.columns \
         WHERE table_name = '{}'",
        escape_literal(table_name)
    );
    if let Some(db_schema) = db_schema.filter(|s| !s.is_empty()) {
        query.push_str(&format!(
            " AND table_schema = '{}'",
            escape_literal(db_schema)
        ));
    }
    query.push_str(" ORDER BY ordinal_position");
    query
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Assemble a table schema from an `information_schema.columns` result
/// batch with columns `(column_name, data_type, is_nullable)`.
pub fn table_schema_from_batch(batch: &RecordBatch) -> Result<Schema> {
    if batch.num_columns() < 3 {
        return Err(Error::InvalidData(format!(
            "information_schema.columns result has {} columns, expected 3",
            batch.num_columns()
        )));
    }

    let names = string_column(batch, 0)?;
    let types = string_column(batch, 1)?;
    let nullables = string_column(batch, 2)?;

    let mut fields = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        if names.is_null(row) || types.is_null(row) {
            return Err(Error::InvalidData(
                "null column name or type in information_schema.columns result".into(),
            ));
        }
        let data_type = cube_type_to_arrow(types.value(row));
        // is_nullable is 'YES' or 'NO'; treat anything unknown as nullable.
        let nullable = !nullables.is_valid(row) || !nullables.value(row).eq_ignore_ascii_case("no");
        fields.push(Field::new(names.value(row), data_type, nullable));
    }
    Ok(Schema::new(fields))
}

fn string_column(batch: &RecordBatch, index: usize) -> Result<&StringArray> {
    batch
        .column(index)
        .as_string_opt::<i32>()
        .ok_or_else(|| {
            Error::InvalidData(format!(
                "information_schema.columns column {index} is not a string column"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::{DataType, TimeUnit};
    use std::sync::Arc;

    fn columns_batch(rows: &[(&str, &str, &str)]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("column_name", DataType::Utf8, true),
            Field::new("data_type", DataType::Utf8, true),
            Field::new("is_nullable", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(
                    rows.iter().map(|r| r.0).collect::<Vec<_>>(),
                )),
                Arc::new(StringArray::from(
                    rows.iter().map(|r| r.1).collect::<Vec<_>>(),
                )),
                Arc::new(StringArray::from(
                    rows.iter().map(|r| r.2).collect::<Vec<_>>(),
                )),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_table_columns_query() {
        let query = table_columns_query(None, "orders");
        assert!(query.contains("table_name = 'orders'"));
        assert!(!query.contains("table_schema"));
        assert!(query.ends_with("ORDER BY ordinal_position"));

        let query = table_columns_query(Some("public"), "orders");
        assert!(query.contains("table_schema = 'public'"));
    }

    #[test]
    fn test_table_columns_query_escapes_quotes() {
        let query = table_columns_query(None, "o'rders");
        assert!(query.contains("table_name = 'o''rders'"));
    }

    #[test]
    fn test_table_schema_from_batch() {
        let batch = columns_batch(&[
            ("id", "bigint", "NO"),
            ("name", "varchar", "YES"),
            ("created_at", "timestamp", "YES"),
        ]);
        let schema = table_schema_from_batch(&batch).unwrap();

        assert_eq!(schema.fields().len(), 3);
        assert_eq!(schema.field(0).name(), "id");
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert!(!schema.field(0).is_nullable());
        assert_eq!(schema.field(1).data_type(), &DataType::Utf8);
        assert!(schema.field(1).is_nullable());
        assert_eq!(
            schema.field(2).data_type(),
            &DataType::Timestamp(TimeUnit::Microsecond, None)
        );
    }

    #[test]
    fn test_table_schema_from_short_batch() {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "column_name",
            DataType::Utf8,
            true,
        )]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(StringArray::from(vec!["only_one"]))],
        )
        .unwrap();
        assert!(table_schema_from_batch(&batch).is_err());
    }
}
