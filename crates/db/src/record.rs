//! Result rows decoded into ordered field maps.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

use crate::DbError;

/// One row: column name to JSON value, in column order.
pub type Record = IndexMap<String, JsonValue>;

/// Rows and affected-row count produced by executing one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    pub rows_affected: u64,
    pub records: Vec<Record>,
}

impl RecordSet {
    pub fn new(rows_affected: u64, records: Vec<Record>) -> Self {
        Self {
            rows_affected,
            records,
        }
    }

    pub fn first(&self) -> Option<&Record> {
        self.records.first()
    }

    /// Map every record onto `T` through its serde representation.
    pub fn decode<T: DeserializeOwned>(self) -> Result<Vec<T>, DbError> {
        self.records.into_iter().map(decode_record).collect()
    }

    /// Map the first record, if any, onto `T`.
    pub fn decode_first<T: DeserializeOwned>(self) -> Result<Option<T>, DbError> {
        self.records.into_iter().next().map(decode_record).transpose()
    }
}

pub fn decode_record<T: DeserializeOwned>(record: Record) -> Result<T, DbError> {
    let object: serde_json::Map<String, JsonValue> = record.into_iter().collect();
    Ok(serde_json::from_value(JsonValue::Object(object))?)
}

pub(crate) fn decode_row(row: &PgRow) -> Result<Record, DbError> {
    let mut record = Record::with_capacity(row.columns().len());

    for (idx, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name();
        let decode_error = |reason: String| DbError::Decode {
            column: column.name().to_string(),
            type_name: type_name.to_string(),
            reason,
        };

        let is_null = row
            .try_get_raw(idx)
            .map_err(|e| decode_error(e.to_string()))?
            .is_null();

        let value = if is_null {
            JsonValue::Null
        } else {
            decode_value(row, idx, type_name)
                .map_err(|e| decode_error(e.to_string()))?
                .ok_or_else(|| decode_error("unsupported column type".to_string()))?
        };

        record.insert(column.name().to_string(), value);
    }

    Ok(record)
}

/// `Ok(None)` when the column type has no JSON mapping.
fn decode_value(
    row: &PgRow,
    idx: usize,
    type_name: &str,
) -> Result<Option<JsonValue>, sqlx::Error> {
    let value = match type_name {
        "INT2" => JsonValue::from(row.try_get::<i16, _>(idx)?),
        "INT4" => JsonValue::from(row.try_get::<i32, _>(idx)?),
        "INT8" => JsonValue::from(row.try_get::<i64, _>(idx)?),
        "FLOAT4" => JsonValue::from(row.try_get::<f32, _>(idx)?),
        "FLOAT8" => JsonValue::from(row.try_get::<f64, _>(idx)?),
        "BOOL" => JsonValue::from(row.try_get::<bool, _>(idx)?),
        "DATE" => JsonValue::from(format_date(row.try_get::<NaiveDate, _>(idx)?)),
        "TIMESTAMP" => JsonValue::from(
            row.try_get::<NaiveDateTime, _>(idx)?
                .format("%Y-%m-%dT%H:%M:%S%.f")
                .to_string(),
        ),
        "TIMESTAMPTZ" => JsonValue::from(row.try_get::<DateTime<Utc>, _>(idx)?.to_rfc3339()),
        "JSON" | "JSONB" => row.try_get::<JsonValue, _>(idx)?,
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" => {
            JsonValue::from(row.try_get::<String, _>(idx)?)
        }
        _ => return Ok(None),
    };

    Ok(Some(value))
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
