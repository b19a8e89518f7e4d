// Result normalizer: fixed per-driver conversion tables into CanonicalRecord.
// Integers widen to 64-bit, floats to 64-bit, temporal values normalize to
// UTC. Unsupported native types fail loudly instead of truncating.
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use mysql_async::Value as MySqlValue;
use rusqlite::types::ValueRef;
use tokio_postgres::types::Type as PgType;

use crate::error::FrameError;
use crate::models::{CanonicalRecord, CanonicalValue};

/// Convert one SQLite row into a canonical record. The header is shared
/// across all rows of the result.
pub fn normalize_sqlite_row(
    columns: &Arc<Vec<String>>,
    row: &rusqlite::Row<'_>,
) -> Result<CanonicalRecord, FrameError> {
    let mut values = Vec::with_capacity(columns.len());
    for (idx, column) in columns.iter().enumerate() {
        let value_ref = row.get_ref(idx).map_err(|e| {
            FrameError::Internal(format!("column '{}' read failed: {}", column, e))
        })?;
        values.push(sqlite_value(column, value_ref)?);
    }
    CanonicalRecord::new(Arc::clone(columns), values)
}

fn sqlite_value(column: &str, value: ValueRef<'_>) -> Result<CanonicalValue, FrameError> {
    match value {
        ValueRef::Null => Ok(CanonicalValue::Null),
        ValueRef::Integer(v) => Ok(CanonicalValue::Int(v)),
        ValueRef::Real(v) => Ok(CanonicalValue::Float(v)),
        ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => Ok(CanonicalValue::Text(text.to_string())),
            Err(_) => Err(FrameError::UnsupportedType {
                native_type: "non-utf8 text".to_string(),
                column: column.to_string(),
            }),
        },
        ValueRef::Blob(bytes) => Ok(CanonicalValue::Bytes(bytes.to_vec())),
    }
}

/// Column header of a PostgreSQL row, in driver order.
pub fn pg_header(row: &tokio_postgres::Row) -> Arc<Vec<String>> {
    Arc::new(
        row.columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect(),
    )
}

/// Convert one PostgreSQL row into a canonical record.
pub fn normalize_pg_row(
    columns: &Arc<Vec<String>>,
    row: &tokio_postgres::Row,
) -> Result<CanonicalRecord, FrameError> {
    let mut values = Vec::with_capacity(columns.len());
    for (idx, pg_column) in row.columns().iter().enumerate() {
        values.push(pg_value(pg_column.name(), pg_column.type_(), row, idx)?);
    }
    CanonicalRecord::new(Arc::clone(columns), values)
}

fn pg_value(
    column: &str,
    pg_type: &PgType,
    row: &tokio_postgres::Row,
    idx: usize,
) -> Result<CanonicalValue, FrameError> {
    let decode_err =
        |e: tokio_postgres::Error| FrameError::Internal(format!("column '{}' read failed: {}", column, e));

    let value = match *pg_type {
        PgType::BOOL => row
            .try_get::<_, Option<bool>>(idx)
            .map_err(decode_err)?
            .map(CanonicalValue::Bool),
        PgType::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .map_err(decode_err)?
            .map(|v| CanonicalValue::Int(v as i64)),
        PgType::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .map_err(decode_err)?
            .map(|v| CanonicalValue::Int(v as i64)),
        PgType::INT8 => row
            .try_get::<_, Option<i64>>(idx)
            .map_err(decode_err)?
            .map(CanonicalValue::Int),
        PgType::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .map_err(decode_err)?
            .map(|v| CanonicalValue::Float(v as f64)),
        PgType::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)
            .map_err(decode_err)?
            .map(CanonicalValue::Float),
        PgType::TEXT | PgType::VARCHAR | PgType::BPCHAR | PgType::NAME => row
            .try_get::<_, Option<String>>(idx)
            .map_err(decode_err)?
            .map(CanonicalValue::Text),
        PgType::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(idx)
            .map_err(decode_err)?
            .map(CanonicalValue::Bytes),
        PgType::TIMESTAMPTZ => row
            .try_get::<_, Option<chrono::DateTime<Utc>>>(idx)
            .map_err(decode_err)?
            .map(CanonicalValue::Timestamp),
        PgType::TIMESTAMP => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .map_err(decode_err)?
            .map(|v| CanonicalValue::Timestamp(v.and_utc())),
        PgType::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)
            .map_err(decode_err)?
            .map(|v| CanonicalValue::Timestamp(v.and_time(NaiveTime::MIN).and_utc())),
        ref other => {
            return Err(FrameError::UnsupportedType {
                native_type: other.name().to_string(),
                column: column.to_string(),
            })
        }
    };

    Ok(value.unwrap_or(CanonicalValue::Null))
}

/// Column header of a MySQL row, in driver order.
pub fn mysql_header(row: &mysql_async::Row) -> Arc<Vec<String>> {
    Arc::new(
        row.columns_ref()
            .iter()
            .map(|c| c.name_str().to_string())
            .collect(),
    )
}

/// Convert one MySQL row into a canonical record.
pub fn normalize_mysql_row(
    columns: &Arc<Vec<String>>,
    row: mysql_async::Row,
) -> Result<CanonicalRecord, FrameError> {
    let raw = row.unwrap();
    let mut values = Vec::with_capacity(columns.len());
    for (column, value) in columns.iter().zip(raw) {
        values.push(mysql_value(column, value)?);
    }
    CanonicalRecord::new(Arc::clone(columns), values)
}

fn mysql_value(column: &str, value: MySqlValue) -> Result<CanonicalValue, FrameError> {
    match value {
        MySqlValue::NULL => Ok(CanonicalValue::Null),
        MySqlValue::Int(v) => Ok(CanonicalValue::Int(v)),
        MySqlValue::UInt(v) => {
            // Widening is 64-bit signed; larger values error instead of wrapping
            i64::try_from(v)
                .map(CanonicalValue::Int)
                .map_err(|_| FrameError::UnsupportedType {
                    native_type: format!("unsigned bigint out of range ({})", v),
                    column: column.to_string(),
                })
        }
        MySqlValue::Float(v) => Ok(CanonicalValue::Float(v as f64)),
        MySqlValue::Double(v) => Ok(CanonicalValue::Float(v)),
        MySqlValue::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => Ok(CanonicalValue::Text(text)),
            Err(e) => Ok(CanonicalValue::Bytes(e.into_bytes())),
        },
        MySqlValue::Date(year, month, day, hour, minute, second, micros) => {
            let date = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
                .and_then(|d| d.and_hms_micro_opt(hour as u32, minute as u32, second as u32, micros));
            match date {
                Some(naive) => Ok(CanonicalValue::Timestamp(Utc.from_utc_datetime(&naive))),
                // MySQL zero-date sentinel means "no value"
                None => Ok(CanonicalValue::Null),
            }
        }
        MySqlValue::Time(negative, days, hours, minutes, seconds, _micros) => {
            let sign = if negative { "-" } else { "" };
            let total_hours = days * 24 + hours as u32;
            Ok(CanonicalValue::Text(format!(
                "{}{}:{:02}:{:02}",
                sign, total_hours, minutes, seconds
            )))
        }
    }
}
