//! Record type conversion for declared columns.
//!
//! Vendor APIs ship timestamps and dates as strings in assorted formats;
//! a resource's `columns` hints name the fields to normalize. Conversion
//! is idempotent: already-canonical values pass through unchanged, and
//! unparseable values are left as-is rather than dropped.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Timestamp,
    Date,
}

/// Normalize the hinted columns of one record in place.
pub fn convert_types(record: &mut Value, columns: &HashMap<String, ColumnType>) {
    let Some(map) = record.as_object_mut() else {
        return;
    };

    for (column, kind) in columns {
        let Some(value) = map.get(column) else {
            continue;
        };

        let converted = match kind {
            ColumnType::Timestamp => normalize_timestamp(value),
            ColumnType::Date => normalize_date(value),
        };

        match converted {
            Some(normalized) => {
                map.insert(column.clone(), normalized);
            }
            None => {
                if !value.is_null() {
                    debug!(column = %column, value = %value, "Could not coerce column value");
                }
            }
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

fn normalize_timestamp(value: &Value) -> Option<Value> {
    match value {
        Value::String(raw) => parse_timestamp(raw)
            .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))),
        // Epoch seconds/millis from vendors that send numbers.
        Value::Number(n) => {
            let raw = n.as_i64()?;
            let dt = if raw.abs() >= 100_000_000_000 {
                DateTime::<Utc>::from_timestamp_millis(raw)?
            } else {
                DateTime::<Utc>::from_timestamp(raw, 0)?
            };
            Some(Value::String(
                dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ))
        }
        _ => None,
    }
}

fn normalize_date(value: &Value) -> Option<Value> {
    let raw = value.as_str()?;
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(Value::String(date.format("%Y-%m-%d").to_string()));
    }
    parse_timestamp(raw).map(|dt| Value::String(dt.date_naive().format("%Y-%m-%d").to_string()))
}
