use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::America::New_York;
use duckdb::ToSql;
use duckdb::types::{TimeUnit, ToSqlOutput, Value as SqlValue};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// A coerced cell value bound for the staging table.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    Timestamp(DateTime<Utc>),
}

impl ToSql for Value {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        let value = match self {
            Value::Text(s) => SqlValue::Text(s.clone()),
            Value::Integer(i) => SqlValue::BigInt(*i),
            // The appender casts doubles into DECIMAL target columns.
            Value::Decimal(d) => SqlValue::Double(d.to_f64().unwrap_or_default()),
            Value::Timestamp(ts) => {
                SqlValue::Timestamp(TimeUnit::Microsecond, ts.timestamp_micros())
            }
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

pub fn parse_local_datetime(value: &str) -> Option<NaiveDateTime> {
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(parsed);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return parsed.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Interprets a naive wall-clock reading as US Eastern time and converts it
/// to UTC. Returns `None` for instants skipped by the spring-forward
/// transition; ambiguous fall-back instants resolve to the earlier offset.
pub fn eastern_to_utc(local: NaiveDateTime) -> Option<DateTime<Utc>> {
    New_York
        .from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Best-effort coercion of a raw cell: decimal, then integer, then
/// Eastern-local timestamp, then text passthrough. Empty input is null.
/// Never fails.
pub fn coerce_value(raw: &str) -> Option<Value> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(decimal) = Decimal::from_str(value) {
        return Some(Value::Decimal(decimal));
    }
    if let Ok(integer) = value.parse::<i64>() {
        return Some(Value::Integer(integer));
    }
    if let Some(local) = parse_local_datetime(value) {
        if let Some(utc) = eastern_to_utc(local) {
            return Some(Value::Timestamp(utc));
        }
    }
    Some(Value::Text(value.to_string()))
}

/// Coercion for the store-and-forward flag column: "Y" and "N" normalize to
/// their long tokens, empty is null, anything else passes through unchanged.
pub fn coerce_flag(raw: &str) -> Option<Value> {
    match raw.trim() {
        "" => None,
        "Y" => Some(Value::Text("Yes".to_string())),
        "N" => Some(Value::Text("No".to_string())),
        other => Some(Value::Text(other.to_string())),
    }
}
