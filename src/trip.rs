//! The fixed trip-record layout: processing order, flag column, duplicate
//! key, and header resolution against a source file whose column order may
//! differ.

use anyhow::{Result, anyhow};

use crate::data::{self, Value};

/// The nine columns every trip record carries, in processing order. Source
/// files may order them differently; they are matched by header name.
pub const TRIP_COLUMNS: [&str; 9] = [
    "tpep_pickup_datetime",
    "tpep_dropoff_datetime",
    "passenger_count",
    "trip_distance",
    "store_and_fwd_flag",
    "PULocationID",
    "DOLocationID",
    "fare_amount",
    "tip_amount",
];

/// The column normalized to Yes/No tokens instead of trial-parsed.
pub const FLAG_COLUMN: &str = "store_and_fwd_flag";

/// Composite business key that defines a duplicate trip.
pub const DUPLICATE_KEY: [&str; 3] = [
    "tpep_pickup_datetime",
    "tpep_dropoff_datetime",
    "passenger_count",
];

/// One coerced record in processing order.
pub type TripRow = Vec<Option<Value>>;

/// Maps the fixed processing order onto the source file's header order.
#[derive(Debug)]
pub struct TripLayout {
    source_index: [usize; 9],
}

impl TripLayout {
    /// Resolves every required column against the source header. A missing
    /// column is fatal; there is no fallback.
    pub fn from_headers(headers: &[String]) -> Result<Self> {
        let mut source_index = [0usize; 9];
        for (slot, column) in TRIP_COLUMNS.iter().enumerate() {
            source_index[slot] = headers
                .iter()
                .position(|header| header == column)
                .ok_or_else(|| anyhow!("Column '{column}' not found in CSV header"))?;
        }
        Ok(Self { source_index })
    }

    /// Coerces one decoded record into the nine-column processing order.
    pub fn coerce_record(&self, raw: &[String]) -> TripRow {
        TRIP_COLUMNS
            .iter()
            .zip(self.source_index.iter())
            .map(|(column, idx)| {
                let cell = raw.get(*idx).map(String::as_str).unwrap_or("");
                if *column == FLAG_COLUMN {
                    data::coerce_flag(cell)
                } else {
                    data::coerce_value(cell)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn from_headers_accepts_reordered_columns() {
        let mut reordered: Vec<&str> = TRIP_COLUMNS.to_vec();
        reordered.reverse();
        let layout = TripLayout::from_headers(&headers(&reordered)).unwrap();

        let mut raw: Vec<String> = vec![String::new(); 9];
        // passenger_count sits at reversed position 6.
        raw[6] = "2".to_string();
        let row = layout.coerce_record(&raw);
        assert_eq!(row[2], Some(Value::Decimal(Decimal::from(2))));
    }

    #[test]
    fn from_headers_rejects_missing_column() {
        let mut partial: Vec<&str> = TRIP_COLUMNS.to_vec();
        partial.retain(|column| *column != "fare_amount");
        let err = TripLayout::from_headers(&headers(&partial)).unwrap_err();
        assert!(err.to_string().contains("fare_amount"));
    }

    #[test]
    fn coerce_record_nulls_blank_flag() {
        let layout = TripLayout::from_headers(&headers(&TRIP_COLUMNS)).unwrap();
        let mut raw: Vec<String> = vec!["1".to_string(); 9];
        raw[4] = String::new();
        let row = layout.coerce_record(&raw);
        assert_eq!(row[4], None);
    }
}
