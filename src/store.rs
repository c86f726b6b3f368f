//! DuckDB-backed staging and final tables.
//!
//! The staging table (`DataWithDuplicates`) receives bulk appends and carries
//! a surrogate `row_seq` column assigned in input order, which gives the
//! duplicate resolver a deterministic tiebreak: within each duplicate-key
//! partition the lowest `row_seq` survives. The delete of ranked duplicates
//! and the promotion into `ImportedData` run inside one transaction.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::DateTime;
use duckdb::types::{TimeUnit, ValueRef};
use duckdb::{Connection, ToSql};
use itertools::Itertools;

use crate::trip::{DUPLICATE_KEY, TRIP_COLUMNS, TripRow};

pub const STAGING_TABLE: &str = "DataWithDuplicates";
pub const FINAL_TABLE: &str = "ImportedData";

const TRIP_COLUMN_DDL: &str = "\
    tpep_pickup_datetime TIMESTAMP NOT NULL,
    tpep_dropoff_datetime TIMESTAMP NOT NULL,
    passenger_count INTEGER NOT NULL,
    trip_distance DECIMAL(18, 6),
    store_and_fwd_flag VARCHAR,
    \"PULocationID\" INTEGER,
    \"DOLocationID\" INTEGER,
    fare_amount DECIMAL(18, 6),
    tip_amount DECIMAL(18, 6)";

pub struct TripStore {
    conn: Connection,
    next_seq: i64,
}

impl TripStore {
    /// Opens the database named by the operator-supplied descriptor;
    /// `:memory:` selects an ephemeral in-process store.
    pub fn open(descriptor: &str) -> Result<Self> {
        let conn = if descriptor == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(descriptor)
        }
        .with_context(|| format!("Opening DuckDB database '{descriptor}'"))?;
        Ok(Self { conn, next_seq: 1 })
    }

    /// Creates both tables when missing and positions the surrogate sequence
    /// after any rows a previous run left in staging.
    pub fn init(&mut self) -> Result<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS \"{STAGING_TABLE}\" (\n    \
             row_seq BIGINT NOT NULL,\n{TRIP_COLUMN_DDL}\n);\n\
             CREATE TABLE IF NOT EXISTS \"{FINAL_TABLE}\" (\n{TRIP_COLUMN_DDL}\n);"
        );
        self.conn
            .execute_batch(&ddl)
            .context("Creating trip tables")?;
        let max_seq: i64 = self
            .conn
            .query_row(
                &format!("SELECT coalesce(max(row_seq), 0) FROM \"{STAGING_TABLE}\""),
                [],
                |row| row.get(0),
            )
            .context("Reading staging sequence position")?;
        self.next_seq = max_seq + 1;
        Ok(())
    }

    /// Bulk-appends one batch into staging, preserving nulls explicitly.
    /// Sequence numbers continue in input order across batches.
    pub fn append_batch(&mut self, rows: &[TripRow]) -> Result<usize> {
        let base = self.next_seq;
        let numbered: Vec<(i64, &TripRow)> = rows
            .iter()
            .enumerate()
            .map(|(offset, cells)| (base + offset as i64, cells))
            .collect();

        let mut appender = self
            .conn
            .appender(STAGING_TABLE)
            .with_context(|| format!("Opening appender for {STAGING_TABLE}"))?;
        appender
            .append_rows(numbered.iter().map(|(seq, cells)| {
                [
                    seq as &dyn ToSql,
                    &cells[0] as &dyn ToSql,
                    &cells[1] as &dyn ToSql,
                    &cells[2] as &dyn ToSql,
                    &cells[3] as &dyn ToSql,
                    &cells[4] as &dyn ToSql,
                    &cells[5] as &dyn ToSql,
                    &cells[6] as &dyn ToSql,
                    &cells[7] as &dyn ToSql,
                    &cells[8] as &dyn ToSql,
                ]
            }))
            .with_context(|| format!("Appending {} row(s) to {STAGING_TABLE}", rows.len()))?;
        appender
            .flush()
            .with_context(|| format!("Flushing appender for {STAGING_TABLE}"))?;

        self.next_seq = base + rows.len() as i64;
        Ok(rows.len())
    }

    /// Writes every ranked duplicate (rank > 1 within its key partition) to
    /// the audit writer, header first, rows in input order. Fields are
    /// emitted as-is; the caller chooses the quote style.
    pub fn export_duplicates<W: Write>(&self, writer: &mut csv::Writer<W>) -> Result<u64> {
        writer
            .write_record(TRIP_COLUMNS.iter())
            .context("Writing duplicates header")?;

        let sql = format!(
            "WITH ranked AS (\n    \
             SELECT *, row_number() OVER (\n        \
             PARTITION BY {key}\n        \
             ORDER BY row_seq\n    ) AS row_num\n    \
             FROM \"{STAGING_TABLE}\"\n)\n\
             SELECT {columns} FROM ranked WHERE row_num > 1 ORDER BY row_seq",
            key = quoted(&DUPLICATE_KEY),
            columns = quoted(&TRIP_COLUMNS),
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Preparing duplicate export query")?;
        let mut rows = stmt.query([]).context("Querying duplicate rows")?;

        let mut exported = 0u64;
        while let Some(row) = rows.next().context("Reading duplicate row")? {
            let record = (0..TRIP_COLUMNS.len())
                .map(|idx| row.get_ref(idx).map(format_cell))
                .collect::<Result<Vec<_>, duckdb::Error>>()
                .context("Decoding duplicate row")?;
            writer
                .write_record(&record)
                .context("Writing duplicate row")?;
            exported += 1;
        }
        writer.flush().context("Flushing duplicates output")?;
        Ok(exported)
    }

    /// Deletes ranked duplicates from staging and copies the remainder into
    /// the final table, atomically.
    pub fn remove_duplicates_and_promote(&mut self) -> Result<(usize, usize)> {
        let delete_sql = format!(
            "DELETE FROM \"{STAGING_TABLE}\" WHERE row_seq IN (\n    \
             SELECT row_seq FROM (\n        \
             SELECT row_seq, row_number() OVER (\n            \
             PARTITION BY {key}\n            \
             ORDER BY row_seq\n        ) AS row_num\n        \
             FROM \"{STAGING_TABLE}\"\n    ) WHERE row_num > 1\n)",
            key = quoted(&DUPLICATE_KEY),
        );
        let promote_sql = format!(
            "INSERT INTO \"{FINAL_TABLE}\" ({columns})\nSELECT {columns} FROM \"{STAGING_TABLE}\"",
            columns = quoted(&TRIP_COLUMNS),
        );

        let tx = self
            .conn
            .transaction()
            .context("Starting dedupe transaction")?;
        let removed = tx
            .execute(&delete_sql, [])
            .context("Deleting duplicate rows from staging")?;
        let promoted = tx
            .execute(&promote_sql, [])
            .context("Promoting staged rows to the final table")?;
        tx.commit().context("Committing dedupe transaction")?;
        Ok((removed, promoted))
    }
}

fn quoted(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|column| format!("\"{column}\""))
        .join(", ")
}

fn format_cell(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Boolean(b) => b.to_string(),
        ValueRef::TinyInt(i) => i.to_string(),
        ValueRef::SmallInt(i) => i.to_string(),
        ValueRef::Int(i) => i.to_string(),
        ValueRef::BigInt(i) => i.to_string(),
        ValueRef::Float(f) => f.to_string(),
        ValueRef::Double(f) => f.to_string(),
        ValueRef::Decimal(d) => rust_decimal::Decimal::try_from(d)
            .map(|d| d.normalize().to_string())
            .unwrap_or_else(|_| d.to_string()),
        ValueRef::Timestamp(unit, raw) => format_timestamp(unit, raw),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        other => format!("{other:?}"),
    }
}

fn format_timestamp(unit: TimeUnit, raw: i64) -> String {
    let micros = match unit {
        TimeUnit::Second => raw.saturating_mul(1_000_000),
        TimeUnit::Millisecond => raw.saturating_mul(1_000),
        TimeUnit::Microsecond => raw,
        TimeUnit::Nanosecond => raw / 1_000,
    };
    DateTime::from_timestamp_micros(micros)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| raw.to_string())
}
