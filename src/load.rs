use std::{
    fs,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, anyhow, ensure};
use csv::QuoteStyle;
use log::{debug, info};
use serde::Serialize;

use crate::{
    batch::RowBatch,
    cli::Cli,
    io_utils,
    store::{self, TripStore},
    trip::TripLayout,
};

/// Statistics from one pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadStats {
    pub rows_staged: usize,
    pub batches_flushed: usize,
    pub duplicates_removed: usize,
    pub rows_promoted: usize,
    #[serde(skip)]
    pub duration: Duration,
}

/// Runs the full pipeline: stream the CSV through coercion into batched
/// staging appends, then resolve duplicates and promote the remainder.
pub fn execute(args: &Cli) -> Result<LoadStats> {
    ensure!(args.batch_size > 0, "Batch size must be positive");
    let start = Instant::now();

    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    info!(
        "Loading '{}' into '{}' in batches of {} row(s)",
        args.input.display(),
        args.database,
        args.batch_size
    );

    let mut reader = io_utils::open_csv_reader_from_path(&args.input, delimiter)?;
    let headers = io_utils::reader_headers(&mut reader, encoding)?;
    if headers.is_empty() {
        return Err(anyhow!("CSV file is empty or has no headers"));
    }
    let layout = TripLayout::from_headers(&headers)?;

    let mut trip_store = TripStore::open(&args.database)?;
    trip_store.init()?;

    let mut stats = LoadStats::default();
    let mut batch = RowBatch::new(args.batch_size);
    for (ordinal, result) in reader.into_byte_records().enumerate() {
        let record = result.with_context(|| format!("Reading row {}", ordinal + 2))?;
        let raw = io_utils::decode_record(&record, encoding)?;
        batch.push(layout.coerce_record(&raw));
        if batch.is_full() {
            flush(&mut trip_store, &mut batch, &mut stats)?;
        }
    }
    if !batch.is_empty() {
        flush(&mut trip_store, &mut batch, &mut stats)?;
    }
    debug!(
        "Staged {} row(s) across {} batch(es)",
        stats.rows_staged, stats.batches_flushed
    );

    let mut writer = io_utils::open_csv_writer(&args.duplicates, b',', QuoteStyle::Never)
        .with_context(|| format!("Creating duplicates file {:?}", args.duplicates))?;
    let exported = trip_store.export_duplicates(&mut writer)?;
    let (removed, promoted) = trip_store.remove_duplicates_and_promote()?;
    stats.duplicates_removed = removed;
    stats.rows_promoted = promoted;
    stats.duration = start.elapsed();
    debug!("Exported {exported} duplicate row(s) to {:?}", args.duplicates);

    maybe_emit_stats(&stats, args)?;
    info!(
        "Promoted {} row(s) to {}; {} duplicate(s) removed to {:?} in {:.2}s",
        stats.rows_promoted,
        store::FINAL_TABLE,
        stats.duplicates_removed,
        args.duplicates,
        stats.duration.as_secs_f64()
    );
    Ok(stats)
}

fn flush(store: &mut TripStore, batch: &mut RowBatch, stats: &mut LoadStats) -> Result<()> {
    let rows = batch.take();
    let appended = store
        .append_batch(&rows)
        .with_context(|| format!("Bulk inserting batch of {} row(s)", rows.len()))?;
    stats.rows_staged += appended;
    stats.batches_flushed += 1;
    debug!("Flushed batch {} ({appended} row(s))", stats.batches_flushed);
    Ok(())
}

fn maybe_emit_stats(stats: &LoadStats, args: &Cli) -> Result<()> {
    let Some(path) = args.stats_json.as_deref() else {
        return Ok(());
    };
    let payload = serde_json::to_string_pretty(stats).context("Serializing run statistics")?;
    fs::write(path, payload).with_context(|| format!("Writing run statistics to {path:?}"))?;
    info!("Run statistics written to {path:?}");
    Ok(())
}
