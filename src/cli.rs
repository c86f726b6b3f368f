use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Stage trip-record CSVs into DuckDB and promote deduplicated rows",
    long_about = None
)]
pub struct Cli {
    /// Input CSV file of trip records ('-' reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// DuckDB database path, created if missing (':memory:' for ephemeral runs)
    #[arg(short = 'd', long = "database")]
    pub database: String,
    /// Destination CSV for removed duplicate rows
    #[arg(long = "duplicates", default_value = "duplicates.csv")]
    pub duplicates: PathBuf,
    /// Rows buffered in memory before each bulk staging insert
    #[arg(long = "batch-size", default_value_t = 2000)]
    pub batch_size: usize,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Write run statistics as JSON to this path
    #[arg(long = "stats-json")]
    pub stats_json: Option<PathBuf>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
