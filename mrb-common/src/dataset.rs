//! Raw datasets produced by the drivers.
//!
//! - Cold-start runs: CSV with columns
//!   `runtime,iteration,cold_start,duration_ms,memory_used_mb,timestamp`.
//! - Load runs: JSON Lines, one [`LoadSample`] per line.
//!
//! Readers never fail on a bad row. Malformed rows are logged, skipped and
//! counted in [`Ingested::malformed`].

use crate::types::{FAILED_DURATION_MS, InvocationRecord, LoadSample, RuntimeId};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// CSV header written at the top of every cold-start dataset.
pub const INVOCATION_CSV_HEADER: [&str; 6] = [
    "runtime",
    "iteration",
    "cold_start",
    "duration_ms",
    "memory_used_mb",
    "timestamp",
];

/// Errors that stop reading or writing a dataset as a whole.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write dataset: {0}")]
    Write(String),

    #[error("failed to read dataset: {0}")]
    Read(#[from] std::io::Error),

    #[error("missing CSV column '{0}'")]
    MissingColumn(&'static str),
}

/// Rows read from a dataset plus the number of rows that were skipped.
#[derive(Debug, Clone)]
pub struct Ingested<T> {
    pub rows: Vec<T>,
    pub malformed: usize,
}

impl<T> Default for Ingested<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            malformed: 0,
        }
    }
}

impl<T> Ingested<T> {
    fn merge(&mut self, other: Ingested<T>) {
        self.rows.extend(other.rows);
        self.malformed += other.malformed;
    }
}

#[derive(Debug, Serialize)]
struct InvocationCsvRow<'a> {
    runtime: &'a str,
    iteration: u32,
    cold_start: bool,
    duration_ms: f64,
    memory_used_mb: f64,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct RawInvocationRow {
    runtime: String,
    iteration: String,
    cold_start: String,
    duration_ms: String,
    memory_used_mb: String,
    timestamp: String,
}

/// Append-only writer for the cold-start CSV.
///
/// Each record is flushed as soon as it is written so a crash mid-run keeps
/// every completed measurement.
pub struct InvocationCsvWriter {
    writer: csv::Writer<File>,
    path: PathBuf,
}

impl InvocationCsvWriter {
    /// Open `path` for appending, creating parent directories as needed.
    ///
    /// The header is written only when the file is new or empty.
    pub fn open(path: &Path) -> Result<Self, DatasetError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| DatasetError::Open {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| DatasetError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        let is_empty = file.metadata().map(|m| m.len() == 0).unwrap_or(true);

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_empty {
            writer
                .write_record(INVOCATION_CSV_HEADER)
                .map_err(|e| DatasetError::Write(e.to_string()))?;
            writer.flush()?;
        }
        debug!(path = %path.display(), new_file = is_empty, "Opened cold-start dataset");

        Ok(Self {
            writer,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush it to disk.
    pub fn append(&mut self, record: &InvocationRecord) -> Result<(), DatasetError> {
        self.writer
            .serialize(InvocationCsvRow {
                runtime: record.runtime_id.as_str(),
                iteration: record.iteration,
                cold_start: record.cold_start_detected,
                duration_ms: record.billed_duration_ms,
                memory_used_mb: record.reported_memory_mb,
                timestamp: record.timestamp.to_rfc3339(),
            })
            .map_err(|e| DatasetError::Write(e.to_string()))?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Read a cold-start CSV file.
pub fn read_invocations_csv(path: &Path) -> Result<Ingested<InvocationRecord>, DatasetError> {
    let file = File::open(path).map_err(|source| DatasetError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    parse_invocations_csv(file)
}

/// Parse cold-start CSV content from any reader.
pub fn parse_invocations_csv<R: Read>(reader: R) -> Result<Ingested<InvocationRecord>, DatasetError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| DatasetError::Read(std::io::Error::other(e)))?
        .clone();
    for column in INVOCATION_CSV_HEADER {
        if !headers.iter().any(|h| h == column) {
            return Err(DatasetError::MissingColumn(column));
        }
    }

    let mut ingested = Ingested::default();
    for (idx, result) in rdr.deserialize::<RawInvocationRow>().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        let parsed = result
            .map_err(|e| e.to_string())
            .and_then(|raw| invocation_from_raw(&raw));
        match parsed {
            Ok(record) => ingested.rows.push(record),
            Err(reason) => {
                warn!(line, reason = %reason, "Skipping malformed cold-start row");
                ingested.malformed += 1;
            }
        }
    }
    Ok(ingested)
}

fn invocation_from_raw(raw: &RawInvocationRow) -> Result<InvocationRecord, String> {
    let runtime = raw.runtime.trim();
    if runtime.is_empty() {
        return Err("empty runtime".to_string());
    }

    let iteration: u32 = raw
        .iteration
        .parse()
        .map_err(|_| format!("invalid iteration '{}'", raw.iteration))?;
    if iteration == 0 {
        return Err("iteration must be >= 1".to_string());
    }

    let cold_start = match raw.cold_start.to_lowercase().as_str() {
        "true" | "1" | "yes" => true,
        "false" | "0" | "no" => false,
        other => return Err(format!("invalid cold_start '{other}'")),
    };

    let duration_ms: f64 = raw
        .duration_ms
        .parse()
        .map_err(|_| format!("invalid duration_ms '{}'", raw.duration_ms))?;
    if !duration_ms.is_finite() || (duration_ms < 0.0 && duration_ms != FAILED_DURATION_MS) {
        return Err(format!("duration_ms out of range: {duration_ms}"));
    }

    let memory_used_mb: f64 = raw
        .memory_used_mb
        .parse()
        .map_err(|_| format!("invalid memory_used_mb '{}'", raw.memory_used_mb))?;
    if !memory_used_mb.is_finite() || memory_used_mb < 0.0 {
        return Err(format!("memory_used_mb out of range: {memory_used_mb}"));
    }

    let timestamp = parse_timestamp(&raw.timestamp)
        .ok_or_else(|| format!("invalid timestamp '{}'", raw.timestamp))?;

    Ok(InvocationRecord {
        runtime_id: RuntimeId::new(runtime),
        iteration,
        cold_start_detected: cold_start,
        billed_duration_ms: duration_ms,
        reported_memory_mb: memory_used_mb,
        timestamp,
    })
}

/// Accept RFC 3339 timestamps or integer epoch seconds / milliseconds.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    let n: i64 = value.parse().ok()?;
    // Anything past year 2286 in seconds is treated as milliseconds.
    if n.abs() >= 10_000_000_000 {
        Utc.timestamp_millis_opt(n).single()
    } else {
        Utc.timestamp_opt(n, 0).single()
    }
}

/// Read load samples from a JSON Lines file or a directory of `*.jsonl` files.
///
/// Directory entries are read in file-name order so repeated reads yield
/// the same row order.
pub fn read_load_samples(path: &Path) -> Result<Ingested<LoadSample>, DatasetError> {
    if !path.is_dir() {
        return read_load_samples_file(path);
    }

    let entries = fs::read_dir(path).map_err(|source| DatasetError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    files.sort();

    let mut ingested = Ingested::default();
    for file in files {
        debug!(path = %file.display(), "Reading load samples");
        ingested.merge(read_load_samples_file(&file)?);
    }
    Ok(ingested)
}

fn read_load_samples_file(path: &Path) -> Result<Ingested<LoadSample>, DatasetError> {
    let file = File::open(path).map_err(|source| DatasetError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    parse_load_samples(BufReader::new(file))
}

/// Parse JSON Lines load samples from any buffered reader.
pub fn parse_load_samples<R: BufRead>(reader: R) -> Result<Ingested<LoadSample>, DatasetError> {
    let mut ingested = Ingested::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<LoadSample>(trimmed) {
            Ok(sample) if sample.duration_ms.is_finite() && sample.duration_ms >= 0.0 => {
                ingested.rows.push(sample)
            }
            Ok(sample) => {
                warn!(line = idx + 1, duration_ms = sample.duration_ms, "Skipping load sample with invalid duration");
                ingested.malformed += 1;
            }
            Err(e) => {
                warn!(line = idx + 1, error = %e, "Skipping malformed load sample");
                ingested.malformed += 1;
            }
        }
    }
    Ok(ingested)
}

/// Serialize one load sample as a JSON Lines entry (with trailing newline).
pub fn load_sample_line(sample: &LoadSample) -> Result<String, DatasetError> {
    let mut line = serde_json::to_string(sample).map_err(|e| DatasetError::Write(e.to_string()))?;
    line.push('\n');
    Ok(line)
}
