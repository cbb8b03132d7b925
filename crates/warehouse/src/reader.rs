//! Partitioned input.
//!
//! Every `*.jsonl`, `*.ndjson` or `*.csv` file directly under the input
//! directory is one partition named by its file stem. Partitions load in
//! name order so `RawEvent::ordinal` is stable across runs.

use std::path::{Path, PathBuf};

use engine_core::{Error, InputErrorCode, LoadedInput, PartitionLoad, RawEvent, Result};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

/// On-disk layout of a partition file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartitionFormat {
    JsonLines,
    Csv,
}

impl PartitionFormat {
    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jsonl" | "ndjson" => Some(Self::JsonLines),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

/// Reads date partitions from a directory.
#[derive(Debug, Clone)]
pub struct PartitionReader {
    input_dir: PathBuf,
}

impl PartitionReader {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
        }
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    /// Loads every partition under the input directory.
    ///
    /// A missing or unreadable directory, a directory without partition
    /// files, and a failed file read are errors. Lines or rows that cannot
    /// become a record are skipped and counted.
    pub async fn load(&self) -> Result<LoadedInput> {
        let files = self.partition_files().await?;
        info!(
            input_dir = %self.input_dir.display(),
            partitions = files.len(),
            "Loading input partitions"
        );

        let mut input = LoadedInput::default();
        for (partition, path, format) in files {
            let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                Error::input(InputErrorCode::Unreadable, "failed to read partition", &path, Some(e))
            })?;

            let ordinal = input.records.len() as u64;
            let (records, load) = match format {
                PartitionFormat::JsonLines => parse_json_lines(&partition, &path, &content, ordinal),
                PartitionFormat::Csv => parse_csv(&partition, &path, &content, ordinal),
            };
            if load.malformed_lines > 0 {
                warn!(
                    partition = %partition,
                    malformed_lines = load.malformed_lines,
                    "Skipped lines that could not be read as records"
                );
            }

            input.stats.push(load);
            input.records.extend(records);
        }

        info!(
            lines = input.stats.lines,
            records = input.stats.records,
            malformed_lines = input.stats.malformed_lines,
            "Input loaded"
        );
        Ok(input)
    }

    /// Partition files sorted by `(name, path)`.
    async fn partition_files(&self) -> Result<Vec<(String, PathBuf, PartitionFormat)>> {
        let unreadable = |e: std::io::Error| {
            Error::input(
                InputErrorCode::Unreadable,
                "input directory missing or unreadable",
                &self.input_dir,
                Some(e),
            )
        };

        let mut entries = tokio::fs::read_dir(&self.input_dir).await.map_err(unreadable)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(unreadable)? {
            let path = entry.path();
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            let Some(format) = PartitionFormat::from_path(&path) else {
                continue;
            };
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                files.push((stem.to_string(), path, format));
            }
        }

        if files.is_empty() {
            return Err(Error::input(
                InputErrorCode::NoPartitions,
                "no *.jsonl, *.ndjson or *.csv partitions found",
                &self.input_dir,
                None,
            ));
        }

        files.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        Ok(files)
    }
}

fn empty_load(partition: &str, path: &Path) -> PartitionLoad {
    PartitionLoad {
        partition: partition.to_string(),
        path: path.to_path_buf(),
        ..Default::default()
    }
}

/// Parses one JSON Lines partition, numbering records from `first_ordinal`.
fn parse_json_lines(
    partition: &str,
    path: &Path,
    content: &str,
    first_ordinal: u64,
) -> (Vec<RawEvent>, PartitionLoad) {
    let mut load = empty_load(partition, path);
    let mut records = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx as u64 + 1;
        load.lines += 1;
        if line.trim().is_empty() {
            load.blank_lines += 1;
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(fields)) => {
                let ordinal = first_ordinal + records.len() as u64;
                records.push(RawEvent::new(partition, line_no, ordinal, fields));
            }
            Ok(_) | Err(_) => {
                debug!(partition, line = line_no, "Skipping line that is not a JSON object");
                load.malformed_lines += 1;
            }
        }
    }

    load.records = records.len() as u64;
    (records, load)
}

/// Parses one CSV partition. The header row names the fields; every cell is
/// kept as a string and empty cells become null.
fn parse_csv(partition: &str, path: &Path, content: &str, first_ordinal: u64) -> (Vec<RawEvent>, PartitionLoad) {
    let mut load = empty_load(partition, path);
    let mut records = Vec::new();

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(content.as_bytes());
    let headers: Vec<String> = match reader.headers() {
        Ok(headers) => headers.iter().map(|h| h.trim().to_string()).collect(),
        Err(e) => {
            debug!(partition, error = %e, "Unreadable CSV header");
            load.lines = 1;
            load.malformed_lines = 1;
            return (records, load);
        }
    };

    for (idx, row) in reader.records().enumerate() {
        load.lines += 1;
        // Header is line 1
        let fallback_line = idx as u64 + 2;
        match row {
            Ok(row) => {
                let line_no = row.position().map(|p| p.line()).unwrap_or(fallback_line);
                let fields: Map<String, Value> = headers
                    .iter()
                    .zip(row.iter())
                    .map(|(name, cell)| (name.clone(), cell_value(cell)))
                    .collect();
                let ordinal = first_ordinal + records.len() as u64;
                records.push(RawEvent::new(partition, line_no, ordinal, fields));
            }
            Err(e) => {
                debug!(partition, line = fallback_line, error = %e, "Skipping unreadable CSV row");
                load.malformed_lines += 1;
            }
        }
    }

    load.records = records.len() as u64;
    (records, load)
}

fn cell_value(cell: &str) -> Value {
    if cell.trim().is_empty() {
        Value::Null
    } else {
        Value::String(cell.to_string())
    }
}
