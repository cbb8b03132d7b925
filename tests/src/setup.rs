//! Common test setup functions.

use std::path::{Path, PathBuf};

use engine_core::{EngineConfig, Result};
use pipeline::{Pipeline, RunOutput};
use serde_json::Value;
use tempfile::TempDir;
use warehouse::{PartitionReader, TableWriter};

use crate::fixtures::{csv_table, jsonl};

/// Temporary input, output and reports directories for one test.
///
/// Drives the same path as the binary: load partitions, run the pipeline,
/// publish the artifacts.
pub struct TestContext {
    pub dir: TempDir,
    pub config: EngineConfig,
}

impl TestContext {
    /// Create a context with default engine config.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::create_dir_all(dir.path().join("raw")).expect("Failed to create input dir");
        Self { dir, config }
    }

    pub fn input_dir(&self) -> PathBuf {
        self.dir.path().join("raw")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("warehouse")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.dir.path().join("reports")
    }

    /// Write one partition file of events.
    pub fn write_partition(&self, name: &str, events: &[Value]) {
        self.write_raw(&format!("{}.jsonl", name), &jsonl(events));
    }

    /// Write one CSV partition file with the given header.
    pub fn write_csv_partition(&self, name: &str, columns: &[&str], events: &[Value]) {
        self.write_raw(&format!("{}.csv", name), &csv_table(columns, events));
    }

    /// Write an arbitrary file into the input directory.
    pub fn write_raw(&self, file_name: &str, content: &str) {
        std::fs::write(self.input_dir().join(file_name), content).expect("Failed to write partition");
    }

    /// Load, run and publish; returns the in-memory output.
    pub async fn run(&self) -> Result<RunOutput> {
        self.run_with(self.config.clone(), &self.output_dir(), &self.reports_dir()).await
    }

    /// Same as `run`, with explicit config and destinations.
    pub async fn run_with(&self, config: EngineConfig, output_dir: &Path, reports_dir: &Path) -> Result<RunOutput> {
        let input = PartitionReader::new(self.input_dir()).load().await?;
        let pipeline = Pipeline::new(config)?;
        let output = tokio::task::spawn_blocking(move || pipeline.run(input))
            .await
            .expect("Pipeline task panicked");
        TableWriter::new(output_dir, reports_dir).publish(&output).await?;
        Ok(output)
    }

    /// Read a published table back as JSON rows.
    pub fn read_table(&self, file_name: &str) -> Vec<Value> {
        read_jsonl(&self.output_dir().join(file_name))
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a JSON Lines file.
pub fn read_jsonl(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .expect("Failed to read table")
        .lines()
        .map(|line| serde_json::from_str(line).expect("Invalid JSON line"))
        .collect()
}
