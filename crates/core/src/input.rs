//! Loaded input and its line accounting.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::events::RawEvent;

/// Line counts for one partition file.
///
/// For JSON Lines a line is a physical line. For CSV it is one data row;
/// the header row is not counted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartitionLoad {
    pub partition: String,
    pub path: PathBuf,
    pub lines: u64,
    pub records: u64,
    pub blank_lines: u64,
    pub malformed_lines: u64,
}

impl PartitionLoad {
    /// `lines == records + blank_lines + malformed_lines`
    pub fn is_balanced(&self) -> bool {
        self.lines == self.records + self.blank_lines + self.malformed_lines
    }
}

/// Counts from one load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub lines: u64,
    pub records: u64,
    pub blank_lines: u64,
    /// Lines or rows that could not become a record
    pub malformed_lines: u64,
    pub partitions: Vec<PartitionLoad>,
}

impl LoadStats {
    /// Adds one partition's counts to the totals.
    pub fn push(&mut self, load: PartitionLoad) {
        self.lines += load.lines;
        self.records += load.records;
        self.blank_lines += load.blank_lines;
        self.malformed_lines += load.malformed_lines;
        self.partitions.push(load);
    }
}

/// Raw records of a run, in ordinal order.
#[derive(Debug, Clone, Default)]
pub struct LoadedInput {
    pub records: Vec<RawEvent>,
    pub stats: LoadStats,
}

impl LoadedInput {
    /// Wraps records that were built in memory; every line is a record.
    pub fn from_records(records: Vec<RawEvent>) -> Self {
        let mut per_partition: BTreeMap<&str, u64> = BTreeMap::new();
        for record in &records {
            *per_partition.entry(record.partition.as_str()).or_default() += 1;
        }

        let mut stats = LoadStats::default();
        for (partition, n) in per_partition {
            stats.push(PartitionLoad {
                partition: partition.to_string(),
                lines: n,
                records: n,
                ..Default::default()
            });
        }
        Self { records, stats }
    }
}
