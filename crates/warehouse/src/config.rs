//! Filesystem locations for input partitions and published artifacts.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Warehouse directory configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Directory holding one JSON Lines file per date partition
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    /// Directory receiving the staged and fact tables
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Directory receiving the reconciliation reports
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("data/raw")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data/warehouse")
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("data/reports")
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            reports_dir: default_reports_dir(),
        }
    }
}
