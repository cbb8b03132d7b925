//! Filesystem edge of the transformation engine.
//!
//! Loads date-partitioned JSON Lines or CSV input and publishes the staged table,
//! the fact tables and the reconciliation reports.

pub mod config;
pub mod reader;
pub mod report;
pub mod writer;

pub use config::WarehouseConfig;
pub use reader::PartitionReader;
pub use report::{render_json, render_markdown};
pub use writer::{PublishedArtifact, TableWriter};
