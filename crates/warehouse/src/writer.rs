//! Table and report publication.
//!
//! Every artifact is rendered in memory first, then written as `<name>.tmp`
//! and renamed over its target once all temp files are on disk. A failure
//! before the rename phase removes the temp files and leaves existing
//! artifacts untouched.

use std::path::{Path, PathBuf};

use engine_core::{Error, OutputErrorCode, Result};
use pipeline::RunOutput;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::WarehouseConfig;
use crate::report::{render_json, render_markdown};

pub const EVENTS_TABLE: &str = "stg_events.jsonl";
pub const SESSIONS_TABLE: &str = "fct_sessions.jsonl";
pub const ORDERS_TABLE: &str = "fct_orders.jsonl";
pub const ATTRIBUTION_TABLE: &str = "fct_attribution.jsonl";
pub const REPORT_JSON: &str = "reconciliation.json";
pub const REPORT_MARKDOWN: &str = "reconciliation.md";

/// One published file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedArtifact {
    pub path: PathBuf,
    pub rows: u64,
    pub bytes: u64,
}

/// Publishes the artifacts of one run.
#[derive(Debug, Clone)]
pub struct TableWriter {
    output_dir: PathBuf,
    reports_dir: PathBuf,
}

struct Rendered {
    path: PathBuf,
    rows: u64,
    body: Vec<u8>,
}

impl Rendered {
    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl TableWriter {
    pub fn new(output_dir: impl Into<PathBuf>, reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            reports_dir: reports_dir.into(),
        }
    }

    pub fn from_config(config: &WarehouseConfig) -> Self {
        Self::new(&config.output_dir, &config.reports_dir)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    /// Writes all four tables and both reports.
    pub async fn publish(&self, output: &RunOutput) -> Result<Vec<PublishedArtifact>> {
        let rendered = vec![
            jsonl(self.output_dir.join(EVENTS_TABLE), &output.events)?,
            jsonl(self.output_dir.join(SESSIONS_TABLE), &output.sessions)?,
            jsonl(self.output_dir.join(ORDERS_TABLE), &output.orders)?,
            jsonl(self.output_dir.join(ATTRIBUTION_TABLE), &output.facts)?,
            Rendered {
                path: self.reports_dir.join(REPORT_JSON),
                rows: 1,
                body: render_json(&output.report)?.into_bytes(),
            },
            Rendered {
                path: self.reports_dir.join(REPORT_MARKDOWN),
                rows: 1,
                body: render_markdown(&output.report).into_bytes(),
            },
        ];

        for dir in [&self.output_dir, &self.reports_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::output(OutputErrorCode::WriteFailed, "failed to create directory", dir, Some(e))
            })?;
        }

        if let Err(e) = stage_all(&rendered).await {
            discard_temps(&rendered).await;
            return Err(e);
        }

        let mut published = Vec::with_capacity(rendered.len());
        for artifact in &rendered {
            let tmp = artifact.tmp_path();
            tokio::fs::rename(&tmp, &artifact.path).await.map_err(|e| {
                Error::output(OutputErrorCode::WriteFailed, "failed to publish", &artifact.path, Some(e))
            })?;
            debug!(path = %artifact.path.display(), rows = artifact.rows, "Published artifact");
            published.push(PublishedArtifact {
                path: artifact.path.clone(),
                rows: artifact.rows,
                bytes: artifact.body.len() as u64,
            });
        }

        info!(
            output_dir = %self.output_dir.display(),
            reports_dir = %self.reports_dir.display(),
            artifacts = published.len(),
            "Published run artifacts"
        );
        Ok(published)
    }
}

/// One JSON object per line, newline terminated.
fn jsonl<T: Serialize>(path: PathBuf, rows: &[T]) -> Result<Rendered> {
    let mut body = Vec::new();
    for row in rows {
        serde_json::to_writer(&mut body, row)?;
        body.push(b'\n');
    }
    Ok(Rendered {
        path,
        rows: rows.len() as u64,
        body,
    })
}

async fn stage_all(rendered: &[Rendered]) -> Result<()> {
    for artifact in rendered {
        let tmp = artifact.tmp_path();
        tokio::fs::write(&tmp, &artifact.body).await.map_err(|e| {
            Error::output(OutputErrorCode::WriteFailed, "failed to write temp file", &tmp, Some(e))
        })?;
    }
    Ok(())
}

async fn discard_temps(rendered: &[Rendered]) {
    for artifact in rendered {
        let tmp = artifact.tmp_path();
        match tokio::fs::remove_file(&tmp).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %tmp.display(), error = %e, "Failed to remove temp file"),
        }
    }
}
