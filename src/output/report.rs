//! End-of-run JSON report

use crate::output::DownloadStats;
use crate::storage::{DownloadLog, ResumableLog};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// Snapshot of the log together with its statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadReport {
    pub generated_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub statistics: DownloadStats,
    pub download_log: DownloadLog,
}

impl DownloadReport {
    /// Builds a report from the current state of the log
    pub async fn generate(log: &ResumableLog) -> Self {
        let snapshot = log.snapshot().await;
        let statistics = DownloadStats::from_states(snapshot.files.values());

        Self {
            generated_at: Utc::now(),
            started_at: snapshot.started_at,
            statistics,
            download_log: snapshot,
        }
    }
}

/// Writes a report as pretty-printed JSON
pub async fn write_report(report: &DownloadReport, path: &Path) -> crate::Result<()> {
    let json = serde_json::to_vec_pretty(report).map_err(std::io::Error::from)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}
