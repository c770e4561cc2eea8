//! Aggregate statistics over the download log
//!
//! This module counts log entries per status and renders the final
//! end-of-run summary.

use crate::state::{FileStatus, ResourceState};
use serde::Serialize;

/// Download statistics summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadStats {
    /// Number of log entries
    pub total: u64,

    pub downloaded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub blocked: u64,
    pub already_exists: u64,
    pub errors: u64,

    /// Sum of every recorded `size`, whatever the entry's status
    pub total_bytes: u64,
}

impl DownloadStats {
    /// Computes statistics from log entries
    pub fn from_states<'a, I>(states: I) -> Self
    where
        I: IntoIterator<Item = &'a ResourceState>,
    {
        let mut stats = Self::default();

        for state in states {
            stats.total += 1;
            stats.total_bytes += state.size.unwrap_or(0);

            match state.status {
                FileStatus::Downloaded => stats.downloaded += 1,
                FileStatus::Failed => stats.failed += 1,
                FileStatus::Skipped => stats.skipped += 1,
                FileStatus::Blocked => stats.blocked += 1,
                FileStatus::AlreadyExists => stats.already_exists += 1,
                FileStatus::Error => stats.errors += 1,
            }
        }

        stats
    }

    /// Returns the count recorded for a status
    pub fn count(&self, status: FileStatus) -> u64 {
        match status {
            FileStatus::Downloaded => self.downloaded,
            FileStatus::Failed => self.failed,
            FileStatus::Skipped => self.skipped,
            FileStatus::Blocked => self.blocked,
            FileStatus::AlreadyExists => self.already_exists,
            FileStatus::Error => self.errors,
        }
    }

    /// Total size in mebibytes
    pub fn total_megabytes(&self) -> f64 {
        self.total_bytes as f64 / 1024.0 / 1024.0
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &DownloadStats) {
    println!("=== Download Statistics ===\n");

    println!("  Total files: {}", stats.total);
    for status in FileStatus::all() {
        let count = stats.count(status);
        if count == 0 && matches!(status, FileStatus::AlreadyExists | FileStatus::Error) {
            continue;
        }
        let percentage = if stats.total > 0 {
            (count as f64 / stats.total as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!("  Total size: {:.2} MB", stats.total_megabytes());
}
