//! Output module for end-of-run statistics and reports
//!
//! This module handles:
//! - Counting log entries per status
//! - Printing the final statistics
//! - Writing the JSON download report

mod report;
pub mod stats;

pub use report::{write_report, DownloadReport};
pub use stats::{print_statistics, DownloadStats};
