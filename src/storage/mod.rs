//! Storage module for persisting download outcomes
//!
//! This module holds the resumable JSON log shared by the crawler and the
//! downloader. Each status change merges into the entry for its URL and
//! rewrites the whole file.

mod journal;

pub use journal::{DownloadLog, ResumableLog};
