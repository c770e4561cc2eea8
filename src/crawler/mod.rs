//! Crawler module for fetching and persisting tour resources
//!
//! This module contains the network side of the mirror:
//! - Anti-blocking HTTP transport with pacing and backoff
//! - A bounded task queue with an idle barrier
//! - Link discovery over text resources
//! - Downloads of base files, the manifest and tiles

mod coordinator;
mod downloader;
mod gateway;
mod parser;
mod queue;

pub use coordinator::{CrawlStats, Crawler, Frontier};
pub use downloader::{Downloader, TileOutcome};
pub use gateway::{
    build_http_client, exponential_backoff, is_blocked, AntiWafGateway, FetchOptions,
    FALLBACK_USER_AGENT,
};
pub use parser::LinkExtractor;
pub use queue::TaskQueue;

use std::path::Path;

/// Writes `contents` to `path`, creating parent directories as needed
pub(crate) async fn save_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await
}
