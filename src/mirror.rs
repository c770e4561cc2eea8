//! End-to-end mirror run
//!
//! Phases run one after another over a single worker pool:
//! base files, manifest, tile extraction, crawl, tile download. Each
//! phase drains to idle before the next starts.

use crate::config::Config;
use crate::crawler::{AntiWafGateway, Crawler, Downloader, TaskQueue};
use crate::manifest::parse_manifest_file;
use crate::output::{write_report, DownloadReport, DownloadStats};
use crate::storage::ResumableLog;
use crate::MirrorError;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// File name of the end-of-run report, inside the output directory
pub const REPORT_FILE: &str = "download_report.json";

/// Switches for a run
#[derive(Debug, Clone, Copy, Default)]
pub struct MirrorOptions {
    /// Download the manifest's tiles without crawling for other resources
    pub skip_crawl: bool,
}

/// Mirrors the configured tour and returns the final statistics
///
/// Only two failures abort the run: the output directory cannot be created,
/// or the manifest cannot be fetched or parsed.
pub async fn run_mirror(
    config: &Config,
    options: MirrorOptions,
    cancel: CancellationToken,
) -> crate::Result<DownloadStats> {
    let output_dir = &config.download.output_dir;
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|source| MirrorError::OutputDir {
            path: output_dir.clone(),
            source,
        })?;

    let log = Arc::new(ResumableLog::open(config.log_path()).await);
    let gateway =
        Arc::new(AntiWafGateway::new(config, Arc::clone(&log))?.with_cancellation(cancel));
    let queue = TaskQueue::new(config.download.max_parallel);

    tracing::info!(
        "Mirroring {} into {} ({} parallel)",
        config.tour.base_url,
        output_dir.display(),
        queue.max_parallel()
    );

    let downloader = Downloader::new(
        config,
        Arc::clone(&gateway),
        Arc::clone(&log),
        queue.clone(),
    );

    downloader.download_base_files(&config.tour.base_files).await;
    let manifest_path = downloader.download_main_xml().await?;
    let tiles = parse_manifest_file(&manifest_path, &config.tour.base_url, output_dir).await?;

    if options.skip_crawl {
        tracing::info!("Skipping crawl");
    } else {
        let crawler = Crawler::new(config, Arc::clone(&gateway), Arc::clone(&log), queue)?;
        crawler.crawl(tiles.iter().map(|tile| tile.url.as_str())).await;
    }

    downloader.download_tiles(tiles).await;

    let report = DownloadReport::generate(&log).await;
    let report_path = output_dir.join(REPORT_FILE);
    if let Err(e) = write_report(&report, &report_path).await {
        tracing::warn!("Failed to write report {}: {}", report_path.display(), e);
    }

    if gateway.is_cancelled() {
        tracing::warn!("Run interrupted; restart to resume");
    }

    Ok(report.statistics)
}
