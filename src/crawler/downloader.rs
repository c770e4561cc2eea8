//! Downloader for the known parts of a tour
//!
//! Base files, the manifest and the manifest's tiles are fetched here. A
//! target file that already exists on disk is never fetched again; the log
//! is not consulted for that decision.

use crate::config::Config;
use crate::crawler::gateway::{is_blocked, AntiWafGateway, FetchOptions};
use crate::crawler::queue::TaskQueue;
use crate::crawler::save_file;
use crate::manifest::TileTask;
use crate::state::{FileStatus, StatusUpdate};
use crate::storage::ResumableLog;
use crate::MirrorError;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How a tile download ended
///
/// `backoff_ms` is the total time spent in retry backoff before the tile
/// finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOutcome {
    Downloaded { attempts: u32, backoff_ms: u64 },
    AlreadyExists,
    Skipped,
    Failed { attempts: u32, backoff_ms: u64 },
    Cancelled,
}

/// Fetches base files, the manifest and tiles through the shared gateway
#[derive(Debug, Clone)]
pub struct Downloader {
    inner: Arc<DownloaderInner>,
}

#[derive(Debug)]
struct DownloaderInner {
    gateway: Arc<AntiWafGateway>,
    log: Arc<ResumableLog>,
    queue: TaskQueue,
    base_url: String,
    xml_file: String,
    output_dir: PathBuf,
    max_retries: u32,
}

impl Downloader {
    pub fn new(
        config: &Config,
        gateway: Arc<AntiWafGateway>,
        log: Arc<ResumableLog>,
        queue: TaskQueue,
    ) -> Self {
        Self {
            inner: Arc::new(DownloaderInner {
                gateway,
                log,
                queue,
                base_url: config.tour.base_url.clone(),
                xml_file: config.tour.xml_file.clone(),
                output_dir: config.download.output_dir.clone(),
                max_retries: config.download.max_retries,
            }),
        }
    }

    /// Local path of the manifest
    pub fn manifest_path(&self) -> PathBuf {
        self.inner.output_dir.join(&self.inner.xml_file)
    }

    /// Fetches the fixed tour files into the output root
    ///
    /// Base files are not critical: blocked or failed ones are logged and
    /// skipped, and no error reaches the caller.
    pub async fn download_base_files<S: AsRef<str>>(&self, names: &[S]) {
        tracing::info!("Downloading {} base files", names.len());

        for name in names {
            let name = name.as_ref();
            let url = format!("{}{}", self.inner.base_url, name);
            let target = self.inner.output_dir.join(name);

            if target.exists() {
                tracing::info!("{} already exists, skipping", name);
                continue;
            }

            if let Err(e) = self.download_base_file(&url, &target).await {
                tracing::error!("Error with {}: {}", name, e);
            }
        }
    }

    async fn download_base_file(&self, url: &str, target: &Path) -> crate::Result<()> {
        let gateway = &self.inner.gateway;

        gateway.polite_pause(url).await?;
        let response = gateway.fetch(url, &FetchOptions::no_block_retry()).await?;

        if !response.status().is_success() {
            tracing::warn!("Failed to download {}: HTTP {}", url, response.status().as_u16());
            return Ok(());
        }

        let bytes = response.bytes().await.map_err(|source| MirrorError::Transport {
            url: url.to_string(),
            source,
        })?;
        save_file(target, &bytes).await?;

        self.inner
            .log
            .log_file_status(url, StatusUpdate::downloaded(bytes.len() as u64))
            .await;
        tracing::info!("Downloaded {}", url);
        Ok(())
    }

    /// Fetches the tour manifest and returns its local path
    ///
    /// Blocks are waited out by the gateway. Anything else that prevents
    /// the manifest from landing on disk is fatal, since every later phase
    /// depends on it.
    pub async fn download_main_xml(&self) -> crate::Result<PathBuf> {
        let url = format!("{}{}", self.inner.base_url, self.inner.xml_file);
        let target = self.manifest_path();

        if target.exists() {
            tracing::info!("Manifest {} already exists, skipping", target.display());
            return Ok(target);
        }

        tracing::info!("Downloading manifest {}", url);
        let gateway = &self.inner.gateway;

        gateway.polite_pause(&url).await?;
        let response = gateway.fetch(&url, &FetchOptions::default()).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MirrorError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }

        let text = response.text().await.map_err(|source| MirrorError::Transport {
            url: url.clone(),
            source,
        })?;
        save_file(&target, text.as_bytes()).await?;

        self.inner
            .log
            .log_file_status(&url, StatusUpdate::downloaded(text.len() as u64))
            .await;
        tracing::info!("Manifest downloaded ({} bytes)", text.len());
        Ok(target)
    }

    /// Downloads one tile with bounded retries
    ///
    /// Retry `n` waits `retry_backoff_base * 2^n + jitter` milliseconds. A
    /// blocked tile is skipped for the rest of the run without retrying.
    pub async fn download_tile(&self, tile: &TileTask) -> TileOutcome {
        if tile.local_path.exists() {
            self.inner
                .log
                .log_file_status(&tile.url, StatusUpdate::new(FileStatus::AlreadyExists))
                .await;
            return TileOutcome::AlreadyExists;
        }

        let gateway = &self.inner.gateway;
        let mut attempt: u32 = 1;
        let mut backoff_ms: u64 = 0;

        loop {
            let error = match self.try_tile(tile, attempt).await {
                Ok(TileOutcome::Downloaded { attempts, .. }) => {
                    return TileOutcome::Downloaded {
                        attempts,
                        backoff_ms,
                    }
                }
                Ok(outcome) => return outcome,
                Err(MirrorError::Cancelled { .. }) => return TileOutcome::Cancelled,
                Err(e) => e,
            };

            if gateway.is_cancelled() {
                return TileOutcome::Cancelled;
            }

            if attempt > self.inner.max_retries {
                tracing::error!("Failed {}: {}", tile.display_name(), error);
                self.inner
                    .log
                    .log_file_status(
                        &tile.url,
                        StatusUpdate::new(FileStatus::Failed).with_error(error.to_string()),
                    )
                    .await;
                return TileOutcome::Failed {
                    attempts: attempt,
                    backoff_ms,
                };
            }

            let backoff = gateway.retry_backoff(attempt);
            tracing::warn!(
                "Retry {}/{} for {} in {}ms ({})",
                attempt,
                self.inner.max_retries,
                tile.display_name(),
                backoff,
                error
            );
            if gateway.wait(&tile.url, backoff).await.is_err() {
                return TileOutcome::Cancelled;
            }
            backoff_ms = backoff_ms.saturating_add(backoff);
            attempt += 1;
        }
    }

    /// One attempt at a tile; errors are retryable
    async fn try_tile(&self, tile: &TileTask, attempt: u32) -> crate::Result<TileOutcome> {
        let gateway = &self.inner.gateway;

        gateway.polite_pause(&tile.url).await?;
        let response = gateway.fetch(&tile.url, &FetchOptions::no_block_retry()).await?;
        let status = response.status();

        if is_blocked(status) {
            tracing::info!("Tile blocked {} ({})", tile.display_name(), status.as_u16());
            self.inner
                .log
                .log_file_status(
                    &tile.url,
                    StatusUpdate::new(FileStatus::Skipped).with_code(status.as_u16()),
                )
                .await;
            return Ok(TileOutcome::Skipped);
        }

        if !status.is_success() {
            return Err(MirrorError::HttpStatus {
                url: tile.url.clone(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|source| MirrorError::Transport {
            url: tile.url.clone(),
            source,
        })?;
        save_file(&tile.local_path, &bytes).await?;

        self.inner
            .log
            .log_file_status(
                &tile.url,
                StatusUpdate::downloaded(bytes.len() as u64).with_attempts(attempt),
            )
            .await;
        tracing::info!("Downloaded {}", tile.display_name());
        Ok(TileOutcome::Downloaded {
            attempts: attempt,
            backoff_ms: 0,
        })
    }

    /// Runs every tile through the shared queue and waits for the batch
    pub async fn download_tiles(&self, tiles: Vec<TileTask>) {
        tracing::info!("Downloading {} tiles", tiles.len());

        for tile in tiles {
            let downloader = self.clone();
            self.inner.queue.add(async move {
                downloader.download_tile(&tile).await;
            });
        }

        self.inner.queue.on_idle().await;
        tracing::info!("Tile download completed");
    }
}
