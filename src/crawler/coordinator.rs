//! Crawler - same-scope link discovery
//!
//! The crawler turns a handful of seed URLs into the closure of resources
//! reachable from them under the tour scope:
//! - Seeding the frontier with caller URLs and the tour entry points
//! - Draining the frontier into the shared task queue
//! - Persisting every fetched resource under its mapped local path
//! - Scanning text resources for further links
//!
//! The crawl terminates when the frontier is empty and the queue is idle.

use crate::config::Config;
use crate::crawler::gateway::{is_blocked, AntiWafGateway, FetchOptions};
use crate::crawler::parser::LinkExtractor;
use crate::crawler::queue::TaskQueue;
use crate::crawler::save_file;
use crate::state::{FileStatus, StatusUpdate};
use crate::storage::ResumableLog;
use crate::url::{fallback_local_path, url_to_local_path, TourScope};
use crate::MirrorError;
use reqwest::header::CONTENT_TYPE;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use url::Url;

/// Content-type fragments and path extensions read as text
const TEXT_TYPES: [&str; 5] = ["html", "css", "javascript", "xml", "json"];
const TEXT_EXTENSIONS: [&str; 5] = [".html", ".css", ".js", ".xml", ".json"];

/// Visited and pending URLs of one crawl run
///
/// A URL is queued at most once per run and never re-queued after it has
/// been handed out.
#[derive(Debug, Default)]
pub struct Frontier {
    visited: HashSet<String>,
    discovered: HashSet<String>,
    to_process: VecDeque<String>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a URL unless it was already discovered or visited
    pub fn enqueue(&mut self, url: String) -> bool {
        if self.visited.contains(&url) || self.discovered.contains(&url) {
            return false;
        }

        self.discovered.insert(url.clone());
        self.to_process.push_back(url);
        true
    }

    /// Pops the next URL that has not been visited and marks it visited
    pub fn next_unvisited(&mut self) -> Option<String> {
        while let Some(url) = self.to_process.pop_front() {
            if self.visited.insert(url.clone()) {
                return Some(url);
            }
        }
        None
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    pub fn pending(&self) -> usize {
        self.to_process.len()
    }

    pub fn stats(&self) -> CrawlStats {
        CrawlStats {
            visited: self.visited.len(),
            discovered: self.discovered.len(),
        }
    }
}

/// Size of the crawl so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub visited: usize,
    pub discovered: usize,
}

/// Breadth-first discoverer of the tour's resources
///
/// Cloning is cheap; clones share the frontier, the queue and the log.
#[derive(Debug, Clone)]
pub struct Crawler {
    inner: Arc<CrawlerInner>,
}

#[derive(Debug)]
struct CrawlerInner {
    gateway: Arc<AntiWafGateway>,
    log: Arc<ResumableLog>,
    queue: TaskQueue,
    scope: TourScope,
    extractor: LinkExtractor,
    frontier: Mutex<Frontier>,
    output_dir: PathBuf,
    entry_points: Vec<String>,
}

impl Crawler {
    /// Creates a crawler over the configured tour
    ///
    /// # Arguments
    ///
    /// * `config` - The mirror configuration
    /// * `gateway` - Transport shared with the downloader
    /// * `log` - Journal receiving every outcome
    /// * `queue` - Worker pool the crawl drains into
    pub fn new(
        config: &Config,
        gateway: Arc<AntiWafGateway>,
        log: Arc<ResumableLog>,
        queue: TaskQueue,
    ) -> crate::Result<Self> {
        let base = &config.tour.base_url;
        let entry_points = vec![
            format!("{}tour.html", base),
            format!("{}tour.js", base),
            format!("{}{}", base, config.tour.xml_file),
            base.clone(),
        ];

        Ok(Self {
            inner: Arc::new(CrawlerInner {
                gateway,
                log,
                queue,
                scope: TourScope::new(base)?,
                extractor: LinkExtractor::new(&config.tour.reserved_prefix)?,
                frontier: Mutex::new(Frontier::new()),
                output_dir: config.download.output_dir.clone(),
                entry_points,
            }),
        })
    }

    /// Crawls from `seeds` and the tour entry points until nothing is left
    pub async fn crawl<I, S>(&self, seeds: I) -> CrawlStats
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seeded = 0;
        for seed in seeds {
            if self.add_to_download(seed.as_ref()) {
                seeded += 1;
            }
        }
        for entry in &self.inner.entry_points {
            if self.add_to_download(entry) {
                seeded += 1;
            }
        }

        tracing::info!("Starting crawl with {} seed URLs", seeded);

        self.drain();
        self.inner.queue.on_idle().await;

        let stats = self.stats();
        tracing::info!(
            "Crawl completed: {} visited, {} discovered",
            stats.visited,
            stats.discovered
        );
        stats
    }

    /// Admits a URL into the frontier if it is in scope and new
    pub fn add_to_download(&self, url: &str) -> bool {
        match self.inner.scope.admit(url) {
            Some(admitted) => self.frontier().enqueue(admitted),
            None => {
                tracing::trace!("Out of scope: {}", url);
                false
            }
        }
    }

    pub fn stats(&self) -> CrawlStats {
        self.frontier().stats()
    }

    fn frontier(&self) -> std::sync::MutexGuard<'_, Frontier> {
        self.inner
            .frontier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands every pending URL to the task queue
    fn drain(&self) {
        loop {
            let next = self.frontier().next_unvisited();
            let Some(url) = next else {
                break;
            };

            let crawler = self.clone();
            self.inner.queue.add(async move {
                crawler.process_url(url).await;
            });
        }
    }

    async fn process_url(&self, url: String) {
        if let Err(e) = self.fetch_and_store(&url).await {
            tracing::warn!("Error processing {}: {}", url, e);
        }
    }

    async fn fetch_and_store(&self, url: &str) -> crate::Result<()> {
        let gateway = &self.inner.gateway;

        gateway.polite_pause(url).await?;
        let response = gateway.fetch(url, &FetchOptions::no_block_retry()).await?;
        let status = response.status();

        if is_blocked(status) {
            tracing::info!("Skipping blocked {} ({})", url, status.as_u16());
            self.inner
                .log
                .log_file_status(
                    url,
                    StatusUpdate::new(FileStatus::Skipped).with_code(status.as_u16()),
                )
                .await;
            return Ok(());
        }

        if !status.is_success() {
            tracing::debug!("Dropping {} ({})", url, status.as_u16());
            return Ok(());
        }

        let document_url = Url::parse(url)?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_ascii_lowercase);
        let local_path = self.local_path(url);

        if is_text_resource(content_type.as_deref(), &document_url) {
            let text = response.text().await.map_err(|source| MirrorError::Transport {
                url: url.to_string(),
                source,
            })?;
            self.store(url, &local_path, text.as_bytes()).await;

            let links = self.inner.extractor.extract_urls(&text, &document_url);
            let admitted = links
                .iter()
                .filter(|link| self.add_to_download(link))
                .count();
            if admitted > 0 {
                tracing::debug!("Discovered {} new URLs in {}", admitted, url);
            }

            self.drain();
        } else {
            let bytes = response.bytes().await.map_err(|source| MirrorError::Transport {
                url: url.to_string(),
                source,
            })?;
            self.store(url, &local_path, &bytes).await;
        }

        Ok(())
    }

    fn local_path(&self, url: &str) -> PathBuf {
        url_to_local_path(self.inner.scope.base(), url, &self.inner.output_dir)
            .unwrap_or_else(|| fallback_local_path(url, &self.inner.output_dir))
    }

    /// Writes a resource and records it; write failures are not fatal
    async fn store(&self, url: &str, path: &Path, contents: &[u8]) {
        match save_file(path, contents).await {
            Ok(()) => {
                tracing::info!("Downloaded {} ({} bytes)", url, contents.len());
                self.inner
                    .log
                    .log_file_status(url, StatusUpdate::downloaded(contents.len() as u64))
                    .await;
            }
            Err(e) => tracing::warn!("Failed to write {}: {}", path.display(), e),
        }
    }
}

/// Returns true for resources that are read as text and scanned for links
///
/// The content type decides when present; otherwise the URL path extension.
fn is_text_resource(content_type: Option<&str>, url: &Url) -> bool {
    if let Some(content_type) = content_type {
        if TEXT_TYPES.iter().any(|t| content_type.contains(t)) {
            return true;
        }
    }

    let path = url.path().to_ascii_lowercase();
    TEXT_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}
