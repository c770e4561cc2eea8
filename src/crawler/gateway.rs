//! Anti-blocking HTTP transport
//!
//! This module wraps every outbound request:
//! - Building the HTTP client
//! - Browser-like headers with a rotating User-Agent
//! - Politeness delay and jitter primitives
//! - Waiting out 403/429 blocks and transport errors
//!
//! # Retry Logic
//!
//! | Condition | Action |
//! |-----------|--------|
//! | HTTP 403/429, `retry_on_block` | Log `blocked`, wait 5-10s, retry |
//! | HTTP 403/429, no `retry_on_block` | Log `blocked`, return the response |
//! | Transport error | Log `error`, wait 3-6s, retry |
//! | Anything else | Return the response |
//!
//! Both retry paths are unbounded unless an attempt ceiling is configured,
//! and every wait aborts when the gateway's cancellation token fires.

use crate::config::Config;
use crate::state::{FileStatus, StatusUpdate};
use crate::storage::ResumableLog;
use crate::MirrorError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// User-Agent sent when the configured pool is empty
pub const FALLBACK_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Per-request options
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub method: Method,

    /// Wait out 403/429 responses instead of returning them
    pub retry_on_block: bool,

    /// Headers that override the generated ones
    pub headers: HeaderMap,

    /// Overrides the configured attempt ceiling for this request
    pub max_attempts: Option<u32>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            retry_on_block: true,
            headers: HeaderMap::new(),
            max_attempts: None,
        }
    }
}

impl FetchOptions {
    /// Options for callers that skip blocked resources
    pub fn no_block_retry() -> Self {
        Self {
            retry_on_block: false,
            ..Self::default()
        }
    }
}

/// Returns true for the statuses a WAF uses to refuse automated clients
pub fn is_blocked(status: StatusCode) -> bool {
    status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS
}

/// Tile retry delay before attempt `attempt + 1`: `base * 2^attempt`
pub fn exponential_backoff(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX))
}

/// Builds the HTTP client used by the gateway
pub fn build_http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// HTTP transport that evades, paces and waits out blocking
#[derive(Debug)]
pub struct AntiWafGateway {
    client: Client,
    log: Arc<ResumableLog>,
    referer: String,
    user_agents: Vec<String>,
    base_delay_ms: u64,
    jitter_ms: u64,
    retry_backoff_base: u64,
    block_wait_ms: [u64; 2],
    error_wait_ms: [u64; 2],
    max_attempts: Option<u32>,
    cancel: CancellationToken,
}

impl AntiWafGateway {
    /// Creates a gateway from the configuration
    pub fn new(config: &Config, log: Arc<ResumableLog>) -> crate::Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            log,
            referer: format!("{}tour.html", config.tour.base_url),
            user_agents: config.request.user_agents.clone(),
            base_delay_ms: config.request.base_delay_ms,
            jitter_ms: config.request.jitter_ms,
            retry_backoff_base: config.request.retry_backoff_base,
            block_wait_ms: config.request.block_wait_ms,
            error_wait_ms: config.request.error_wait_ms,
            max_attempts: config.request.max_fetch_attempts,
            cancel: CancellationToken::new(),
        })
    }

    /// Uses `token` to abort pending waits
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Returns true once the cancellation token has fired
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Uniform random jitter in `[0, jitter_ms)`
    pub fn jitter(&self) -> u64 {
        if self.jitter_ms == 0 {
            0
        } else {
            fastrand::u64(0..self.jitter_ms)
        }
    }

    /// Sleeps for `ms` milliseconds
    pub async fn sleep(&self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    /// Politeness delay issued before requesting `url`: `base_delay_ms + jitter()`
    pub async fn polite_pause(&self, url: &str) -> crate::Result<()> {
        self.wait(url, self.base_delay_ms + self.jitter()).await
    }

    /// Delay before retrying a tile after its `attempt`-th failure
    pub fn retry_backoff(&self, attempt: u32) -> u64 {
        exponential_backoff(self.retry_backoff_base, attempt).saturating_add(self.jitter())
    }

    /// Wait after a 403/429, drawn from `[min, max)` of the block window
    pub fn block_wait(&self) -> u64 {
        fastrand::u64(self.block_wait_ms[0]..self.block_wait_ms[1])
    }

    /// Wait after a transport error, drawn from `[min, max)` of the error window
    pub fn error_wait(&self) -> u64 {
        fastrand::u64(self.error_wait_ms[0]..self.error_wait_ms[1])
    }

    /// Picks a User-Agent uniformly from the pool
    pub fn random_user_agent(&self) -> &str {
        if self.user_agents.is_empty() {
            FALLBACK_USER_AGENT
        } else {
            &self.user_agents[fastrand::usize(..self.user_agents.len())]
        }
    }

    /// Generated headers, with caller headers taking precedence
    pub fn request_headers(&self, overrides: &HeaderMap) -> HeaderMap {
        let mut headers = HeaderMap::new();

        let generated: [(&str, &str); 9] = [
            ("user-agent", self.random_user_agent()),
            ("accept", "*/*"),
            ("accept-language", "en-US,en;q=0.9"),
            ("referer", self.referer.as_str()),
            ("upgrade-insecure-requests", "1"),
            ("connection", "keep-alive"),
            ("sec-fetch-site", "same-origin"),
            ("sec-fetch-mode", "navigate"),
            ("sec-fetch-dest", "document"),
        ];

        for (name, value) in generated {
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    headers.insert(HeaderName::from_static(name), value);
                }
                Err(_) => tracing::debug!("Skipping invalid {} header value", name),
            }
        }

        for (name, value) in overrides {
            headers.insert(name.clone(), value.clone());
        }

        headers
    }

    /// Fetches a URL, waiting out blocks and transport errors
    ///
    /// A 403/429 always records a `blocked` entry for the URL. With
    /// `retry_on_block` unset, the blocked response is returned so the caller
    /// can skip it. When an attempt ceiling is reached, a blocked response is
    /// returned as-is and a transport error is returned as
    /// [`MirrorError::Transport`].
    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> crate::Result<Response> {
        let max_attempts = options.max_attempts.or(self.max_attempts);
        let mut attempt: u32 = 0;

        loop {
            if self.is_cancelled() {
                return Err(MirrorError::Cancelled {
                    url: url.to_string(),
                });
            }

            attempt += 1;
            let exhausted = max_attempts.is_some_and(|max| attempt >= max);

            let result = self
                .client
                .request(options.method.clone(), url)
                .headers(self.request_headers(&options.headers))
                .send()
                .await;

            match result {
                Ok(response) if is_blocked(response.status()) => {
                    let code = response.status().as_u16();
                    self.log
                        .log_file_status(url, StatusUpdate::new(FileStatus::Blocked).with_code(code))
                        .await;

                    if !options.retry_on_block || exhausted {
                        return Ok(response);
                    }

                    let wait = self.block_wait();
                    tracing::warn!("Blocked ({}) at {}, waiting {}ms", code, url, wait);
                    self.wait(url, wait).await?;
                }
                Ok(response) => return Ok(response),
                Err(e) => {
                    self.log
                        .log_file_status(
                            url,
                            StatusUpdate::new(FileStatus::Error).with_error(e.to_string()),
                        )
                        .await;

                    if exhausted {
                        return Err(MirrorError::Transport {
                            url: url.to_string(),
                            source: e,
                        });
                    }

                    let wait = self.error_wait();
                    tracing::warn!("Fetch error ({}) at {}, waiting {}ms", e, url, wait);
                    self.wait(url, wait).await?;
                }
            }
        }
    }

    /// Sleeps for `ms` milliseconds, returning [`MirrorError::Cancelled`]
    /// for `url` if the token fires first
    pub async fn wait(&self, url: &str, ms: u64) -> crate::Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(MirrorError::Cancelled {
                url: url.to_string(),
            }),
            _ = self.sleep(ms) => Ok(()),
        }
    }
}
