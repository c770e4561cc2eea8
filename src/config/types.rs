use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for Tour-Mirror
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub tour: TourConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub request: RequestConfig,
}

/// The tour being mirrored
#[derive(Debug, Clone, Deserialize)]
pub struct TourConfig {
    /// Base URL of the tour; must end with a path separator
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Manifest file name, relative to the base URL
    #[serde(rename = "xml-file", default = "default_xml_file")]
    pub xml_file: String,

    /// Fixed files fetched before the manifest
    #[serde(rename = "base-files", default = "default_base_files")]
    pub base_files: Vec<String>,

    /// Path prefix of bare relative literals worth following in text content
    #[serde(rename = "reserved-prefix", default = "default_reserved_prefix")]
    pub reserved_prefix: String,
}

/// Download behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadConfig {
    /// Root directory of the offline mirror
    #[serde(rename = "output-dir", default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Maximum number of concurrently running tasks
    #[serde(rename = "max-parallel", default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Retries applied to a tile after a non-block failure
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Log file name, stored inside the output directory
    #[serde(rename = "log-file", default = "default_log_file")]
    pub log_file: String,
}

/// Request pacing and anti-blocking behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct RequestConfig {
    /// Politeness delay before each request (milliseconds)
    #[serde(rename = "base-delay-ms", default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound (exclusive) of the random jitter (milliseconds)
    #[serde(rename = "jitter-ms", default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Base of the exponential tile retry backoff (milliseconds)
    #[serde(rename = "retry-backoff-base", default = "default_retry_backoff_base")]
    pub retry_backoff_base: u64,

    /// Pool of User-Agent strings, one drawn at random per request
    #[serde(rename = "user-agents", default = "default_user_agents")]
    pub user_agents: Vec<String>,

    /// Wait window after a 403/429 response, `[min, max)` milliseconds
    #[serde(rename = "block-wait-ms", default = "default_block_wait_ms")]
    pub block_wait_ms: [u64; 2],

    /// Wait window after a transport error, `[min, max)` milliseconds
    #[serde(rename = "error-wait-ms", default = "default_error_wait_ms")]
    pub error_wait_ms: [u64; 2],

    /// Optional ceiling on gateway attempts; absent means wait forever
    #[serde(rename = "max-fetch-attempts", default)]
    pub max_fetch_attempts: Option<u32>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_parallel: default_max_parallel(),
            max_retries: default_max_retries(),
            log_file: default_log_file(),
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            jitter_ms: default_jitter_ms(),
            retry_backoff_base: default_retry_backoff_base(),
            user_agents: default_user_agents(),
            block_wait_ms: default_block_wait_ms(),
            error_wait_ms: default_error_wait_ms(),
            max_fetch_attempts: None,
        }
    }
}

impl Config {
    /// Path of the resumable download log
    pub fn log_path(&self) -> PathBuf {
        self.download.output_dir.join(&self.download.log_file)
    }

    /// Absolute URL of the tour manifest
    pub fn manifest_url(&self) -> String {
        format!("{}{}", self.tour.base_url, self.tour.xml_file)
    }
}

fn default_xml_file() -> String {
    "tour.xml".to_string()
}

fn default_base_files() -> Vec<String> {
    vec![
        "index.html".to_string(),
        "tour.js".to_string(),
        "krpano.js".to_string(),
    ]
}

fn default_reserved_prefix() -> String {
    "/recorridos/".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./tour_offline")
}

fn default_max_parallel() -> usize {
    5
}

fn default_max_retries() -> u32 {
    5
}

fn default_log_file() -> String {
    "download_log.json".to_string()
}

fn default_base_delay_ms() -> u64 {
    300
}

fn default_jitter_ms() -> u64 {
    400
}

fn default_retry_backoff_base() -> u64 {
    800
}

fn default_user_agents() -> Vec<String> {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0".to_string(),
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_6) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Safari/605.1.15".to_string(),
    ]
}

fn default_block_wait_ms() -> [u64; 2] {
    [5000, 10000]
}

fn default_error_wait_ms() -> [u64; 2] {
    [3000, 6000]
}
