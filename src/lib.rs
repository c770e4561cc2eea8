//! Tour-Mirror: an offline mirror for panoramic tours
//!
//! This crate mirrors a panoramic-tour asset tree (HTML/JS/CSS, the XML
//! manifest and its image tiles) from a host that rate-limits automated
//! clients. Every outcome is recorded in a resumable JSON log, and files
//! already present on disk are never fetched again.

pub mod config;
pub mod crawler;
pub mod manifest;
pub mod mirror;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Tour-Mirror operations
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error for {url}: {source}")]
    Transport { url: String, source: reqwest::Error },

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Request to {url} was cancelled")]
    Cancelled { url: String },

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Invalid link pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Failed to create output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Tour-Mirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use manifest::TileTask;
pub use state::{FileStatus, ResourceState, StatusUpdate};
pub use output::DownloadStats;
pub use storage::ResumableLog;
pub use url::{url_to_local_path, TourScope};
