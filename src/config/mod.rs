//! Configuration module for Tour-Mirror
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! with a small set of environment-variable overrides.
//!
//! # Example
//!
//! ```no_run
//! use tour_mirror::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Mirroring {} into {}", config.tour.base_url, config.download.output_dir.display());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, DownloadConfig, RequestConfig, TourConfig};

// Re-export parser functions
pub use parser::{
    apply_env_overrides, load_config, parse_config, ENV_MAX_PARALLEL, ENV_MAX_RETRIES,
    ENV_OUTPUT_DIR, ENV_TOUR_URL,
};
pub use validation::validate;
