//! URL handling module for Tour-Mirror
//!
//! This module provides the crawl scope filter and the deterministic
//! URL→local-path mapping shared by the crawler and the downloader.

mod local_path;
mod scope;

pub use local_path::{fallback_local_path, url_to_local_path};
pub use scope::TourScope;
