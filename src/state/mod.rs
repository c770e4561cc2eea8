//! State module for tracking mirror progress
//!
//! # Components
//!
//! - `FileStatus`: the recorded outcome of a resource (downloaded, failed, skipped, ...)
//! - `ResourceState`: one log entry, keyed by absolute URL
//! - `StatusUpdate`: a partial update merged into an entry

mod file_status;

pub use file_status::{FileStatus, ResourceState, StatusUpdate};
