/// Per-URL outcome definitions for the download log
///
/// This module defines every status a mirrored resource can be recorded with,
/// plus the log entry and the partial update merged into it.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Recorded outcome of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Resource was fetched and written to disk
    Downloaded,

    /// Resource exhausted its retries
    Failed,

    /// Resource was blocked and deliberately skipped for this run
    Skipped,

    /// Server answered 403/429 for this resource
    Blocked,

    /// Target file was already on disk; no request was issued
    AlreadyExists,

    /// A transport error occurred while fetching the resource
    Error,
}

impl FileStatus {
    /// Returns the serialized name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloaded => "downloaded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Blocked => "blocked",
            Self::AlreadyExists => "already_exists",
            Self::Error => "error",
        }
    }

    /// Returns all statuses
    pub fn all() -> [Self; 6] {
        [
            Self::Downloaded,
            Self::Failed,
            Self::Skipped,
            Self::Blocked,
            Self::AlreadyExists,
            Self::Error,
        ]
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of the download log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceState {
    pub status: FileStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,

    pub updated_at: DateTime<Utc>,

    /// Fields written by other tools, carried through rewrites untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResourceState {
    /// Serialized names of the fields this type owns
    pub const FIELD_NAMES: [&'static str; 6] =
        ["status", "size", "attempts", "error", "code", "updatedAt"];

    /// Creates an entry from its first update
    pub fn from_update(update: StatusUpdate, now: DateTime<Utc>) -> Self {
        Self {
            status: update.status,
            size: update.size,
            attempts: update.attempts,
            error: update.error,
            code: update.code,
            updated_at: now,
            extra: Map::new(),
        }
    }

    /// Merges a partial update into this entry
    ///
    /// Fields absent from the update keep their previous value, so details
    /// accumulate across retries.
    pub fn merge(&mut self, update: StatusUpdate, now: DateTime<Utc>) {
        self.status = update.status;
        if update.size.is_some() {
            self.size = update.size;
        }
        if update.attempts.is_some() {
            self.attempts = update.attempts;
        }
        if update.error.is_some() {
            self.error = update.error;
        }
        if update.code.is_some() {
            self.code = update.code;
        }
        self.updated_at = now;
    }
}

/// Partial update applied to a log entry
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: FileStatus,
    pub size: Option<u64>,
    pub attempts: Option<u32>,
    pub error: Option<String>,
    pub code: Option<u16>,
}

impl StatusUpdate {
    pub fn new(status: FileStatus) -> Self {
        Self {
            status,
            size: None,
            attempts: None,
            error: None,
            code: None,
        }
    }

    pub fn downloaded(size: u64) -> Self {
        Self::new(FileStatus::Downloaded).with_size(size)
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }
}
