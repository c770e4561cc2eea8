//! JSON download log
//!
//! The log is loaded once at startup and rewritten in full on every status
//! change. It is an audit trail: callers decide "already done" by checking
//! the target file on disk, never by reading a status back from here.
//!
//! Loading is lenient. Entries that do not fit [`ResourceState`] and fields
//! this crate does not know about are kept and written back unchanged. A file
//! that cannot be loaded at all is moved aside before a fresh log replaces
//! it, or left alone with persistence disabled if moving it fails.

use crate::output::DownloadStats;
use crate::state::{ResourceState, StatusUpdate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// In-memory contents of the log file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawLog")]
pub struct DownloadLog {
    pub started_at: DateTime<Utc>,
    pub files: BTreeMap<String, ResourceState>,
    /// Entries whose shape is not understood, such as an unknown status
    pub unrecognized: BTreeMap<String, Value>,
    /// Top-level fields other than `startedAt` and `files`
    pub extra: Map<String, Value>,
}

impl DownloadLog {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            files: BTreeMap::new(),
            unrecognized: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    fn len(&self) -> usize {
        self.files.len() + self.unrecognized.len()
    }
}

/// Loose shape accepted on load; only a `files` object is required
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLog {
    #[serde(default)]
    started_at: Option<Value>,
    files: Map<String, Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<RawLog> for DownloadLog {
    fn from(raw: RawLog) -> Self {
        let started_at = raw
            .started_at
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_else(Utc::now);

        let mut files = BTreeMap::new();
        let mut unrecognized = BTreeMap::new();
        for (url, value) in raw.files {
            match ResourceState::deserialize(&value) {
                Ok(state) => {
                    files.insert(url, state);
                }
                Err(e) => {
                    tracing::debug!("Keeping unrecognized log entry {}: {}", url, e);
                    unrecognized.insert(url, value);
                }
            }
        }

        Self {
            started_at,
            files,
            unrecognized,
            extra: raw.extra,
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum LogEntry<'a> {
    Known(&'a ResourceState),
    Unrecognized(&'a Value),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PersistedLog<'a> {
    started_at: &'a DateTime<Utc>,
    files: BTreeMap<&'a str, LogEntry<'a>>,
    #[serde(flatten)]
    extra: &'a Map<String, Value>,
}

impl Serialize for DownloadLog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut files: BTreeMap<&str, LogEntry<'_>> = self
            .unrecognized
            .iter()
            .map(|(url, value)| (url.as_str(), LogEntry::Unrecognized(value)))
            .collect();
        files.extend(
            self.files
                .iter()
                .map(|(url, state)| (url.as_str(), LogEntry::Known(state))),
        );

        PersistedLog {
            started_at: &self.started_at,
            files,
            extra: &self.extra,
        }
        .serialize(serializer)
    }
}

/// Turns an unrecognized entry into a typed one as `update` is applied
///
/// Fields the typed entry cannot hold stay in `extra`.
fn adopt_entry(previous: Value, update: StatusUpdate, now: DateTime<Utc>) -> ResourceState {
    let Value::Object(mut fields) = previous else {
        return ResourceState::from_update(update, now);
    };

    fields.insert("status".to_string(), Value::from(update.status.as_str()));
    fields.insert("updatedAt".to_string(), Value::from(now.to_rfc3339()));

    match ResourceState::deserialize(&Value::Object(fields.clone())) {
        Ok(mut state) => {
            state.merge(update, now);
            state
        }
        Err(_) => {
            let mut state = ResourceState::from_update(update, now);
            fields.retain(|key, _| !ResourceState::FIELD_NAMES.contains(&key.as_str()));
            state.extra = fields;
            state
        }
    }
}

/// Sibling path an unloadable log is moved to, e.g. `log.json.20240301T100000.bak`
fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(format!(".{}.bak", Utc::now().format("%Y%m%dT%H%M%S")));
    PathBuf::from(name)
}

/// Durable, mergeable record of per-URL outcomes
///
/// Shared by every component through an `Arc`. The mutex serializes both the
/// in-memory merge and the file rewrite, so concurrent writers never
/// interleave partial files.
#[derive(Debug)]
pub struct ResumableLog {
    path: PathBuf,
    log: Mutex<DownloadLog>,
    persist: bool,
}

impl ResumableLog {
    /// Opens the log at `path`
    ///
    /// A prior log that loads replaces the fresh in-memory value wholesale.
    /// A missing file starts a new log. A file that exists but cannot be
    /// loaded is never overwritten; none of these cases is fatal.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let (log, persist) = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<DownloadLog>(&content) {
                Ok(existing) => {
                    tracing::info!(
                        "Resuming download log {} ({} entries)",
                        path.display(),
                        existing.len()
                    );
                    if !existing.unrecognized.is_empty() {
                        tracing::warn!(
                            "Keeping {} unrecognized entries in {} as they are",
                            existing.unrecognized.len(),
                            path.display()
                        );
                    }
                    (existing, true)
                }
                Err(e) => {
                    tracing::warn!("Unreadable log {}: {}", path.display(), e);
                    (DownloadLog::new(), Self::set_aside(&path).await)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (DownloadLog::new(), true),
            Err(e) => {
                tracing::warn!(
                    "Failed to read log {}: {}; status changes will not be saved",
                    path.display(),
                    e
                );
                (DownloadLog::new(), false)
            }
        };

        Self {
            path,
            log: Mutex::new(log),
            persist,
        }
    }

    /// Moves an unloadable log out of the way; false if it is still in place
    async fn set_aside(path: &Path) -> bool {
        let backup = backup_path(path);
        match tokio::fs::rename(path, &backup).await {
            Ok(()) => {
                tracing::warn!("Moved unreadable log to {}", backup.display());
                true
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to move {} aside: {}; status changes will not be saved",
                    path.display(),
                    e
                );
                false
            }
        }
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merges `update` into the entry for `url` and rewrites the log file
    ///
    /// Write failures are logged and swallowed.
    pub async fn log_file_status(&self, url: &str, update: StatusUpdate) {
        let mut log = self.log.lock().await;
        let now = Utc::now();

        if let Some(entry) = log.files.get_mut(url) {
            entry.merge(update, now);
        } else {
            let entry = match log.unrecognized.remove(url) {
                Some(previous) => adopt_entry(previous, update, now),
                None => ResourceState::from_update(update, now),
            };
            log.files.insert(url.to_string(), entry);
        }

        if !self.persist {
            return;
        }
        if let Err(e) = self.write(&log).await {
            tracing::warn!("Failed to write log {}: {}", self.path.display(), e);
        }
    }

    /// Returns the current entry for `url`, for reporting
    pub async fn file_status(&self, url: &str) -> Option<ResourceState> {
        self.log.lock().await.files.get(url).cloned()
    }

    /// Counts entries per status and sums recorded sizes
    ///
    /// Unrecognized entries are not counted.
    pub async fn stats(&self) -> DownloadStats {
        let log = self.log.lock().await;
        DownloadStats::from_states(log.files.values())
    }

    /// Returns a copy of the whole log
    pub async fn snapshot(&self) -> DownloadLog {
        self.log.lock().await.clone()
    }

    async fn write(&self, log: &DownloadLog) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(log)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // Full rewrite through a sibling file so a crash never leaves half a log
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await
    }
}
