//! JSON file holding the most recent weekly runs.
//!
//! The file is a pretty-printed array of [`HistoryEntry`], oldest first,
//! capped at [`MAX_HISTORY_ITEMS`]. Writes go to a sibling temp file that is
//! fsynced and then renamed over the target, so a crash never leaves a
//! half-written history behind.

use serde_json::Value;
use stablecoin_core::{HistoryEntry, MetricsSnapshot, ReportError};
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One year of weekly runs.
pub const MAX_HISTORY_ITEMS: usize = 52;

pub const DEFAULT_HISTORY_PATH: &str = "data/weekly_history.json";

#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    capacity: usize,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_capacity(path, MAX_HISTORY_ITEMS)
    }

    pub fn with_capacity(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity: capacity.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the history. A missing or blank file is an empty history.
    ///
    /// Any array item that is not a valid entry makes the whole file
    /// unusable, so a later save never drops records it could not read.
    pub fn load(&self) -> Result<Vec<HistoryEntry>, ReportError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let data: Value = serde_json::from_str(&raw).map_err(|_| {
            ReportError::data_unavailable(format!("Invalid JSON in {}", self.path.display()))
        })?;
        let Value::Array(items) = data else {
            return Err(ReportError::data_unavailable(format!(
                "History file must contain a JSON array: {}",
                self.path.display()
            )));
        };

        let history = items
            .into_iter()
            .map(|item| {
                serde_json::from_value::<HistoryEntry>(item).map_err(|e| {
                    ReportError::data_unavailable(format!(
                        "Invalid history entry in {}: {}",
                        self.path.display(),
                        e
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(path = %self.path.display(), entries = history.len(), "History loaded");
        Ok(history)
    }

    /// Append an entry, evicting the oldest beyond capacity.
    pub fn append(&self, history: &mut Vec<HistoryEntry>, entry: HistoryEntry) {
        history.push(entry);
        if history.len() > self.capacity {
            let excess = history.len() - self.capacity;
            history.drain(..excess);
        }
    }

    /// Write the last `capacity` entries atomically.
    pub fn save(&self, history: &[HistoryEntry]) -> Result<(), ReportError> {
        let start = history.len().saturating_sub(self.capacity);
        let mut body = serde_json::to_string_pretty(&history[start..])?;
        body.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let temp = self.temp_path();
        write_synced(&temp, body.as_bytes())?;
        if let Err(e) = fs::rename(&temp, &self.path) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        fsync_parent(&self.path)?;

        debug!(
            path = %self.path.display(),
            entries = history.len() - start,
            "History saved"
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(unix)]
fn fsync_parent(path: &Path) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::File::open(parent)?.sync_all()
}

// Directories cannot be fsynced here
#[cfg(not(unix))]
fn fsync_parent(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Metrics of the most recent run, if any.
pub fn previous_metrics(history: &[HistoryEntry]) -> Option<&MetricsSnapshot> {
    history.last().map(|entry| &entry.metrics)
}
