//! Append-only log of resolved sync conflicts

use crate::error::Result;
use crate::storage::{JsonStorage, LoadOutcome, StorageBackend};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Which side won a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Local,
    Server,
}

/// One resolved section conflict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub section: String,
    pub local_value: Value,
    pub server_value: Value,
    pub resolution: Resolution,
    #[serde(default)]
    pub local_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub server_modified: Option<DateTime<Utc>>,
    pub resolved_at: DateTime<Utc>,
}

impl ConflictRecord {
    /// The value that was kept
    pub fn chosen(&self) -> &Value {
        match self.resolution {
            Resolution::Local => &self.local_value,
            Resolution::Server => &self.server_value,
        }
    }
}

/// `conflicts.json`: a JSON array that only ever grows
#[derive(Debug)]
pub struct ConflictLog {
    path: PathBuf,
    storage: JsonStorage,
}

impl ConflictLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            storage: JsonStorage::new(),
        }
    }

    /// Log stored as `conflicts.json` inside `history_dir`
    pub fn in_dir(history_dir: &Path) -> Self {
        Self::new(history_dir.join("conflicts.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records, oldest first
    ///
    /// # Errors
    ///
    /// Returns an error if the log exists but cannot be parsed.
    pub fn entries(&self) -> Result<Vec<ConflictRecord>> {
        match self.storage.load(&self.path) {
            LoadOutcome::Loaded(records) => Ok(records),
            LoadOutcome::Absent => Ok(Vec::new()),
            LoadOutcome::Failed(e) => Err(e),
        }
    }

    /// Append records
    ///
    /// # Errors
    ///
    /// Fails without writing if the existing log cannot be read, so prior
    /// records are never overwritten.
    pub fn append(&self, records: &[ConflictRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut all = self.entries()?;
        all.extend_from_slice(records);
        self.storage.write(&self.path, &all)?;
        debug!("Logged {} sync conflict(s)", records.len());
        Ok(())
    }
}
