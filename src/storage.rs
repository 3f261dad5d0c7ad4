//! Storage backend trait and implementations

use crate::error::{Error, Result, write_atomic};
use serde::{Serialize, de::DeserializeOwned};
use std::path::Path;

/// Result of loading one configuration layer from disk
///
/// Distinguishes "the file is not there" from "the file is there but could
/// not be used", so callers can react differently to each.
#[derive(Debug)]
pub enum LoadOutcome<T> {
    /// The file was read and parsed
    Loaded(T),
    /// The file does not exist
    Absent,
    /// The file exists but reading or parsing failed
    Failed(Error),
}

impl<T> LoadOutcome<T> {
    /// Take the loaded value, or `None` for `Absent`/`Failed`
    pub fn loaded(self) -> Option<T> {
        match self {
            LoadOutcome::Loaded(v) => Some(v),
            LoadOutcome::Absent | LoadOutcome::Failed(_) => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, LoadOutcome::Absent)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, LoadOutcome::Failed(_))
    }
}

/// Trait for storage backend implementations
pub trait StorageBackend: Clone + Send + Sync {
    /// File extension for this storage format (e.g., "json")
    fn extension(&self) -> &str;

    /// Serialize data to string
    fn serialize<T: Serialize>(&self, data: &T) -> Result<String>;

    /// Deserialize data from string
    fn deserialize<T: DeserializeOwned>(&self, content: &str) -> Result<T>;

    /// Read and deserialize from file
    fn read<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.deserialize(&content).map_err(|e| Error::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Read a file that may legitimately be missing
    fn load<T: DeserializeOwned>(&self, path: &Path) -> LoadOutcome<T> {
        if !path.exists() {
            return LoadOutcome::Absent;
        }
        match self.read(path) {
            Ok(v) => LoadOutcome::Loaded(v),
            Err(e) => LoadOutcome::Failed(e),
        }
    }

    /// Serialize and write to file
    ///
    /// Uses atomic write: writes to temp file then renames to prevent corruption.
    fn write<T: Serialize>(&self, path: &Path, data: &T) -> Result<()> {
        let content = self.serialize(data)?;
        write_atomic(path, content)
    }
}

// =============================================================================
// JSON Storage Implementation
// =============================================================================

/// JSON storage backend, pretty-printed unless built with [`JsonStorage::compact`]
#[derive(Debug, Clone)]
pub struct JsonStorage {
    pretty: bool,
}

impl JsonStorage {
    pub fn new() -> Self {
        Self { pretty: true }
    }

    /// Single-line output (`compact_json()` on the builder)
    pub fn compact() -> Self {
        Self { pretty: false }
    }
}

impl Default for JsonStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for JsonStorage {
    fn extension(&self) -> &str {
        "json"
    }

    fn serialize<T: Serialize>(&self, data: &T) -> Result<String> {
        if self.pretty {
            serde_json::to_string_pretty(data).map_err(Error::from)
        } else {
            serde_json::to_string(data).map_err(Error::from)
        }
    }

    fn deserialize<T: DeserializeOwned>(&self, content: &str) -> Result<T> {
        serde_json::from_str(content).map_err(Error::from)
    }
}

// =============================================================================
// Tests
// =============================================================================
