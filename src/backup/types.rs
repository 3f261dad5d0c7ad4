//! Backup/restore types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Prefix of every backup directory name
pub const BACKUP_PREFIX: &str = "config_backup_";

/// Name of the manifest inside a backup directory
pub const MANIFEST_FILE: &str = "manifest.json";

// =============================================================================
// Manifest Versioning
// =============================================================================

/// Current manifest version used when creating backups
pub const MANIFEST_VERSION_CURRENT: u32 = 1;

/// Minimum manifest version this library can restore from
pub const MANIFEST_VERSION_MIN_SUPPORTED: u32 = 1;

/// Maximum manifest version this library can restore from
pub const MANIFEST_VERSION_MAX_SUPPORTED: u32 = 1;

/// Check if a manifest version is supported for restore
pub fn is_manifest_version_supported(version: u32) -> bool {
    (MANIFEST_VERSION_MIN_SUPPORTED..=MANIFEST_VERSION_MAX_SUPPORTED).contains(&version)
}

/// A single path component, no separators or parent references
pub fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && std::path::Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name)
        && name != ".."
}

/// Manifest written as `manifest.json` into every backup directory
///
/// Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupManifest {
    /// Manifest format version
    pub version: u32,

    /// Directory name of the backup, also its identifier
    pub id: String,

    /// Application that created the backup
    pub app_name: String,

    pub created_at: DateTime<Utc>,

    /// Whether stored files went through the vault
    pub encrypted: bool,

    /// One entry per captured file, in capture order
    pub files: Vec<BackupFileEntry>,
}

impl BackupManifest {
    pub fn file(&self, name: &str) -> Option<&BackupFileEntry> {
        self.files.iter().find(|f| f.name == name)
    }

    /// Total size of the original files
    pub fn size_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

/// One captured file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupFileEntry {
    /// Logical name (`default`, `user`, `schema`, or a critical file name)
    pub name: String,

    /// File name inside the backup directory (`<name>.json` or `<name>.enc`)
    pub stored_name: String,

    /// Where the file lived when it was captured
    pub source_path: PathBuf,

    /// SHA-256 hex of the original (unencrypted) bytes
    pub sha256: String,

    /// Size of the original bytes
    pub size_bytes: u64,
}

/// Result of a restore operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreResult {
    /// Backup that was restored
    pub backup_id: String,

    /// Files written back, by logical name
    pub restored: Vec<String>,

    /// Backup taken right before a rollback, if any
    pub safety_backup: Option<String>,
}

impl RestoreResult {
    /// Check if anything was restored
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.restored.is_empty()
    }
}
