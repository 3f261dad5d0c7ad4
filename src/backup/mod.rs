//! Checksummed, optionally encrypted backup snapshots

mod checksum;
mod operations;
mod restore;
mod types;

pub use checksum::{calculate_file_hash, sha256_hex};
pub use operations::BackupManager;

pub use types::{
    BACKUP_PREFIX, BackupFileEntry, BackupManifest, MANIFEST_FILE, MANIFEST_VERSION_CURRENT,
    MANIFEST_VERSION_MAX_SUPPORTED, MANIFEST_VERSION_MIN_SUPPORTED, RestoreResult,
    is_manifest_version_supported, is_plain_name,
};
