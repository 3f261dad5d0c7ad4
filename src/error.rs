//! Error types for confkeep
//!
//! Every variant maps onto a closed [`ErrorKind`], and every kind maps onto a
//! [`Recovery`] strategy through an explicit table. Callers match on the kind
//! instead of inspecting messages.

use crate::config::Violation;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for confkeep operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for confkeep
#[derive(Error, Debug)]
pub enum Error {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory '{path}': {source}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read directory '{path}': {source}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete '{path}': {source}")]
    FileDelete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Failed to serialize data: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to parse '{path}': {reason}")]
    Parse { path: PathBuf, reason: String },

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------
    #[error("Configuration rejected: {}", format_violations(.0))]
    Validation(Vec<Violation>),

    // -------------------------------------------------------------------------
    // Backup Errors
    // -------------------------------------------------------------------------
    #[error("Checksum mismatch for '{file}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("Backup '{0}' not found")]
    BackupNotFound(String),

    #[error("Invalid backup: {0}")]
    InvalidBackup(String),

    // -------------------------------------------------------------------------
    // Crypto / Sync Errors
    // -------------------------------------------------------------------------
    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Ambiguous conflict in section '{0}': no usable modification timestamps")]
    AmbiguousConflict(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Closed classification of failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Schema or domain rule violation
    Validation,
    /// File missing or unreadable
    Io,
    /// Restored bytes do not match the recorded checksum
    ChecksumMismatch,
    /// Decryption or key failure
    Crypto,
    /// Remote call failed or timed out
    Network,
    /// Conflict timestamps missing or equal
    AmbiguousConflict,
    /// Misconfiguration of the store itself
    Config,
}

/// What a caller should do about a failure of a given kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Refuse the mutation, leave live state untouched
    RefuseMutation,
    /// Continue with an empty/default baseline
    FallBackToBaseline,
    /// Abort the whole operation without applying anything
    FailClosed,
    /// Treat the payload as unrecoverable, never guess
    TreatAsUnrecoverable,
    /// Log and skip the current cycle, retry on the next tick
    SkipCycle,
    /// Take the server value and warn
    PreferServer,
    /// Surface to the caller
    Abort,
}

impl ErrorKind {
    /// Recovery table
    #[must_use]
    pub fn recovery(self) -> Recovery {
        match self {
            ErrorKind::Validation => Recovery::RefuseMutation,
            ErrorKind::Io => Recovery::FallBackToBaseline,
            ErrorKind::ChecksumMismatch => Recovery::FailClosed,
            ErrorKind::Crypto => Recovery::TreatAsUnrecoverable,
            ErrorKind::Network => Recovery::SkipCycle,
            ErrorKind::AmbiguousConflict => Recovery::PreferServer,
            ErrorKind::Config => Recovery::Abort,
        }
    }
}

impl Error {
    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::FileRead { .. }
            | Error::FileWrite { .. }
            | Error::DirectoryCreate { .. }
            | Error::DirectoryRead { .. }
            | Error::FileDelete { .. }
            | Error::Parse { .. }
            | Error::BackupNotFound(_) => ErrorKind::Io,
            Error::Serialize(_) | Error::Config(_) => ErrorKind::Config,
            Error::Validation(_) => ErrorKind::Validation,
            Error::ChecksumMismatch { .. } | Error::InvalidBackup(_) => {
                ErrorKind::ChecksumMismatch
            }
            Error::Crypto(_) => ErrorKind::Crypto,
            Error::Network(_) => ErrorKind::Network,
            Error::AmbiguousConflict(_) => ErrorKind::AmbiguousConflict,
        }
    }

    /// Shortcut for `self.kind().recovery()`
    #[must_use]
    pub fn recovery(&self) -> Recovery {
        self.kind().recovery()
    }

    /// Check if this is a "not found" type error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::BackupNotFound(_) => true,
            Error::FileRead { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

// =============================================================================
// Filesystem Helper Functions
// =============================================================================
// These reduce repetitive map_err patterns across the crate.

/// Create a directory (and parents) with proper error handling
pub fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| Error::DirectoryCreate {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read a whole file with proper error handling
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write content to a file with proper error handling
pub fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    std::fs::write(path, contents).map_err(|e| Error::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read directory entries with proper error handling
pub fn read_dir(path: &Path) -> Result<std::fs::ReadDir> {
    std::fs::read_dir(path).map_err(|e| Error::DirectoryRead {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write `contents` to a temp file next to `path` and rename over it
///
/// Readers never observe a half-written file.
pub fn write_atomic(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    stage_atomic(path, contents)?.commit()
}

/// `contents` written and synced next to `path`, not yet in place
///
/// Dropping the result without [`commit`](StagedWrite::commit) removes the
/// temp file and leaves `path` untouched.
pub fn stage_atomic(path: &Path, contents: impl AsRef<[u8]>) -> Result<StagedWrite> {
    use std::io::Write;

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    create_dir(parent)?;

    let write_err = |e: std::io::Error| Error::FileWrite {
        path: path.to_path_buf(),
        source: e,
    };
    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
    temp.write_all(contents.as_ref()).map_err(write_err)?;
    temp.as_file().sync_all().map_err(write_err)?;
    Ok(StagedWrite {
        temp,
        path: path.to_path_buf(),
    })
}

/// A synced temp file waiting to be renamed over its destination
#[derive(Debug)]
pub struct StagedWrite {
    temp: tempfile::NamedTempFile,
    path: std::path::PathBuf,
}

impl StagedWrite {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rename the temp file over the destination
    pub fn commit(self) -> Result<()> {
        let Self { temp, path } = self;
        temp.persist(&path).map_err(|e| Error::FileWrite {
            path,
            source: e.error,
        })?;
        Ok(())
    }
}
