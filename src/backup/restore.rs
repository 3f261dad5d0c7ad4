//! Backup/restore logic
//!
//! A restore is all-or-nothing: every entry is read, decrypted and
//! checksum-verified in memory, then written to temp files next to the
//! destinations. Only when every temp file is on disk are they renamed into
//! place; a failed rename puts the earlier destinations back.

use super::BackupManager;
use super::checksum::sha256_hex;
use super::types::{
    BackupManifest, MANIFEST_FILE, RestoreResult, is_manifest_version_supported, is_plain_name,
};
use crate::error::{Error, Result, StagedWrite, read_file, stage_atomic, write_atomic};
use crate::storage::{LoadOutcome, StorageBackend};

use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};

/// A verified file waiting to be written back
struct StagedFile {
    name: String,
    destination: PathBuf,
    bytes: Vec<u8>,
}

/// A fully verified backup, ready to apply
struct StagedRestore {
    manifest: BackupManifest,
    files: Vec<StagedFile>,
}

impl BackupManager {
    /// Restore the backup with the given id
    ///
    /// The caller is responsible for reloading any store reading these files.
    ///
    /// # Errors
    ///
    /// - [`Error::BackupNotFound`] if no such backup exists
    /// - [`Error::InvalidBackup`] if the manifest is unreadable or unsupported
    /// - [`Error::ChecksumMismatch`] / [`Error::Crypto`] if any entry fails
    ///   verification; nothing is written in that case
    pub fn restore(&self, id: &str) -> Result<RestoreResult> {
        info!("Restoring from backup: {id}");
        let staged = self.stage(id)?;
        self.apply(staged)
    }

    /// Back up the current state, then restore `id` (or the newest backup)
    ///
    /// The target is verified before the safety backup is taken, so
    /// retention pruning cannot remove it first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackupNotFound`] if there is nothing to roll back to,
    /// plus any error [`restore`](Self::restore) can return.
    pub fn rollback(&self, id: Option<&str>) -> Result<RestoreResult> {
        let target = match id {
            Some(id) => id.to_string(),
            None => self
                .list_backups()?
                .into_iter()
                .next()
                .map(|m| m.id)
                .ok_or_else(|| Error::BackupNotFound("no backups available".into()))?,
        };

        let staged = self.stage(&target)?;
        let safety = self.create_backup()?;
        info!("Rolling back to {target} (safety backup: {})", safety.id);

        let mut result = self.apply(staged)?;
        result.safety_backup = Some(safety.id);
        Ok(result)
    }

    /// Read and verify every entry of a backup without writing anything
    fn stage(&self, id: &str) -> Result<StagedRestore> {
        if !is_plain_name(id) {
            return Err(Error::BackupNotFound(id.to_string()));
        }
        let dir = self.backup_dir.join(id);
        if !dir.is_dir() {
            return Err(Error::BackupNotFound(id.to_string()));
        }

        let manifest: BackupManifest = match self.storage.load(&dir.join(MANIFEST_FILE)) {
            LoadOutcome::Loaded(m) => m,
            LoadOutcome::Absent => {
                return Err(Error::InvalidBackup(format!("{id}: manifest missing")));
            }
            LoadOutcome::Failed(e) => {
                return Err(Error::InvalidBackup(format!("{id}: {e}")));
            }
        };

        if !is_manifest_version_supported(manifest.version) {
            return Err(Error::InvalidBackup(format!(
                "{id}: manifest version {} is not supported",
                manifest.version
            )));
        }

        let mut files = Vec::with_capacity(manifest.files.len());
        for entry in &manifest.files {
            if !is_plain_name(&entry.stored_name) {
                return Err(Error::InvalidBackup(format!(
                    "{id}: invalid stored name '{}'",
                    entry.stored_name
                )));
            }

            let stored = read_file(&dir.join(&entry.stored_name))?;
            let bytes = if manifest.encrypted {
                self.vault.open(&stored)?
            } else {
                stored
            };

            let actual = sha256_hex(&bytes);
            if actual != entry.sha256 {
                warn!(
                    "Checksum mismatch in backup {id} for '{}': expected {}, got {actual}",
                    entry.name, entry.sha256
                );
                return Err(Error::ChecksumMismatch {
                    file: entry.name.clone(),
                    expected: entry.sha256.clone(),
                    actual,
                });
            }
            debug!("Verified '{}' ({} bytes)", entry.name, bytes.len());

            files.push(StagedFile {
                name: entry.name.clone(),
                destination: self.destination(&entry.name, &entry.source_path),
                bytes,
            });
        }

        Ok(StagedRestore { manifest, files })
    }

    /// Write verified files to their destinations
    fn apply(&self, staged: StagedRestore) -> Result<RestoreResult> {
        // Nothing at a destination changes until every file is staged
        let mut writes: Vec<(String, StagedWrite, Option<Vec<u8>>)> =
            Vec::with_capacity(staged.files.len());
        for file in staged.files {
            let previous = match std::fs::read(&file.destination) {
                Ok(bytes) => Some(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => {
                    return Err(Error::FileRead {
                        path: file.destination,
                        source: e,
                    });
                }
            };
            let write = stage_atomic(&file.destination, &file.bytes)?;
            writes.push((file.name, write, previous));
        }

        let mut committed: Vec<(PathBuf, Option<Vec<u8>>)> = Vec::with_capacity(writes.len());
        let mut restored = Vec::with_capacity(writes.len());
        for (name, write, previous) in writes {
            let destination = write.path().to_path_buf();
            if let Err(e) = write.commit() {
                warn!("Restore of '{name}' failed, putting back {} file(s)", committed.len());
                put_back(&committed);
                return Err(e);
            }
            debug!("Restored '{name}' to {}", destination.display());
            committed.push((destination, previous));
            restored.push(name);
        }

        info!(
            "Restore complete: {} file(s) from {}",
            restored.len(),
            staged.manifest.id
        );
        Ok(RestoreResult {
            backup_id: staged.manifest.id,
            restored,
            safety_backup: None,
        })
    }

    /// Current location for a logical name, falling back to the captured path
    fn destination(&self, name: &str, recorded: &Path) -> PathBuf {
        self.targets
            .iter()
            .find(|t| t.name == name)
            .map_or_else(|| recorded.to_path_buf(), |t| t.path.clone())
    }
}

/// Return already-replaced destinations to their previous contents
fn put_back(committed: &[(PathBuf, Option<Vec<u8>>)]) {
    for (path, previous) in committed.iter().rev() {
        let result = match previous {
            Some(bytes) => write_atomic(path, bytes),
            None => std::fs::remove_file(path).map_err(|e| Error::FileWrite {
                path: path.clone(),
                source: e,
            }),
        };
        if let Err(e) = result {
            error!("Could not put back {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::crypto::CryptoVault;
    use crate::error::ErrorKind;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn setup(encryption: bool) -> (TempDir, BackupManager) {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("default.json"), r#"{"speech":{"synthesis":{"rate":150}}}"#)
            .unwrap();
        std::fs::write(temp.path().join("user.json"), r#"{"interface":{"theme":"light"}}"#)
            .unwrap();
        std::fs::write(temp.path().join("schema.json"), r#"{"type":"object"}"#).unwrap();

        let config = StoreConfig::builder("test").config_dir(temp.path()).build();
        let vault = if encryption {
            CryptoVault::from_key(&[3u8; 32], true).unwrap()
        } else {
            CryptoVault::disabled()
        };
        (temp, BackupManager::new(&config, Arc::new(vault)))
    }

    #[test]
    fn test_restore_reproduces_files() {
        for encryption in [false, true] {
            let (temp, manager) = setup(encryption);
            let user = temp.path().join("user.json");
            let original = std::fs::read(&user).unwrap();

            let manifest = manager.create_backup().unwrap();
            std::fs::write(&user, r#"{"interface":{"theme":"neon"}}"#).unwrap();
            std::fs::remove_file(temp.path().join("schema.json")).unwrap();

            let result = manager.restore(&manifest.id).unwrap();
            assert_eq!(result.restored, vec!["default", "user", "schema"]);
            assert_eq!(std::fs::read(&user).unwrap(), original);
            assert!(temp.path().join("schema.json").exists());
        }
    }

    #[test]
    fn test_flipped_byte_fails_closed() {
        for encryption in [false, true] {
            let (temp, manager) = setup(encryption);
            let manifest = manager.create_backup().unwrap();

            // Corrupt the last entry so earlier entries would verify fine
            let entry = manifest.file("schema").unwrap();
            let stored = manager.backup_dir().join(&manifest.id).join(&entry.stored_name);
            let mut bytes = std::fs::read(&stored).unwrap();
            let last = bytes.len() - 1;
            bytes[last] ^= 0x01;
            std::fs::write(&stored, bytes).unwrap();

            std::fs::write(temp.path().join("user.json"), "{}").unwrap();

            let err = manager.restore(&manifest.id).unwrap_err();
            let expected = if encryption {
                ErrorKind::Crypto
            } else {
                ErrorKind::ChecksumMismatch
            };
            assert_eq!(err.kind(), expected);
            // Nothing was applied, not even the intact entries
            assert_eq!(std::fs::read_to_string(temp.path().join("user.json")).unwrap(), "{}");
        }
    }

    #[test]
    fn test_failed_write_restores_nothing() {
        let (temp, manager) = setup(false);
        let manifest = manager.create_backup().unwrap();

        std::fs::write(temp.path().join("default.json"), r#"{"speech":{}}"#).unwrap();
        std::fs::write(temp.path().join("user.json"), "{}").unwrap();
        // A non-empty directory where the last entry goes cannot be replaced
        let schema = temp.path().join("schema.json");
        std::fs::remove_file(&schema).unwrap();
        std::fs::create_dir(&schema).unwrap();
        std::fs::write(schema.join("keep"), "x").unwrap();

        assert!(manager.restore(&manifest.id).is_err());
        assert_eq!(
            std::fs::read_to_string(temp.path().join("default.json")).unwrap(),
            r#"{"speech":{}}"#
        );
        assert_eq!(std::fs::read_to_string(temp.path().join("user.json")).unwrap(), "{}");
        assert!(schema.join("keep").exists());

        // No temp files left next to the destinations
        let names: Vec<String> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().all(|n| !n.starts_with(".tmp")), "{names:?}");
    }

    #[test]
    fn test_restore_unknown_backup() {
        let (_temp, manager) = setup(false);
        assert!(matches!(
            manager.restore("config_backup_nope").unwrap_err(),
            Error::BackupNotFound(_)
        ));
        assert!(matches!(
            manager.restore("../etc").unwrap_err(),
            Error::BackupNotFound(_)
        ));
    }

    #[test]
    fn test_tampered_stored_name_is_rejected() {
        let (_temp, manager) = setup(false);
        let manifest = manager.create_backup().unwrap();
        let path = manager.backup_dir().join(&manifest.id).join(MANIFEST_FILE);

        let mut tampered = manifest.clone();
        tampered.files[0].stored_name = "../../evil.json".into();
        std::fs::write(&path, serde_json::to_string(&tampered).unwrap()).unwrap();

        assert!(matches!(
            manager.restore(&manifest.id).unwrap_err(),
            Error::InvalidBackup(_)
        ));
    }

    #[test]
    fn test_rollback_to_latest() {
        let (temp, manager) = setup(false);
        let user = temp.path().join("user.json");
        let before = std::fs::read(&user).unwrap();
        manager.create_backup().unwrap();

        std::fs::write(&user, r#"{"interface":{"theme":"neon"}}"#).unwrap();
        let result = manager.rollback(None).unwrap();

        assert_eq!(std::fs::read(&user).unwrap(), before);
        let safety = result.safety_backup.unwrap();
        assert_ne!(safety, result.backup_id);

        // The safety backup captured the pre-rollback state
        let listed = manager.list_backups().unwrap();
        let safety_manifest = listed.iter().find(|m| m.id == safety).unwrap();
        assert_eq!(
            safety_manifest.file("user").unwrap().sha256,
            sha256_hex(br#"{"interface":{"theme":"neon"}}"#)
        );
    }

    #[test]
    fn test_rollback_without_backups() {
        let (_temp, manager) = setup(false);
        assert!(manager.rollback(None).unwrap_err().is_not_found());
    }
}
