//! Backup creation, listing and retention

use super::checksum::sha256_hex;
use super::types::{
    BACKUP_PREFIX, BackupFileEntry, BackupManifest, MANIFEST_FILE, MANIFEST_VERSION_CURRENT,
    is_plain_name,
};
use crate::config::{CriticalFile, StoreConfig};
use crate::crypto::CryptoVault;
use crate::error::{Error, Result, create_dir, read_dir, read_file, write_file};
use crate::storage::{JsonStorage, LoadOutcome, StorageBackend};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Creates, lists, prunes and restores backup snapshots
///
/// Backups are plain directories under `backup_dir`, each holding the
/// captured files and a `manifest.json` with their checksums.
pub struct BackupManager {
    pub(crate) app_name: String,
    pub(crate) backup_dir: PathBuf,
    pub(crate) targets: Vec<CriticalFile>,
    pub(crate) retention: usize,
    pub(crate) vault: Arc<CryptoVault>,
    pub(crate) storage: JsonStorage,
}

impl BackupManager {
    pub fn new(config: &StoreConfig, vault: Arc<CryptoVault>) -> Self {
        Self {
            app_name: config.app_name.clone(),
            backup_dir: config.backup_dir.clone(),
            targets: config.backup_targets(),
            retention: config.backup_retention,
            vault,
            storage: config.storage.clone(),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn vault(&self) -> &Arc<CryptoVault> {
        &self.vault
    }

    /// Capture every critical file into a new backup directory
    ///
    /// Missing files are skipped. Prunes old backups afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if a present file cannot be read, encrypted or
    /// written into the backup. The partial backup directory is removed.
    pub fn create_backup(&self) -> Result<BackupManifest> {
        let created_at = Utc::now();
        let (id, dir) = self.reserve_dir(&created_at)?;
        let manifest = self.capture(id, &dir, created_at)?;

        if let Err(e) = self.prune() {
            warn!("Backup pruning failed: {e}");
        }
        Ok(manifest)
    }

    /// Capture every critical file into a backup called `name`
    ///
    /// Named backups are listed and restored like any other but are never
    /// removed by retention pruning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `name` is not a single path segment,
    /// uses the automatic prefix or is already taken, plus any error
    /// [`create_backup`](Self::create_backup) can return.
    pub fn create_named_backup(&self, name: &str) -> Result<BackupManifest> {
        if !is_plain_name(name) || name.starts_with(BACKUP_PREFIX) {
            return Err(Error::Config(format!("Invalid backup name '{name}'")));
        }
        create_dir(&self.backup_dir)?;
        let dir = self.backup_dir.join(name);
        match std::fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::Config(format!("Backup '{name}' already exists")));
            }
            Err(e) => {
                return Err(Error::DirectoryCreate {
                    path: dir,
                    source: e,
                });
            }
        }
        self.capture(name.to_string(), &dir, Utc::now())
    }

    /// Write the files and manifest into `dir`, removing it on failure
    fn capture(&self, id: String, dir: &Path, created_at: DateTime<Utc>) -> Result<BackupManifest> {
        let result = self.write_files(id, dir, created_at);
        if result.is_err() {
            match std::fs::remove_dir_all(dir) {
                Ok(()) => debug!("Removed partial backup {}", dir.display()),
                Err(e) => warn!("Could not remove partial backup {}: {e}", dir.display()),
            }
        }
        result
    }

    fn write_files(&self, id: String, dir: &Path, created_at: DateTime<Utc>) -> Result<BackupManifest> {
        let encrypted = self.vault.is_enabled();

        let mut files = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            if !target.path.exists() {
                debug!("Backup skips missing file: {}", target.path.display());
                continue;
            }
            let bytes = read_file(&target.path)?;
            let sha256 = sha256_hex(&bytes);
            let size_bytes = bytes.len() as u64;

            let (stored_name, stored) = if encrypted {
                (format!("{}.enc", target.name), self.vault.seal(&bytes)?)
            } else {
                (format!("{}.json", target.name), bytes)
            };
            write_file(&dir.join(&stored_name), stored)?;

            files.push(BackupFileEntry {
                name: target.name.clone(),
                stored_name,
                source_path: target.path.clone(),
                sha256,
                size_bytes,
            });
        }

        let manifest = BackupManifest {
            version: MANIFEST_VERSION_CURRENT,
            id,
            app_name: self.app_name.clone(),
            created_at,
            encrypted,
            files,
        };
        self.storage.write(&dir.join(MANIFEST_FILE), &manifest)?;

        info!(
            "Backup created: {} ({} file(s), encrypted: {})",
            manifest.id,
            manifest.files.len(),
            manifest.encrypted
        );
        Ok(manifest)
    }

    /// Create a fresh, uniquely named backup directory
    fn reserve_dir(&self, created_at: &DateTime<Utc>) -> Result<(String, PathBuf)> {
        create_dir(&self.backup_dir)?;
        let base = format!(
            "{BACKUP_PREFIX}{}",
            created_at.format("%Y%m%d_%H%M%S_%6f")
        );

        let mut attempt = 0u32;
        loop {
            let id = if attempt == 0 {
                base.clone()
            } else {
                format!("{base}_{attempt}")
            };
            let dir = self.backup_dir.join(&id);
            match std::fs::create_dir(&dir) {
                Ok(()) => return Ok((id, dir)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => {
                    return Err(Error::DirectoryCreate {
                        path: dir,
                        source: e,
                    });
                }
            }
        }
    }

    /// Manifests of all readable backups, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the backup directory exists but cannot be listed.
    pub fn list_backups(&self) -> Result<Vec<BackupManifest>> {
        let mut manifests: Vec<BackupManifest> = self
            .backup_dirs(true)?
            .into_iter()
            .filter_map(|dir| match self.storage.load(&dir.join(MANIFEST_FILE)) {
                LoadOutcome::Loaded(manifest) => Some(manifest),
                LoadOutcome::Absent => {
                    debug!("Ignoring backup without manifest: {}", dir.display());
                    None
                }
                LoadOutcome::Failed(e) => {
                    warn!("Ignoring unreadable backup manifest: {e}");
                    None
                }
            })
            .collect();

        manifests.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(manifests)
    }

    /// Delete the oldest backups beyond the retention count
    ///
    /// Returns the number of deleted backups.
    ///
    /// # Errors
    ///
    /// Returns an error if a backup directory cannot be removed.
    pub fn prune(&self) -> Result<usize> {
        let mut dirs: Vec<(Option<DateTime<Utc>>, PathBuf)> = self
            .backup_dirs(false)?
            .into_iter()
            .map(|dir| {
                let created = self
                    .storage
                    .load::<BackupManifest>(&dir.join(MANIFEST_FILE))
                    .loaded()
                    .map(|m| m.created_at);
                (created, dir)
            })
            .collect();

        if dirs.len() <= self.retention {
            return Ok(0);
        }

        // Oldest first; directories without a readable manifest go first
        dirs.sort();
        let excess = dirs.len() - self.retention;
        for (_, dir) in dirs.iter().take(excess) {
            std::fs::remove_dir_all(dir).map_err(|e| Error::FileDelete {
                path: dir.clone(),
                source: e,
            })?;
            debug!("Pruned backup: {}", dir.display());
        }

        info!("Pruned {excess} old backup(s)");
        Ok(excess)
    }

    /// Automatic backup directories, plus named ones with a manifest
    fn backup_dirs(&self, include_named: bool) -> Result<Vec<PathBuf>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }
        Ok(read_dir(&self.backup_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                let automatic = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(BACKUP_PREFIX));
                path.is_dir() && (automatic || (include_named && path.join(MANIFEST_FILE).is_file()))
            })
            .collect())
    }
}

impl std::fmt::Debug for BackupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupManager")
            .field("backup_dir", &self.backup_dir)
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(retention: usize, encryption: bool) -> (TempDir, BackupManager) {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("default.json"), r#"{"interface":{"theme":"dark"}}"#)
            .unwrap();
        std::fs::write(temp.path().join("user.json"), r#"{"interface":{"theme":"light"}}"#)
            .unwrap();

        let config = StoreConfig::builder("test")
            .config_dir(temp.path())
            .backup_retention(retention)
            .build();
        let vault = if encryption {
            CryptoVault::from_key(&[9u8; 32], true).unwrap()
        } else {
            CryptoVault::disabled()
        };
        let manager = BackupManager::new(&config, Arc::new(vault));
        (temp, manager)
    }

    #[test]
    fn test_create_plain_backup() {
        let (temp, manager) = setup(5, false);
        let manifest = manager.create_backup().unwrap();

        assert!(manifest.id.starts_with(BACKUP_PREFIX));
        assert!(!manifest.encrypted);
        // schema.json is missing and skipped
        let names: Vec<_> = manifest.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["default", "user"]);

        let dir = manager.backup_dir().join(&manifest.id);
        let stored = std::fs::read(dir.join("user.json")).unwrap();
        assert_eq!(stored, std::fs::read(temp.path().join("user.json")).unwrap());
        assert_eq!(manifest.file("user").unwrap().sha256, sha256_hex(&stored));
        assert!(dir.join(MANIFEST_FILE).exists());
    }

    #[test]
    fn test_create_encrypted_backup() {
        let (temp, manager) = setup(5, true);
        let manifest = manager.create_backup().unwrap();

        assert!(manifest.encrypted);
        let entry = manifest.file("user").unwrap();
        assert_eq!(entry.stored_name, "user.enc");

        let stored = std::fs::read(manager.backup_dir().join(&manifest.id).join("user.enc")).unwrap();
        let original = std::fs::read(temp.path().join("user.json")).unwrap();
        assert_ne!(stored, original);
        assert_eq!(manager.vault().open(&stored).unwrap(), original);
    }

    #[test]
    fn test_ids_are_unique() {
        let (_temp, manager) = setup(10, false);
        let a = manager.create_backup().unwrap();
        let b = manager.create_backup().unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_retention_keeps_most_recent() {
        let (_temp, manager) = setup(5, false);
        let ids: Vec<String> = (0..7)
            .map(|_| manager.create_backup().unwrap().id)
            .collect();

        let remaining: Vec<String> = manager
            .list_backups()
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        let mut expected: Vec<String> = ids[2..].to_vec();
        expected.reverse();
        assert_eq!(remaining, expected);
    }

    #[test]
    fn test_failed_capture_leaves_no_directory() {
        let (temp, manager) = setup(5, false);
        // A directory where user.json should be cannot be read as a file
        let user = temp.path().join("user.json");
        std::fs::remove_file(&user).unwrap();
        std::fs::create_dir(&user).unwrap();

        assert!(manager.create_backup().is_err());
        assert_eq!(std::fs::read_dir(manager.backup_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_named_backup() {
        let (_temp, manager) = setup(1, false);
        let named = manager.create_named_backup("before-upgrade").unwrap();
        assert_eq!(named.id, "before-upgrade");
        assert!(manager.backup_dir().join("before-upgrade").join(MANIFEST_FILE).exists());

        // Retention only counts automatic backups
        manager.create_backup().unwrap();
        manager.create_backup().unwrap();
        let ids: Vec<String> = manager.list_backups().unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"before-upgrade".to_string()));

        assert!(manager.create_named_backup("before-upgrade").is_err());
        for bad in ["", "..", "a/b", "config_backup_x"] {
            assert!(manager.create_named_backup(bad).is_err(), "{bad}");
        }
    }
}
