//! Store configuration and its builder

use crate::storage::JsonStorage;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of backups kept on disk
pub const DEFAULT_BACKUP_RETENTION: usize = 5;
/// Default automatic backup interval (one hour)
pub const DEFAULT_BACKUP_INTERVAL: Duration = Duration::from_secs(3600);
/// Default sync interval (five minutes)
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(300);
/// Default network timeout for sync calls
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(30);
/// Default change-history age cap (30 days)
pub const DEFAULT_HISTORY_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 3600);
/// Default change-history count cap
pub const DEFAULT_HISTORY_MAX_FILES: usize = 100;

/// An additional file included in every backup (e.g. an error or crash log)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriticalFile {
    /// Name used in the backup manifest; must be unique per store
    pub name: String,
    /// Location on disk, also the restore destination
    pub path: PathBuf,
}

impl CriticalFile {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Configuration for a [`ConfigStore`](crate::ConfigStore) and the components around it
#[derive(Clone)]
pub struct StoreConfig {
    /// Application name (used for the default directory and the sync user agent)
    pub app_name: String,

    /// Directory holding default, user and schema files
    pub config_dir: PathBuf,

    /// Filename of the shipped defaults
    pub default_file: String,

    /// Filename of the user overlay
    pub user_file: String,

    /// Filename of the schema
    pub schema_file: String,

    /// Directory holding one sub-directory per backup
    pub backup_dir: PathBuf,

    /// Directory holding change-set files and the conflict log
    pub history_dir: PathBuf,

    /// Location of the symmetric key
    pub key_file: PathBuf,

    /// Extra files included in backups
    pub critical_files: Vec<CriticalFile>,

    /// Number of backups kept after pruning
    pub backup_retention: usize,

    /// Interval of the automatic backup timer
    pub backup_interval: Duration,

    /// Change-sets older than this are compacted away
    pub history_max_age: Duration,

    /// At most this many change-sets are kept
    pub history_max_files: usize,

    /// Forces encryption on or off; `None` follows
    /// `security.data_privacy.encryption_enabled` in the loaded configuration
    pub encryption: Option<bool>,

    /// Sync endpoint; `None` falls back to `sync.url` in the configuration
    pub sync_endpoint: Option<String>,

    /// Bearer token for the sync endpoint; `None` falls back to `sync.token`
    pub sync_token: Option<String>,

    /// Timeout applied to every sync request
    pub sync_timeout: Duration,

    /// Storage backend
    pub storage: JsonStorage,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("app_name", &self.app_name)
            .field("config_dir", &self.config_dir)
            .field("backup_dir", &self.backup_dir)
            .field("history_dir", &self.history_dir)
            .field("key_file", &self.key_file)
            .field("encryption", &self.encryption)
            .field("sync_endpoint", &self.sync_endpoint)
            .field("sync_token", &self.sync_token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl StoreConfig {
    /// Create a new builder for `StoreConfig`
    ///
    /// # Example
    /// ```rust
    /// use confkeep::StoreConfig;
    ///
    /// let config = StoreConfig::builder("assistant")
    ///     .config_dir("/tmp/assistant/config")
    ///     .backup_retention(3)
    ///     .build();
    /// assert_eq!(config.backup_retention, 3);
    /// ```
    pub fn builder(app_name: impl Into<String>) -> StoreConfigBuilder {
        StoreConfigBuilder::new(app_name)
    }

    pub fn default_path(&self) -> PathBuf {
        self.config_dir.join(&self.default_file)
    }

    pub fn user_path(&self) -> PathBuf {
        self.config_dir.join(&self.user_file)
    }

    pub fn schema_path(&self) -> PathBuf {
        self.config_dir.join(&self.schema_file)
    }

    /// Per-section modification timestamps, kept next to the user overlay
    pub fn modified_path(&self) -> PathBuf {
        self.config_dir.join(".modified.json")
    }

    /// Every file a backup captures, in manifest order
    pub fn backup_targets(&self) -> Vec<CriticalFile> {
        let mut targets = vec![
            CriticalFile::new("default", self.default_path()),
            CriticalFile::new("user", self.user_path()),
            CriticalFile::new("schema", self.schema_path()),
        ];
        targets.extend(self.critical_files.iter().cloned());
        targets
    }
}

/// Builder for creating `StoreConfig` with a fluent API
#[derive(Debug, Clone)]
pub struct StoreConfigBuilder {
    app_name: String,
    config_dir: Option<PathBuf>,
    default_file: String,
    user_file: String,
    schema_file: String,
    backup_dir: Option<PathBuf>,
    history_dir: Option<PathBuf>,
    key_file: Option<PathBuf>,
    critical_files: Vec<CriticalFile>,
    backup_retention: usize,
    backup_interval: Duration,
    history_max_age: Duration,
    history_max_files: usize,
    encryption: Option<bool>,
    sync_endpoint: Option<String>,
    sync_token: Option<String>,
    sync_timeout: Duration,
    pretty_json: bool,
}

impl StoreConfigBuilder {
    /// Create a new builder with the required app name
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            config_dir: None,
            default_file: "default.json".into(),
            user_file: "user.json".into(),
            schema_file: "schema.json".into(),
            backup_dir: None,
            history_dir: None,
            key_file: None,
            critical_files: Vec::new(),
            backup_retention: DEFAULT_BACKUP_RETENTION,
            backup_interval: DEFAULT_BACKUP_INTERVAL,
            history_max_age: DEFAULT_HISTORY_MAX_AGE,
            history_max_files: DEFAULT_HISTORY_MAX_FILES,
            encryption: None,
            sync_endpoint: None,
            sync_token: None,
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            pretty_json: true,
        }
    }

    /// Set the configuration directory
    ///
    /// Supports `~` expansion for home directory.
    pub fn config_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.config_dir = Some(expand_home(path.as_ref()));
        self
    }

    /// Set the backup directory (default: `<config_dir>/backups`)
    pub fn backup_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.backup_dir = Some(expand_home(path.as_ref()));
        self
    }

    /// Set the history directory (default: `<config_dir>/history`)
    pub fn history_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.history_dir = Some(expand_home(path.as_ref()));
        self
    }

    /// Set the key file (default: `<config_dir>/security/encryption.key`)
    pub fn key_file(mut self, path: impl AsRef<Path>) -> Self {
        self.key_file = Some(expand_home(path.as_ref()));
        self
    }

    pub fn default_file(mut self, filename: impl Into<String>) -> Self {
        self.default_file = filename.into();
        self
    }

    pub fn user_file(mut self, filename: impl Into<String>) -> Self {
        self.user_file = filename.into();
        self
    }

    pub fn schema_file(mut self, filename: impl Into<String>) -> Self {
        self.schema_file = filename.into();
        self
    }

    /// Register an extra file to include in every backup
    ///
    /// # Example
    /// ```rust
    /// use confkeep::{CriticalFile, StoreConfig};
    ///
    /// let config = StoreConfig::builder("assistant")
    ///     .with_critical_file(CriticalFile::new("crash_log", "/tmp/assistant/crash.log"))
    ///     .build();
    /// assert_eq!(config.backup_targets().len(), 4);
    /// ```
    pub fn with_critical_file(mut self, file: CriticalFile) -> Self {
        self.critical_files.push(file);
        self
    }

    /// Number of backups kept after each new one (minimum 1)
    pub fn backup_retention(mut self, count: usize) -> Self {
        self.backup_retention = count.max(1);
        self
    }

    pub fn backup_interval(mut self, interval: Duration) -> Self {
        self.backup_interval = interval;
        self
    }

    pub fn history_max_age(mut self, age: Duration) -> Self {
        self.history_max_age = age;
        self
    }

    pub fn history_max_files(mut self, count: usize) -> Self {
        self.history_max_files = count;
        self
    }

    /// Force encryption of backups and sync payloads on or off
    pub fn encryption(mut self, enabled: bool) -> Self {
        self.encryption = Some(enabled);
        self
    }

    pub fn sync_endpoint(mut self, url: impl Into<String>) -> Self {
        self.sync_endpoint = Some(url.into());
        self
    }

    pub fn sync_token(mut self, token: impl Into<String>) -> Self {
        self.sync_token = Some(token.into());
        self
    }

    pub fn sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// Use compact JSON (no pretty printing)
    pub fn compact_json(mut self) -> Self {
        self.pretty_json = false;
        self
    }

    /// Build the `StoreConfig`
    ///
    /// If `config_dir` is not set, uses the system config directory for the app.
    pub fn build(self) -> StoreConfig {
        let config_dir = self.config_dir.unwrap_or_else(|| {
            dirs::config_dir()
                .map(|d| d.join(&self.app_name))
                .unwrap_or_else(|| PathBuf::from("config"))
        });

        let backup_dir = self
            .backup_dir
            .unwrap_or_else(|| config_dir.join("backups"));
        let history_dir = self
            .history_dir
            .unwrap_or_else(|| config_dir.join("history"));
        let key_file = self
            .key_file
            .unwrap_or_else(|| config_dir.join("security").join("encryption.key"));

        let storage = if self.pretty_json {
            JsonStorage::new()
        } else {
            JsonStorage::compact()
        };

        StoreConfig {
            app_name: self.app_name,
            config_dir,
            default_file: self.default_file,
            user_file: self.user_file,
            schema_file: self.schema_file,
            backup_dir,
            history_dir,
            key_file,
            critical_files: self.critical_files,
            backup_retention: self.backup_retention,
            backup_interval: self.backup_interval,
            history_max_age: self.history_max_age,
            history_max_files: self.history_max_files,
            encryption: self.encryption,
            sync_endpoint: self.sync_endpoint,
            sync_token: self.sync_token,
            sync_timeout: self.sync_timeout,
            storage,
        }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    if path.starts_with("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(path.strip_prefix("~").unwrap_or(path));
        }
    }
    path.to_path_buf()
}
