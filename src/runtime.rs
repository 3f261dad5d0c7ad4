//! The process-wide configuration context
//!
//! [`ConfigRuntime`] opens one [`ConfigStore`] and shares it with the backup
//! manager and the sync engine. It also owns their background timers.

use crate::backup::{BackupManager, RestoreResult};
use crate::config::StoreConfig;
use crate::crypto::CryptoVault;
use crate::error::{Error, Recovery, Result};
use crate::remote::{SyncEngine, SyncOutcome, SyncPolicy, SyncTransport};
use crate::scheduler::PeriodicTask;
use crate::store::ConfigStore;

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// Owner of the shared store and its background tasks
///
/// Dropping the runtime stops both timers after their current tick.
///
/// # Example
///
/// ```rust
/// use confkeep::{ConfigRuntime, StoreConfig};
/// use serde_json::json;
///
/// let temp = tempfile::tempdir().unwrap();
/// let config = StoreConfig::builder("assistant").config_dir(temp.path()).build();
/// let runtime = ConfigRuntime::with_transport(config, None)?;
///
/// runtime.store().update("interface", "theme", json!("light"))?;
/// runtime.store().save()?;
/// assert_eq!(runtime.backups().list_backups()?.len(), 1);
/// # Ok::<(), confkeep::Error>(())
/// ```
pub struct ConfigRuntime {
    store: Arc<ConfigStore>,
    vault: Arc<CryptoVault>,
    backups: Arc<BackupManager>,
    sync: Option<Arc<SyncEngine>>,
    backup_task: Mutex<Option<PeriodicTask>>,
    sync_task: Mutex<Option<PeriodicTask>>,
}

impl ConfigRuntime {
    /// Open the store and, when an endpoint is configured, an HTTP sync engine
    ///
    /// The endpoint comes from the builder or from `sync.url`; the bearer
    /// token from the builder or from `sync.token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened, the key file is
    /// unusable, or the HTTP client cannot be built.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let runtime = Self::with_transport(config, None)?;
        let Some(endpoint) = runtime.sync_endpoint() else {
            info!("No sync endpoint configured, remote sync unavailable");
            return Ok(runtime);
        };
        let transport = Self::http_transport(&runtime, &endpoint)?;
        Ok(runtime.attach_sync(transport))
    }

    /// Open the store with a caller-provided sync transport (or none)
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the key file is
    /// unusable.
    pub fn with_transport(
        config: StoreConfig,
        transport: Option<Box<dyn SyncTransport>>,
    ) -> Result<Self> {
        let store = ConfigStore::open(config)?;
        let encryption = store.encryption_enabled();
        let vault = Arc::new(CryptoVault::load_or_create(
            &store.config().key_file,
            encryption,
        )?);
        let backups = Arc::new(BackupManager::new(store.config(), vault.clone()));
        let store = Arc::new(store.with_backups(backups.clone()));

        Self::follow_encryption_setting(&store, &vault);
        info!(
            "Configuration runtime ready (encryption: {})",
            vault.is_enabled()
        );

        let runtime = Self {
            store,
            vault,
            backups,
            sync: None,
            backup_task: Mutex::new(None),
            sync_task: Mutex::new(None),
        };
        Ok(match transport {
            Some(transport) => runtime.attach_sync(transport),
            None => runtime,
        })
    }

    fn attach_sync(mut self, transport: Box<dyn SyncTransport>) -> Self {
        self.sync = Some(Arc::new(SyncEngine::new(
            self.store.clone(),
            self.vault.clone(),
            Some(self.backups.clone()),
            transport,
        )));
        self
    }

    fn sync_endpoint(&self) -> Option<String> {
        self.store.config().sync_endpoint.clone().or_else(|| {
            self.store
                .get_path("sync.url")
                .and_then(|v| v.as_str().map(str::to_string))
        })
    }

    #[cfg(feature = "http")]
    fn http_transport(runtime: &Self, endpoint: &str) -> Result<Box<dyn SyncTransport>> {
        let config = runtime.store.config();
        let token = config.sync_token.clone().or_else(|| {
            runtime
                .store
                .get_path("sync.token")
                .and_then(|v| v.as_str().map(str::to_string))
        });
        let transport = crate::remote::HttpTransport::new(endpoint, token, config.sync_timeout)?;
        info!("Remote sync endpoint: {}", transport.endpoint());
        Ok(Box::new(transport))
    }

    #[cfg(not(feature = "http"))]
    fn http_transport(_runtime: &Self, endpoint: &str) -> Result<Box<dyn SyncTransport>> {
        Err(Error::Config(format!(
            "Sync endpoint {endpoint} configured but the `http` feature is disabled"
        )))
    }

    /// Keep the vault in step with `security.data_privacy.encryption_enabled`
    fn follow_encryption_setting(store: &Arc<ConfigStore>, vault: &Arc<CryptoVault>) {
        if store.config().encryption.is_some() {
            return;
        }
        let vault = vault.clone();
        store.events().watch("security", move |_, _, new: &Value| {
            let enabled = new
                .pointer("/data_privacy/encryption_enabled")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            vault.set_enabled(enabled);
            if enabled && !vault.has_key() {
                warn!("Encryption enabled without a key; takes effect after restart");
            }
        });
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn vault(&self) -> &Arc<CryptoVault> {
        &self.vault
    }

    pub fn backups(&self) -> &Arc<BackupManager> {
        &self.backups
    }

    /// The sync engine, if a transport is available
    pub fn sync(&self) -> Option<&Arc<SyncEngine>> {
        self.sync.as_ref()
    }

    // =========================================================================
    // Timers
    // =========================================================================

    /// Start the backup timer and, with a sync engine, the sync timer
    ///
    /// Already running timers are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if a timer thread cannot be spawned.
    pub fn start(&self) -> Result<()> {
        let mut backup_task = self.backup_task.lock();
        if backup_task.is_none() {
            let backups = self.backups.clone();
            let interval = self.store.config().backup_interval;
            *backup_task = Some(PeriodicTask::spawn("backup", interval, move || {
                if let Err(e) = backups.create_backup() {
                    error!("Scheduled backup failed: {e}");
                }
            })?);
        }
        drop(backup_task);

        if self.sync_task.lock().is_none() {
            self.start_sync_timer()?;
        }
        Ok(())
    }

    fn start_sync_timer(&self) -> Result<()> {
        let Some(engine) = self.sync.clone() else {
            debug!("No sync engine, sync timer not started");
            return Ok(());
        };
        let interval = engine.policy().interval();
        let task = PeriodicTask::spawn("sync", interval, move || {
            match engine.sync_once() {
                Ok(outcome) => debug!("Scheduled sync: {outcome:?}"),
                Err(e) if e.recovery() == Recovery::SkipCycle => {
                    warn!("Sync cycle skipped: {e}");
                }
                Err(e) => error!("Scheduled sync failed: {e}"),
            }
        })?;
        *self.sync_task.lock() = Some(task);
        Ok(())
    }

    /// Stop both timers, waiting for in-flight ticks
    pub fn stop(&self) {
        // Take the tasks out first so their ticks never wait on these locks
        let backup = self.backup_task.lock().take();
        let sync = self.sync_task.lock().take();
        drop(backup);
        drop(sync);
    }

    pub fn is_running(&self) -> bool {
        self.backup_task.lock().is_some()
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Run one sync cycle now
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] without a sync engine, otherwise whatever
    /// [`SyncEngine::sync_once`] returns.
    pub fn sync_now(&self) -> Result<SyncOutcome> {
        self.sync
            .as_ref()
            .ok_or_else(|| Error::Config("Remote sync is not configured".into()))?
            .sync_once()
    }

    /// Replace the sync policy, restarting the sync timer if it runs
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] without a sync engine, or an error if the
    /// restarted timer cannot be spawned.
    pub fn set_sync_policy(&self, policy: SyncPolicy) -> Result<()> {
        let engine = self
            .sync
            .as_ref()
            .ok_or_else(|| Error::Config("Remote sync is not configured".into()))?;
        let interval_changed = engine.policy().interval() != policy.interval();
        engine.set_sync_policy(policy);

        let running = self.sync_task.lock().take();
        if let Some(task) = running {
            if interval_changed {
                drop(task);
                self.start_sync_timer()?;
            } else {
                *self.sync_task.lock() = Some(task);
            }
        }
        Ok(())
    }

    /// Restore a backup into the shared store
    ///
    /// # Errors
    ///
    /// See [`ConfigStore::restore_backup`].
    pub fn restore_backup(&self, id: &str) -> Result<RestoreResult> {
        self.store.restore_backup(id)
    }

    /// Roll the shared store back to `id` or the newest backup
    ///
    /// # Errors
    ///
    /// See [`ConfigStore::rollback`].
    pub fn rollback(&self, id: Option<&str>) -> Result<RestoreResult> {
        self.store.rollback(id)
    }
}

impl Drop for ConfigRuntime {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ConfigRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigRuntime")
            .field("config_dir", &self.store.config().config_dir)
            .field("encryption", &self.vault.is_enabled())
            .field("sync", &self.sync.is_some())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{PushRequest, SyncRequest, SyncResponse};
    use serde_json::json;
    use std::time::Duration;

    struct NoopTransport;

    impl SyncTransport for NoopTransport {
        fn exchange(&self, _: &SyncRequest) -> Result<Option<SyncResponse>> {
            Ok(None)
        }
        fn push(&self, _: &str, _: &PushRequest) -> Result<()> {
            Ok(())
        }
        fn fetch_configs(&self) -> Result<Value> {
            Ok(json!([]))
        }
    }

    fn write_default(dir: &std::path::Path, default: Value) {
        std::fs::write(dir.join("default.json"), default.to_string()).unwrap();
    }

    #[test]
    fn test_encryption_from_loaded_config() {
        let temp = tempfile::tempdir().unwrap();
        write_default(
            temp.path(),
            json!({"security": {"data_privacy": {"encryption_enabled": true}}}),
        );
        let config = StoreConfig::builder("test").config_dir(temp.path()).build();
        let key_file = config.key_file.clone();

        let runtime = ConfigRuntime::with_transport(config, None).unwrap();
        assert!(runtime.vault().is_enabled());
        assert!(key_file.exists());

        let manifest = runtime.backups().create_backup().unwrap();
        assert!(manifest.encrypted);
    }

    #[test]
    fn test_vault_follows_setting_changes() {
        let temp = tempfile::tempdir().unwrap();
        write_default(
            temp.path(),
            json!({"security": {"data_privacy": {"encryption_enabled": true}}}),
        );
        let config = StoreConfig::builder("test").config_dir(temp.path()).build();
        let runtime = ConfigRuntime::with_transport(config, None).unwrap();

        runtime
            .store()
            .update("security", "data_privacy.encryption_enabled", json!(false))
            .unwrap();
        assert!(!runtime.vault().is_enabled());
        assert!(!runtime.backups().create_backup().unwrap().encrypted);
    }

    #[test]
    fn test_builder_override_wins() {
        let temp = tempfile::tempdir().unwrap();
        write_default(
            temp.path(),
            json!({"security": {"data_privacy": {"encryption_enabled": true}}}),
        );
        let config = StoreConfig::builder("test")
            .config_dir(temp.path())
            .encryption(false)
            .build();
        let runtime = ConfigRuntime::with_transport(config, None).unwrap();
        assert!(!runtime.vault().is_enabled());
    }

    #[test]
    fn test_sync_requires_engine() {
        let temp = tempfile::tempdir().unwrap();
        let config = StoreConfig::builder("test").config_dir(temp.path()).build();
        let runtime = ConfigRuntime::with_transport(config, None).unwrap();
        assert!(runtime.sync().is_none());
        assert!(runtime.sync_now().is_err());
        assert!(runtime.set_sync_policy(SyncPolicy::default()).is_err());
    }

    #[test]
    fn test_open_without_endpoint_has_no_sync() {
        let temp = tempfile::tempdir().unwrap();
        let config = StoreConfig::builder("test").config_dir(temp.path()).build();
        let runtime = ConfigRuntime::open(config).unwrap();
        assert!(runtime.sync().is_none());
    }

    #[test]
    fn test_start_and_stop_timers() {
        let temp = tempfile::tempdir().unwrap();
        write_default(temp.path(), json!({"sync": {"enabled": true}}));
        let config = StoreConfig::builder("test")
            .config_dir(temp.path())
            .backup_interval(Duration::from_millis(20))
            .build();
        let runtime = ConfigRuntime::with_transport(config, Some(Box::new(NoopTransport))).unwrap();

        runtime.start().unwrap();
        assert!(runtime.is_running());

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while runtime.backups().list_backups().unwrap().is_empty()
            && std::time::Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(10));
        }
        runtime.stop();
        assert!(!runtime.is_running());
        assert!(!runtime.backups().list_backups().unwrap().is_empty());

        assert_eq!(runtime.sync_now().unwrap(), SyncOutcome::UpToDate);
    }

    #[test]
    fn test_restore_goes_through_shared_store() {
        let temp = tempfile::tempdir().unwrap();
        let config = StoreConfig::builder("test").config_dir(temp.path()).build();
        let runtime = ConfigRuntime::with_transport(config, None).unwrap();
        let store = runtime.store().clone();

        let manifest = runtime.backups().create_backup().unwrap();
        store.update("interface", "theme", json!("light")).unwrap();
        assert_eq!(store.get_path("interface.theme"), Some(json!("light")));

        let result = runtime.restore_backup(&manifest.id).unwrap();
        assert!(result.has_changes());
        assert_eq!(store.get_path("interface.theme"), Some(json!("dark")));
    }
}
