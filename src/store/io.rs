use super::merge::{changed_sections, deep_merge, overlay_diff};
use super::templates::first_run_overlay;
use super::{Baseline, ConfigStore, ModifiedTimes};
use crate::backup::{BackupManager, RestoreResult};
use crate::config::{SchemaValidator, StoreConfig};
use crate::error::{Error, Result};
use crate::history::structural_diff;
use crate::storage::{LoadOutcome, StorageBackend};

use log::{debug, error, info, warn};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;

/// How one layer fared when loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerStatus {
    Loaded,
    Absent,
    /// Present but unusable; the message says why
    Failed(String),
    /// Absent and replaced by the first-run template
    Created,
}

/// Per-layer status of the most recent load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub schema: LayerStatus,
    pub default: LayerStatus,
    pub user: LayerStatus,
}

pub(crate) struct LoadedLayers {
    pub(crate) default: Value,
    pub(crate) user: Value,
    pub(crate) validator: SchemaValidator,
    pub(crate) modified: ModifiedTimes,
    pub(crate) report: LoadReport,
}

/// Read a layer that must be a mapping; anything else counts as failed
fn read_layer(config: &StoreConfig, path: &Path, label: &str) -> (Option<Value>, LayerStatus) {
    match config.storage.load::<Value>(path) {
        LoadOutcome::Loaded(value) if value.is_object() => {
            debug!("Loaded {label} layer from {}", path.display());
            (Some(value), LayerStatus::Loaded)
        }
        LoadOutcome::Loaded(_) => {
            warn!("{label} layer at {} is not a mapping, ignoring it", path.display());
            (None, LayerStatus::Failed("root is not a mapping".into()))
        }
        LoadOutcome::Absent => (None, LayerStatus::Absent),
        LoadOutcome::Failed(e) => {
            warn!("Failed to load {label} layer: {e}");
            (None, LayerStatus::Failed(e.to_string()))
        }
    }
}

pub(crate) fn load_layers(config: &StoreConfig) -> Result<LoadedLayers> {
    let (schema, schema_status) = read_layer(config, &config.schema_path(), "schema");
    if schema_status == LayerStatus::Absent {
        warn!("Schema file not found: {}", config.schema_path().display());
    }

    let (default, default_status) = read_layer(config, &config.default_path(), "default");
    if default_status == LayerStatus::Absent {
        warn!("Default configuration not found: {}", config.default_path().display());
    }

    let (user, user_status) = match read_layer(config, &config.user_path(), "user") {
        (Some(user), status) => (user, status),
        (None, LayerStatus::Absent) => {
            let template = first_run_overlay();
            config.storage.write(&config.user_path(), &template)?;
            info!("Created user configuration template at {}", config.user_path().display());
            (template, LayerStatus::Created)
        }
        // The broken file stays on disk untouched for inspection
        (None, status) => (json!({}), status),
    };

    let modified = match config.storage.load::<ModifiedTimes>(&config.modified_path()) {
        LoadOutcome::Loaded(times) => times,
        LoadOutcome::Absent => ModifiedTimes::new(),
        LoadOutcome::Failed(e) => {
            warn!("Ignoring unreadable modification times: {e}");
            ModifiedTimes::new()
        }
    };

    Ok(LoadedLayers {
        default: default.unwrap_or_else(|| json!({})),
        user,
        validator: SchemaValidator::new(schema),
        modified,
        report: LoadReport {
            schema: schema_status,
            default: default_status,
            user: user_status,
        },
    })
}

impl ConfigStore {
    /// Write the user overlay (live minus defaults)
    pub(crate) fn persist_overlay(&self, default: &Value, live: &Value) -> Result<()> {
        let overlay = overlay_diff(default, live);
        self.config.storage.write(&self.config.user_path(), &overlay)?;
        debug!("User overlay written to {}", self.config.user_path().display());
        Ok(())
    }

    pub(crate) fn persist_modified(&self, times: &ModifiedTimes) -> Result<()> {
        self.config.storage.write(&self.config.modified_path(), times)
    }

    /// Validate the live configuration, back it up, then write the overlay
    ///
    /// Runs entirely under the mutation lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the live configuration no longer
    /// passes validation (e.g. after the schema changed), or an I/O error if
    /// the backup or the write fails. Nothing is written in either case.
    pub fn save(&self) -> Result<()> {
        let _guard = self.mutation.lock();

        let live = self.live.load_full();
        let baseline = self.baseline.read();
        let violations = self.check(&baseline, &live, None);
        if !violations.is_empty() {
            warn!("Refusing to save invalid configuration");
            return Err(Error::Validation(violations));
        }

        match &self.backups {
            Some(backups) => {
                backups.create_backup()?;
            }
            None => debug!("No backup manager attached, saving without snapshot"),
        }

        self.persist_overlay(&baseline.default, &live)?;
        self.persist_modified(&self.modified.read())?;
        info!("Configuration saved");
        Ok(())
    }

    /// Re-read all layers from disk and publish the result
    ///
    /// Listeners are notified for every section that changed.
    ///
    /// # Errors
    ///
    /// Returns an error only if a missing user file cannot be recreated.
    pub fn reload(&self) -> Result<()> {
        let (old, new, sections) = {
            let _guard = self.mutation.lock();
            self.reload_locked()?
        };

        for section in &sections {
            self.events.notify(
                section,
                old.get(section).unwrap_or(&Value::Null),
                new.get(section).unwrap_or(&Value::Null),
            );
        }
        Ok(())
    }

    /// Restore backup `id` and reload, holding the mutation lock throughout
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no backup manager is attached, or any
    /// error from [`BackupManager::restore`]; live state is untouched then.
    pub fn restore_backup(&self, id: &str) -> Result<RestoreResult> {
        self.restore_with(|backups| backups.restore(id))
    }

    /// Take a safety backup, restore `id` (or the newest backup) and reload
    ///
    /// # Errors
    ///
    /// Same as [`restore_backup`](Self::restore_backup).
    pub fn rollback(&self, id: Option<&str>) -> Result<RestoreResult> {
        self.restore_with(|backups| backups.rollback(id))
    }

    fn restore_with<F>(&self, restore: F) -> Result<RestoreResult>
    where
        F: FnOnce(&BackupManager) -> Result<RestoreResult>,
    {
        let backups = self
            .backups
            .as_ref()
            .ok_or_else(|| Error::Config("No backup manager attached".into()))?;

        let (result, (old, new, sections)) = {
            let _guard = self.mutation.lock();
            let result = restore(backups)?;
            let reloaded = self.reload_locked()?;
            if let Err(e) = self.history.append(structural_diff(&reloaded.0, &reloaded.1, "")) {
                error!("Failed to record restored configuration: {e}");
            }
            (result, reloaded)
        };

        for section in &sections {
            self.events.notify(
                section,
                old.get(section).unwrap_or(&Value::Null),
                new.get(section).unwrap_or(&Value::Null),
            );
        }
        Ok(result)
    }

    /// Caller must hold the mutation lock
    fn reload_locked(&self) -> Result<(Arc<Value>, Arc<Value>, Vec<String>)> {
        let loaded = load_layers(&self.config)?;
        let new = Arc::new(deep_merge(&loaded.default, &loaded.user));
        let old = self.live.swap(new.clone());

        *self.baseline.write() = Baseline {
            default: loaded.default,
            validator: loaded.validator,
        };
        *self.modified.write() = loaded.modified;
        *self.load_report.write() = loaded.report;

        let sections = changed_sections(&old, &new);
        info!(
            "Configuration reloaded ({} section(s) changed)",
            sections.len()
        );
        Ok((old, new, sections))
    }
}
