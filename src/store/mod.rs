//! Layered configuration store
//!
//! This module contains [`ConfigStore`], the owner of the live configuration.
//! The live value is always `default` deep-merged with the user overlay; only
//! the overlay is written back to disk.

use crate::backup::BackupManager;
use crate::config::{SchemaValidator, StoreConfig, Violation};
use crate::error::{Result, create_dir};
use crate::events::EventManager;
use crate::history::{ChangeHistory, ConflictLog};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use log::info;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

mod io;
mod merge;
mod models;
mod operations;
mod templates;

pub use io::{LayerStatus, LoadReport};
pub use merge::{changed_sections, deep_merge, deep_set, overlay_diff, rebase_on_default};
pub use models::AI_SECTION;
pub use templates::{ConfigTemplate, first_run_overlay};

/// Per-section modification times, persisted in `.modified.json`
pub type ModifiedTimes = BTreeMap<String, DateTime<Utc>>;

/// Result of a validated mutation
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The candidate passed validation and is now live
    Applied,
    /// The candidate equals the live configuration; nothing was written
    Unchanged,
    /// The candidate failed validation; live state is untouched
    Rejected(Vec<Violation>),
}

impl UpdateOutcome {
    /// `true` unless the mutation was rejected
    pub fn is_applied(&self) -> bool {
        !matches!(self, UpdateOutcome::Rejected(_))
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            UpdateOutcome::Rejected(v) => v,
            UpdateOutcome::Applied | UpdateOutcome::Unchanged => &[],
        }
    }
}

/// Default layer and the validator built from the schema layer
pub(crate) struct Baseline {
    pub(crate) default: Value,
    pub(crate) validator: SchemaValidator,
}

/// Owner of the live configuration
///
/// Reads are lock-free snapshots; every mutation builds a full candidate,
/// validates it and publishes it in one swap while holding the mutation lock.
///
/// # Example
///
/// ```rust
/// use confkeep::{ConfigStore, StoreConfig};
/// use serde_json::json;
///
/// let temp = tempfile::tempdir().unwrap();
/// let config = StoreConfig::builder("assistant").config_dir(temp.path()).build();
/// let store = ConfigStore::open(config)?;
///
/// // First start writes the user template
/// assert_eq!(store.get_path("interface.theme"), Some(json!("dark")));
///
/// let outcome = store.update("speech", "synthesis.rate", json!(180))?;
/// assert!(outcome.is_applied());
///
/// let outcome = store.update("speech", "synthesis.rate", json!(301))?;
/// assert!(!outcome.is_applied());
/// assert_eq!(store.get_path("speech.synthesis.rate"), Some(json!(180)));
/// # Ok::<(), confkeep::Error>(())
/// ```
pub struct ConfigStore {
    pub(crate) config: StoreConfig,

    /// Last committed configuration
    pub(crate) live: ArcSwap<Value>,

    pub(crate) baseline: RwLock<Baseline>,

    pub(crate) modified: RwLock<ModifiedTimes>,

    /// Serializes every mutation of live state and of the history logs
    pub(crate) mutation: Mutex<()>,

    pub(crate) history: ChangeHistory,

    pub(crate) conflicts: ConflictLog,

    pub(crate) events: Arc<EventManager>,

    /// Snapshot taken by `save()`
    pub(crate) backups: Option<Arc<BackupManager>>,

    pub(crate) load_report: RwLock<LoadReport>,
}

impl ConfigStore {
    /// Open the store, loading schema, default and user layers
    ///
    /// A missing user file is replaced by the first-run template. Missing or
    /// malformed schema/default layers fall back to empty baselines and are
    /// reported in [`load_report`](Self::load_report).
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be created or the
    /// first-run template cannot be written.
    pub fn open(config: StoreConfig) -> Result<Self> {
        if !config.config_dir.exists() {
            create_dir(&config.config_dir)?;
            crate::security::set_secure_dir_permissions(&config.config_dir)?;
        }

        let loaded = io::load_layers(&config)?;
        let live = deep_merge(&loaded.default, &loaded.user);

        let history = ChangeHistory::new(
            &config.history_dir,
            config.history_max_age,
            config.history_max_files,
        );
        let conflicts = ConflictLog::in_dir(&config.history_dir);

        info!(
            "Opened configuration store at: {}",
            config.config_dir.display()
        );

        Ok(Self {
            live: ArcSwap::from_pointee(live),
            baseline: RwLock::new(Baseline {
                default: loaded.default,
                validator: loaded.validator,
            }),
            modified: RwLock::new(loaded.modified),
            mutation: Mutex::new(()),
            history,
            conflicts,
            events: Arc::new(EventManager::new()),
            backups: None,
            load_report: RwLock::new(loaded.report),
            config,
        })
    }

    /// Attach the backup manager used by [`save`](Self::save)
    #[must_use]
    pub fn with_backups(mut self, backups: Arc<BackupManager>) -> Self {
        self.backups = Some(backups);
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Event manager for change listeners and per-section validators
    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }

    pub fn history(&self) -> &ChangeHistory {
        &self.history
    }

    pub fn conflicts(&self) -> &ConflictLog {
        &self.conflicts
    }

    pub fn backups(&self) -> Option<&Arc<BackupManager>> {
        self.backups.as_ref()
    }

    /// How each layer fared on the most recent load
    pub fn load_report(&self) -> LoadReport {
        self.load_report.read().clone()
    }

    /// Copy of the default layer
    pub fn defaults(&self) -> Value {
        self.baseline.read().default.clone()
    }

    /// Validate a candidate against the current schema, domain rules and
    /// section validators, without touching live state
    pub fn validate(&self, candidate: &Value) -> std::result::Result<(), Vec<Violation>> {
        let baseline = self.baseline.read();
        let violations = self.check(&baseline, candidate, None);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("config_dir", &self.config.config_dir)
            .field("has_backups", &self.backups.is_some())
            .finish_non_exhaustive()
    }
}
