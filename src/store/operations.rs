use super::merge::{changed_sections, deep_merge, deep_set, overlay_diff, rebase_on_default};
use super::templates::ConfigTemplate;
use super::{Baseline, ConfigStore, ModifiedTimes, UpdateOutcome};
use crate::config::{Violation, lookup};
use crate::error::Result;
use crate::history::{Comparison, ConflictRecord, compare, structural_diff};
use crate::storage::StorageBackend;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde_json::{Map, Value, json};
use std::path::Path;
use std::sync::Arc;

/// A mutation that was published, waiting for listener notification
pub(crate) struct Committed {
    old: Arc<Value>,
    new: Arc<Value>,
    sections: Vec<String>,
}

impl ConfigStore {
    // =========================================================================
    // Reads
    // =========================================================================

    /// Most recently committed configuration
    pub fn snapshot(&self) -> Arc<Value> {
        self.live.load_full()
    }

    /// A section's value, or an empty mapping if it is absent
    pub fn get(&self, section: &str) -> Value {
        self.get_or(section, json!({}))
    }

    /// A section's value, or `default` if it is absent
    pub fn get_or(&self, section: &str, default: Value) -> Value {
        self.live.load().get(section).cloned().unwrap_or(default)
    }

    /// A nested value by dotted path, e.g. `speech.synthesis.rate`
    pub fn get_path(&self, dotted: &str) -> Option<Value> {
        lookup(&self.live.load(), dotted).cloned()
    }

    /// Current user overlay (live configuration minus defaults)
    pub fn user_overlay(&self) -> Value {
        overlay_diff(&self.baseline.read().default, &self.live.load())
    }

    /// Last local modification time of a section
    pub fn section_modified_at(&self, section: &str) -> Option<DateTime<Utc>> {
        self.modified.read().get(section).copied()
    }

    pub fn modified_times(&self) -> super::ModifiedTimes {
        self.modified.read().clone()
    }

    /// Whether backups and sync payloads should be encrypted
    ///
    /// A builder override wins over
    /// `security.data_privacy.encryption_enabled`.
    pub fn encryption_enabled(&self) -> bool {
        self.config.encryption.unwrap_or_else(|| {
            self.get_path("security.data_privacy.encryption_enabled")
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
        })
    }

    /// Whether remote sync is switched on (`sync_enabled` or `sync.enabled`)
    pub fn sync_enabled(&self) -> bool {
        let live = self.live.load();
        live.get("sync_enabled")
            .or_else(|| lookup(&live, "sync.enabled"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Set `value` at `dotted` inside `section`
    ///
    /// An empty `dotted` replaces the whole section; keys the defaults define
    /// and `value` leaves out keep their default. The full candidate
    /// configuration is validated first; on rejection nothing changes.
    ///
    /// # Errors
    ///
    /// Returns an error only if the validated candidate cannot be persisted;
    /// validation failures are reported as [`UpdateOutcome::Rejected`].
    pub fn update(&self, section: &str, dotted: &str, value: Value) -> Result<UpdateOutcome> {
        let full_key = if dotted.is_empty() {
            section.to_string()
        } else {
            format!("{section}.{dotted}")
        };

        self.mutate(Some(section), |live, _| {
            let mut candidate = live.clone();
            deep_set(&mut candidate, section, dotted, value);
            candidate
        })
        .inspect(|outcome| match outcome {
            UpdateOutcome::Applied => info!("Configuration {full_key} updated"),
            UpdateOutcome::Unchanged => debug!("Configuration {full_key} unchanged"),
            UpdateOutcome::Rejected(v) => {
                warn!("Rejected update of {full_key}: {} violation(s)", v.len());
            }
        })
    }

    /// Merge a built-in template onto the live configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the validated result cannot be persisted.
    pub fn apply_template(&self, template: ConfigTemplate) -> Result<UpdateOutcome> {
        let outcome = self.mutate(None, |live, _| deep_merge(live, &template.value()))?;
        if outcome.is_applied() {
            info!("Applied '{}' template", template.name());
        }
        Ok(outcome)
    }

    /// Replace the whole user layer with `overlay`
    ///
    /// Used when applying a remote configuration: the candidate is the
    /// default layer merged with `overlay`, validated like any update.
    ///
    /// # Errors
    ///
    /// Returns an error if the validated result cannot be persisted.
    pub fn apply_user_overlay(&self, overlay: &Value) -> Result<UpdateOutcome> {
        if !overlay.is_object() {
            return Ok(UpdateOutcome::Rejected(vec![Violation::new(
                "",
                "User overlay must be a mapping",
            )]));
        }
        let outcome = self.mutate(None, |_, default| deep_merge(default, overlay))?;
        if outcome.is_applied() {
            info!("User overlay replaced");
        }
        Ok(outcome)
    }

    /// Resolve a remote configuration against the live one and commit it
    ///
    /// `resolve` runs under the mutation lock with the live configuration
    /// and section modification times as of the commit, so updates made
    /// while the caller was preparing are resolved rather than overwritten.
    /// Its result is taken as the new user layer, as in
    /// [`apply_user_overlay`](Self::apply_user_overlay).
    ///
    /// # Errors
    ///
    /// Returns an error if the validated result cannot be persisted.
    pub fn apply_remote<F>(&self, resolve: F) -> Result<UpdateOutcome>
    where
        F: FnOnce(&Value, &ModifiedTimes) -> Value,
    {
        let outcome = self.mutate(None, |live, default| {
            let times = self.modified.read().clone();
            deep_merge(default, &resolve(live, &times))
        })?;
        if outcome.is_applied() {
            info!("Remote configuration merged");
        }
        Ok(outcome)
    }

    /// Restore a section (or everything) to its default value
    ///
    /// # Errors
    ///
    /// Returns an error if the result cannot be persisted.
    pub fn reset(&self, section: Option<&str>) -> Result<()> {
        let committed = {
            let _guard = self.mutation.lock();
            let old = self.live.load_full();
            let baseline = self.baseline.read();

            let candidate = match section {
                Some(name) => {
                    let mut candidate = (*old).clone();
                    if let Some(map) = candidate.as_object_mut() {
                        match baseline.default.get(name) {
                            Some(value) => {
                                map.insert(name.to_string(), value.clone());
                            }
                            None => {
                                map.shift_remove(name);
                            }
                        }
                    }
                    candidate
                }
                None => baseline.default.clone(),
            };
            self.commit(&baseline, old, candidate)?
        };

        match section {
            Some(name) => info!("Section {name} reset to defaults"),
            None => info!("All configuration reset to defaults"),
        }
        self.notify(committed);
        Ok(())
    }

    /// Append resolved sync conflicts to the conflict log
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or written.
    pub fn record_conflicts(&self, records: &[ConflictRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let _guard = self.mutation.lock();
        self.conflicts.append(records)
    }

    /// Compare two configuration files on disk
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be read or parsed.
    pub fn compare_files(&self, a: &Path, b: &Path) -> Result<Comparison> {
        let left: Value = self.config.storage.read(a)?;
        let right: Value = self.config.storage.read(b)?;
        Ok(compare(&left, &right))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Build a candidate under the mutation lock, validate, then commit
    fn mutate<F>(&self, section: Option<&str>, build: F) -> Result<UpdateOutcome>
    where
        F: FnOnce(&Value, &Value) -> Value,
    {
        self.try_mutate(section, |live, default| Ok(build(live, default)))
    }

    /// Like [`mutate`](Self::mutate), but `build` may refuse up front
    pub(crate) fn try_mutate<F>(&self, section: Option<&str>, build: F) -> Result<UpdateOutcome>
    where
        F: FnOnce(&Value, &Value) -> std::result::Result<Value, Vec<Violation>>,
    {
        let committed = {
            let _guard = self.mutation.lock();
            let old = self.live.load_full();
            let baseline = self.baseline.read();

            let built = match build(&old, &baseline.default) {
                Ok(built) => built,
                Err(violations) => return Ok(UpdateOutcome::Rejected(violations)),
            };
            // Live is always the defaults plus an overlay; reload must reproduce it
            let candidate = rebase_on_default(&baseline.default, &built);
            if candidate == *old {
                return Ok(UpdateOutcome::Unchanged);
            }

            let violations = self.check(&baseline, &candidate, section);
            if !violations.is_empty() {
                return Ok(UpdateOutcome::Rejected(violations));
            }
            self.commit(&baseline, old, candidate)?
        };

        self.notify(committed);
        Ok(UpdateOutcome::Applied)
    }

    /// Schema, domain rules and registered section validators
    ///
    /// `section` limits the section validators to one section; `None` runs
    /// every section that has a value.
    pub(crate) fn check(
        &self,
        baseline: &Baseline,
        candidate: &Value,
        section: Option<&str>,
    ) -> Vec<Violation> {
        let mut violations = baseline.validator.validate(candidate).err().unwrap_or_default();

        let empty = Map::new();
        let sections: Vec<&String> = match section {
            Some(name) => candidate
                .as_object()
                .unwrap_or(&empty)
                .keys()
                .filter(|k| k.as_str() == name)
                .collect(),
            None => candidate.as_object().unwrap_or(&empty).keys().collect(),
        };
        for name in sections {
            let value = candidate.get(name.as_str()).unwrap_or(&Value::Null);
            violations.extend(
                self.events
                    .validate(name, value)
                    .into_iter()
                    .map(|message| Violation::new(name.as_str(), message)),
            );
        }
        violations
    }

    /// Persist and publish a validated candidate
    ///
    /// Caller must hold the mutation lock. On a write failure the live
    /// configuration stays as it was.
    pub(crate) fn commit(
        &self,
        baseline: &Baseline,
        old: Arc<Value>,
        candidate: Value,
    ) -> Result<Committed> {
        let sections = changed_sections(&old, &candidate);
        let new = Arc::new(candidate);
        if sections.is_empty() {
            return Ok(Committed { old, new, sections });
        }

        self.persist_overlay(&baseline.default, &new)?;

        let now = Utc::now();
        {
            let mut modified = self.modified.write();
            for section in &sections {
                modified.insert(section.clone(), now);
            }
            if let Err(e) = self.persist_modified(&modified) {
                warn!("Failed to persist modification times: {e}");
            }
        }

        self.live.store(new.clone());

        if let Err(e) = self.history.append(structural_diff(&old, &new, "")) {
            error!("Failed to record configuration change: {e}");
        }

        Ok(Committed { old, new, sections })
    }

    /// Run change listeners; must be called without the mutation lock held
    pub(crate) fn notify(&self, committed: Committed) {
        for section in &committed.sections {
            self.events.notify(
                section,
                committed.old.get(section).unwrap_or(&Value::Null),
                committed.new.get(section).unwrap_or(&Value::Null),
            );
        }
    }
}
