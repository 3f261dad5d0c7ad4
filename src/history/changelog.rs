//! Append-only change history on disk
//!
//! Every committed mutation becomes one `changes_<timestamp>_<seq>.json`
//! file. Records are never rewritten; [`ChangeHistory::compact`] is the only
//! thing that deletes them.

use super::diff::Change;
use crate::error::{Error, Result, create_dir, read_dir};
use crate::storage::{JsonStorage, LoadOutcome, StorageBackend};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const FILE_PREFIX: &str = "changes_";

/// One committed mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub timestamp: DateTime<Utc>,
    pub changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new(changes: Vec<Change>) -> Self {
        Self {
            timestamp: Utc::now(),
            changes,
        }
    }
}

/// Change-set directory with age and count caps
#[derive(Debug)]
pub struct ChangeHistory {
    dir: PathBuf,
    storage: JsonStorage,
    max_age: Duration,
    max_files: usize,
    seq: AtomicU64,
}

impl ChangeHistory {
    pub fn new(dir: impl Into<PathBuf>, max_age: Duration, max_files: usize) -> Self {
        Self {
            dir: dir.into(),
            storage: JsonStorage::new(),
            max_age,
            max_files,
            seq: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist a change-set and compact afterwards
    ///
    /// An empty change list writes nothing and returns `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written. Compaction failures
    /// are logged only.
    pub fn append(&self, changes: Vec<Change>) -> Result<Option<PathBuf>> {
        if changes.is_empty() {
            return Ok(None);
        }
        let set = ChangeSet::new(changes);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!(
            "{FILE_PREFIX}{}_{seq:06}.json",
            set.timestamp.format("%Y%m%d_%H%M%S_%6f")
        ));

        create_dir(&self.dir)?;
        self.storage.write(&path, &set)?;
        debug!(
            "Recorded {} change(s) in {}",
            set.changes.len(),
            path.display()
        );

        if let Err(e) = self.compact() {
            warn!("History compaction failed: {e}");
        }
        Ok(Some(path))
    }

    /// All readable change-sets, oldest first
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be listed.
    pub fn entries(&self) -> Result<Vec<ChangeSet>> {
        Ok(self
            .record_files()?
            .into_iter()
            .filter_map(|path| match self.storage.load::<ChangeSet>(&path) {
                LoadOutcome::Loaded(set) => Some(set),
                LoadOutcome::Absent => None,
                LoadOutcome::Failed(e) => {
                    warn!("Skipping unreadable history record: {e}");
                    None
                }
            })
            .collect())
    }

    /// Change-sets touching `prefix` (a section or dotted path), newest first
    ///
    /// Only changes at or below the prefix are kept in each returned set.
    ///
    /// # Errors
    ///
    /// Returns an error if the history directory cannot be listed.
    pub fn view_history(&self, prefix: Option<&str>, limit: usize) -> Result<Vec<ChangeSet>> {
        let mut entries = self.entries()?;
        entries.reverse();

        Ok(entries
            .into_iter()
            .filter_map(|mut set| {
                if let Some(prefix) = prefix {
                    set.changes.retain(|c| c.matches_prefix(prefix));
                }
                (!set.changes.is_empty()).then_some(set)
            })
            .take(limit)
            .collect())
    }

    /// Delete records older than the age cap or beyond the count cap
    ///
    /// Returns the number of deleted records.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed or a file cannot be
    /// removed.
    pub fn compact(&self) -> Result<usize> {
        let files = self.record_files()?;
        let cutoff = chrono::Duration::from_std(self.max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));

        let excess = files.len().saturating_sub(self.max_files);
        let mut removed = 0;
        for (index, path) in files.iter().enumerate() {
            let expired = cutoff.is_some_and(|cutoff| {
                record_time(path).is_some_and(|written| written < cutoff)
            });
            if index < excess || expired {
                std::fs::remove_file(path).map_err(|e| Error::FileDelete {
                    path: path.clone(),
                    source: e,
                })?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Compacted change history: removed {removed} record(s)");
        }
        Ok(removed)
    }

    /// Record files sorted oldest first
    fn record_files(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(FILE_PREFIX) && n.ends_with(".json"))
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

/// Timestamp encoded in a record file name
fn record_time(path: &Path) -> Option<DateTime<Utc>> {
    let stem = path.file_stem()?.to_str()?.strip_prefix(FILE_PREFIX)?;
    let (stamp, _seq) = stem.rsplit_once('_')?;
    chrono::NaiveDateTime::parse_from_str(stamp, "%Y%m%d_%H%M%S_%6f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn history(dir: &Path, max_files: usize) -> ChangeHistory {
        ChangeHistory::new(dir, Duration::from_secs(30 * 24 * 3600), max_files)
    }

    #[test]
    fn test_append_and_view() {
        let dir = tempdir().unwrap();
        let history = history(dir.path(), 100);

        history
            .append(vec![Change::modified("speech.rate", json!(150), json!(180))])
            .unwrap();
        history
            .append(vec![
                Change::added("interface.theme", json!("light")),
                Change::added("speechless", json!(true)),
            ])
            .unwrap();

        let all = history.view_history(None, 10).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].changes.len(), 2);

        let speech = history.view_history(Some("speech"), 10).unwrap();
        assert_eq!(speech.len(), 1);
        assert_eq!(speech[0].changes[0].path, "speech.rate");

        assert_eq!(history.view_history(None, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_change_list_is_not_recorded() {
        let dir = tempdir().unwrap();
        let history = history(dir.path(), 100);
        assert!(history.append(Vec::new()).unwrap().is_none());
        assert!(history.entries().unwrap().is_empty());
    }

    #[test]
    fn test_count_cap() {
        let dir = tempdir().unwrap();
        let history = history(dir.path(), 3);

        for i in 0..5 {
            history
                .append(vec![Change::added(format!("k{i}"), json!(i))])
                .unwrap();
        }

        let entries = history.entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].changes[0].path, "k2");
        assert_eq!(entries[2].changes[0].path, "k4");
    }

    #[test]
    fn test_age_cap() {
        let dir = tempdir().unwrap();
        let history = history(dir.path(), 100);

        let stale = dir.path().join("changes_20000101_000000_000000_000000.json");
        std::fs::write(
            &stale,
            r#"{"timestamp":"2000-01-01T00:00:00Z","changes":[{"path":"a","type":"added","new_value":1}]}"#,
        )
        .unwrap();

        history.append(vec![Change::added("b", json!(2))]).unwrap();

        assert!(!stale.exists());
        assert_eq!(history.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_unreadable_record_is_skipped() {
        let dir = tempdir().unwrap();
        let history = history(dir.path(), 100);
        history.append(vec![Change::added("a", json!(1))]).unwrap();
        std::fs::write(dir.path().join("changes_29990101_000000_000000_000000.json"), "{").unwrap();

        assert_eq!(history.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_record_time_parsing() {
        let path = Path::new("/h/changes_20240102_030405_123456_000007.json");
        let time = record_time(path).unwrap();
        assert_eq!(time.to_rfc3339(), "2024-01-02T03:04:05.123456+00:00");
    }
}
