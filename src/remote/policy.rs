//! Sync policy settings

use crate::config::DEFAULT_SYNC_INTERVAL;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Section name that matches every section in `sync_sections`
pub const ALL_SECTIONS: &str = "all";

/// How a section changed on both sides is settled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// The side with the later modification time wins
    #[default]
    LastWriterWins,
    ServerWins,
    LocalWins,
}

/// Sync behavior set through [`SyncEngine::set_sync_policy`](super::SyncEngine::set_sync_policy)
///
/// Only `interval_secs`, `conflict_resolution` and the section lists change
/// behavior. The retry, encryption and compression fields are stored and
/// reported as-is; failed cycles are retried on the next tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncPolicy {
    pub interval_secs: u64,
    pub retry_count: u32,
    pub retry_delay_secs: u64,
    pub conflict_resolution: ConflictStrategy,
    pub sync_sections: Vec<String>,
    pub exclude_sections: Vec<String>,
    pub encryption_enabled: bool,
    pub compression_enabled: bool,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_SYNC_INTERVAL.as_secs(),
            retry_count: 3,
            retry_delay_secs: 60,
            conflict_resolution: ConflictStrategy::default(),
            sync_sections: vec![ALL_SECTIONS.to_string()],
            exclude_sections: Vec::new(),
            encryption_enabled: true,
            compression_enabled: true,
        }
    }
}

impl SyncPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    /// Whether `section` takes part in sync
    ///
    /// Exclusions win over inclusions.
    pub fn includes(&self, section: &str) -> bool {
        if self.exclude_sections.iter().any(|s| s == section) {
            return false;
        }
        self.sync_sections
            .iter()
            .any(|s| s == ALL_SECTIONS || s == section)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = SyncPolicy::default();
        assert_eq!(policy.interval(), Duration::from_secs(300));
        assert_eq!(policy.conflict_resolution, ConflictStrategy::LastWriterWins);
        assert!(policy.includes("speech"));
    }

    #[test]
    fn test_partial_policy_fills_defaults() {
        let policy: SyncPolicy = serde_json::from_str(
            r#"{"interval_secs": 60, "conflict_resolution": "server_wins"}"#,
        )
        .unwrap();
        assert_eq!(policy.interval(), Duration::from_secs(60));
        assert_eq!(policy.conflict_resolution, ConflictStrategy::ServerWins);
        assert_eq!(policy.retry_count, 3);
        assert_eq!(policy.sync_sections, vec!["all"]);
    }

    #[test]
    fn test_section_filter() {
        let policy = SyncPolicy {
            sync_sections: vec!["speech".into(), "interface".into()],
            exclude_sections: vec!["interface".into()],
            ..SyncPolicy::default()
        };
        assert!(policy.includes("speech"));
        assert!(!policy.includes("interface"));
        assert!(!policy.includes("security"));
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let policy = SyncPolicy {
            interval_secs: 0,
            ..SyncPolicy::default()
        };
        assert_eq!(policy.interval(), Duration::from_secs(1));
    }
}
