//! Last-writer-wins conflict resolution per section

use super::policy::{ConflictStrategy, SyncPolicy};
use crate::error::{Error, Result};
use crate::history::{ConflictRecord, Resolution};
use crate::store::ModifiedTimes;

use chrono::{DateTime, NaiveDateTime, Utc};
use log::{info, warn};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Key carrying server-side metadata; never merged into configuration
pub const METADATA_KEY: &str = "_metadata";

/// Configuration after resolution, plus the conflicts that were settled
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub config: Value,
    pub conflicts: Vec<ConflictRecord>,
}

/// Modification times announced by the server in `_metadata.modified`
///
/// Either one timestamp for the whole payload or a per-section map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerTimes {
    whole: Option<DateTime<Utc>>,
    sections: BTreeMap<String, DateTime<Utc>>,
}

impl ServerTimes {
    pub fn from_config(server: &Value) -> Self {
        let Some(modified) = server.get(METADATA_KEY).and_then(|m| m.get("modified")) else {
            return Self::default();
        };

        match modified {
            Value::Object(map) => Self {
                whole: None,
                sections: map
                    .iter()
                    .filter_map(|(section, ts)| parse_timestamp(ts).map(|t| (section.clone(), t)))
                    .collect(),
            },
            other => Self {
                whole: parse_timestamp(other),
                sections: BTreeMap::new(),
            },
        }
    }

    pub fn for_section(&self, section: &str) -> Option<DateTime<Utc>> {
        self.sections.get(section).copied().or(self.whole)
    }
}

/// RFC 3339, or a naive ISO timestamp taken as UTC
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?;
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|t| t.and_utc())
        })
}

/// Keep the server's view only for sections the policy syncs
///
/// Sections outside the policy keep their local value (or stay absent).
pub fn restrict_to_policy(local: &Value, server: &Value, policy: &SyncPolicy) -> Value {
    let mut restricted = Map::new();
    if let Some(server) = server.as_object() {
        for (section, value) in server {
            if section == METADATA_KEY || policy.includes(section) {
                restricted.insert(section.clone(), value.clone());
            }
        }
    }
    if let Some(local) = local.as_object() {
        for (section, value) in local {
            if !policy.includes(section) {
                restricted.insert(section.clone(), value.clone());
            }
        }
    }
    Value::Object(restricted)
}

/// Merge `local` and `server` section by section
///
/// Sections present on one side only are kept. Sections that differ are
/// settled by `strategy`; every such decision becomes a [`ConflictRecord`].
pub fn resolve_conflicts(
    local: &Value,
    server: &Value,
    local_times: &ModifiedTimes,
    strategy: ConflictStrategy,
) -> Resolved {
    let empty = Map::new();
    let local_map = local.as_object().unwrap_or(&empty);
    let server_map = server.as_object().unwrap_or(&empty);
    let server_times = ServerTimes::from_config(server);

    let mut config = Map::new();
    let mut conflicts = Vec::new();

    for (section, local_value) in local_map {
        if section == METADATA_KEY {
            continue;
        }
        let Some(server_value) = server_map.get(section) else {
            config.insert(section.clone(), local_value.clone());
            continue;
        };
        if local_value == server_value {
            config.insert(section.clone(), local_value.clone());
            continue;
        }

        let local_modified = local_times.get(section).copied();
        let server_modified = server_times.for_section(section);
        let resolution = decide(section, local_modified, server_modified, strategy)
            .unwrap_or_else(|e| {
                warn!("{e}; keeping the server value");
                Resolution::Server
            });
        info!(
            "Sync conflict in '{section}' resolved in favor of the {} value",
            match resolution {
                Resolution::Local => "local",
                Resolution::Server => "server",
            }
        );

        let record = ConflictRecord {
            section: section.clone(),
            local_value: local_value.clone(),
            server_value: server_value.clone(),
            resolution,
            local_modified,
            server_modified,
            resolved_at: Utc::now(),
        };
        config.insert(section.clone(), record.chosen().clone());
        conflicts.push(record);
    }

    for (section, server_value) in server_map {
        if section != METADATA_KEY && !local_map.contains_key(section) {
            config.insert(section.clone(), server_value.clone());
        }
    }

    Resolved {
        config: Value::Object(config),
        conflicts,
    }
}

fn decide(
    section: &str,
    local: Option<DateTime<Utc>>,
    server: Option<DateTime<Utc>>,
    strategy: ConflictStrategy,
) -> Result<Resolution> {
    match strategy {
        ConflictStrategy::ServerWins => Ok(Resolution::Server),
        ConflictStrategy::LocalWins => Ok(Resolution::Local),
        ConflictStrategy::LastWriterWins => match (local, server) {
            (Some(l), Some(s)) if l > s => Ok(Resolution::Local),
            (Some(l), Some(s)) if l < s => Ok(Resolution::Server),
            (Some(_), None) => Ok(Resolution::Local),
            (None, Some(_)) => Ok(Resolution::Server),
            _ => Err(Error::AmbiguousConflict(section.to_string())),
        },
    }
}
