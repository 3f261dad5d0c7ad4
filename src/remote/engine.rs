//! One sync cycle and the named push/fetch calls

use super::conflict::{Resolved, resolve_conflicts, restrict_to_policy};
use super::policy::SyncPolicy;
use super::transport::{PushMetadata, PushRequest, SyncRequest, SyncTransport};
use crate::backup::{BackupManager, calculate_file_hash};
use crate::crypto::CryptoVault;
use crate::error::{Error, Result};
use crate::store::{ConfigStore, ModifiedTimes, UpdateOutcome};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

/// Format version sent with pushed configurations
pub const PUSH_FORMAT_VERSION: &str = "1.0";

/// What a sync cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Sync is switched off in the configuration
    Disabled,
    /// The server had nothing newer
    UpToDate,
    /// The server configuration was merged in and is now live
    Applied,
    /// The server configuration was unusable; local state is untouched
    Skipped(String),
}

/// Synchronizes the shared [`ConfigStore`] with one remote counterpart
pub struct SyncEngine {
    store: Arc<ConfigStore>,
    vault: Arc<CryptoVault>,
    backups: Option<Arc<BackupManager>>,
    transport: Box<dyn SyncTransport>,
    policy: RwLock<SyncPolicy>,
    last_sync: RwLock<Option<DateTime<Utc>>>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<ConfigStore>,
        vault: Arc<CryptoVault>,
        backups: Option<Arc<BackupManager>>,
        transport: Box<dyn SyncTransport>,
    ) -> Self {
        Self {
            store,
            vault,
            backups,
            transport,
            policy: RwLock::new(SyncPolicy::default()),
            last_sync: RwLock::new(None),
        }
    }

    pub fn policy(&self) -> SyncPolicy {
        self.policy.read().clone()
    }

    /// Replace the sync policy; returns the previous one
    pub fn set_sync_policy(&self, policy: SyncPolicy) -> SyncPolicy {
        info!(
            "Sync policy updated (interval {}s, strategy {:?})",
            policy.interval_secs, policy.conflict_resolution
        );
        std::mem::replace(&mut *self.policy.write(), policy)
    }

    /// Time of the last cycle that applied a server configuration
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        *self.last_sync.read()
    }

    /// Run one sync cycle
    ///
    /// The server configuration is decoded, resolved against the local one,
    /// validated and backed up before it is applied. Any failure before the
    /// final apply leaves local state untouched.
    ///
    /// # Errors
    ///
    /// - [`Error::Network`] if the exchange fails
    /// - [`Error::Crypto`] if the payload cannot be encrypted or decrypted
    /// - I/O errors from hashing the user file, the backup or the apply
    pub fn sync_once(&self) -> Result<SyncOutcome> {
        if !self.store.sync_enabled() {
            debug!("Sync disabled, skipping cycle");
            return Ok(SyncOutcome::Disabled);
        }

        let (local_hash, _) = calculate_file_hash(&self.store.config().user_path())?;
        let request = SyncRequest {
            config_hash: local_hash.clone(),
            config_data: self.encode_snapshot()?,
        };

        let Some(response) = self.transport.exchange(&request)? else {
            debug!("Server reports no newer configuration");
            return Ok(SyncOutcome::UpToDate);
        };
        if response.hash == local_hash {
            debug!("Server hash matches local configuration");
            return Ok(SyncOutcome::UpToDate);
        }

        let server = match self.decode(&response.config)? {
            Some(server) => server,
            None => return Ok(self.skip("server configuration could not be decoded")),
        };
        if !server.is_object() {
            return Ok(self.skip("server configuration is not a mapping"));
        }

        let policy = self.policy();
        let preview = resolve(
            &self.store.snapshot(),
            &server,
            &policy,
            &self.store.modified_times(),
        );
        if let Err(violations) = self.store.validate(&preview.config) {
            let reason = format!(
                "server configuration failed validation: {}",
                join_violations(&violations)
            );
            return Ok(self.skip(&reason));
        }

        if let Some(backups) = &self.backups {
            let manifest = backups.create_backup()?;
            debug!("Pre-sync backup: {}", manifest.id);
        }

        // Resolve again against whatever is live at commit time
        let mut conflicts = Vec::new();
        let outcome = self.store.apply_remote(|live, times| {
            let resolved = resolve(live, &server, &policy, times);
            conflicts = resolved.conflicts;
            resolved.config
        })?;

        match outcome {
            UpdateOutcome::Rejected(violations) => {
                let reason = format!(
                    "server configuration rejected: {}",
                    join_violations(&violations)
                );
                Ok(self.skip(&reason))
            }
            UpdateOutcome::Applied | UpdateOutcome::Unchanged => {
                if let Err(e) = self.store.record_conflicts(&conflicts) {
                    error!("Failed to record sync conflicts: {e}");
                }
                *self.last_sync.write() = Some(Utc::now());
                info!(
                    "Server configuration applied ({} conflict(s))",
                    conflicts.len()
                );
                Ok(SyncOutcome::Applied)
            }
        }
    }

    /// Store the live configuration remotely under `name`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a name that is not a single path
    /// segment, or any hashing, encryption or network error.
    pub fn push(&self, name: &str) -> Result<()> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::Config(format!("Invalid remote configuration name '{name}'")));
        }

        let (checksum, _) = calculate_file_hash(&self.store.config().user_path())?;
        let request = PushRequest {
            config: self.encode_snapshot()?,
            metadata: PushMetadata {
                version: PUSH_FORMAT_VERSION.to_string(),
                modified: Utc::now(),
                checksum,
            },
        };
        self.transport.push(name, &request)?;
        info!("Configuration pushed as '{name}'");
        Ok(())
    }

    /// Configurations stored remotely, as listed by the server
    ///
    /// # Errors
    ///
    /// Returns a network error if the listing fails.
    pub fn fetch_remote_configs(&self) -> Result<Value> {
        self.transport.fetch_configs()
    }

    /// Base64 of the live configuration, encrypted when the vault is enabled
    fn encode_snapshot(&self) -> Result<String> {
        let plain = serde_json::to_vec(&*self.store.snapshot())?;
        Ok(STANDARD.encode(self.vault.encrypt(&plain)?))
    }

    /// `None` when the payload is malformed; crypto failures are errors
    fn decode(&self, config: &Value) -> Result<Option<Value>> {
        match config {
            Value::Object(_) => Ok(Some(config.clone())),
            Value::String(encoded) => {
                let Ok(bytes) = STANDARD.decode(encoded.trim()) else {
                    warn!("Server configuration is not valid base64");
                    return Ok(None);
                };
                let plain = self.vault.decrypt(&bytes)?;
                match serde_json::from_slice(&plain) {
                    Ok(value) => Ok(Some(value)),
                    Err(e) => {
                        warn!("Server configuration is not valid JSON: {e}");
                        Ok(None)
                    }
                }
            }
            _ => Ok(None),
        }
    }

    fn skip(&self, reason: &str) -> SyncOutcome {
        warn!("Sync cycle skipped: {reason}");
        SyncOutcome::Skipped(reason.to_string())
    }
}

/// Server sections the policy covers, resolved against `local`
fn resolve(local: &Value, server: &Value, policy: &SyncPolicy, times: &ModifiedTimes) -> Resolved {
    let scoped = restrict_to_policy(local, server, policy);
    resolve_conflicts(local, &scoped, times, policy.conflict_resolution)
}

fn join_violations(violations: &[crate::config::Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("policy", &*self.policy.read())
            .field("last_sync", &*self.last_sync.read())
            .finish_non_exhaustive()
    }
}
