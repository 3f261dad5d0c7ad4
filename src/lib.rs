//! # confkeep
//!
//! Layered configuration persistence for a desktop automation assistant:
//! validated updates, encrypted checksummed backups, a structural change
//! history and remote sync with last-writer-wins conflict resolution.
//!
//! ## Features
//!
//! - **Layered configuration**: schema + defaults + user overlay; only the
//!   overlay (what differs from the defaults) is written back
//! - **Validation**: a JSON-schema subset plus domain rules, checked on every
//!   candidate before it goes live
//! - **Backups**: timestamped snapshots with a SHA-256 manifest, optionally
//!   AES-256-GCM encrypted, restored all-or-nothing
//! - **History**: every committed change recorded as a structural diff
//! - **Sync**: periodic exchange with a remote endpoint, section-level
//!   conflict resolution (requires the `http` feature for the HTTP transport)
//! - **Concurrency**: lock-free reads, one mutation lock, background timers
//!
//! ## Quick Start
//!
//! ```rust
//! use confkeep::{ConfigStore, StoreConfig, UpdateOutcome};
//! use serde_json::json;
//!
//! # let temp = tempfile::tempdir().unwrap();
//! let config = StoreConfig::builder("assistant")
//!     .config_dir(temp.path())
//!     .build();
//! let store = ConfigStore::open(config)?;
//!
//! assert_eq!(store.update("speech", "synthesis.rate", json!(200))?, UpdateOutcome::Applied);
//! assert!(!store.update("speech", "synthesis.rate", json!(500))?.is_applied());
//! assert_eq!(store.get_path("speech.synthesis.rate"), Some(json!(200)));
//! # Ok::<(), confkeep::Error>(())
//! ```
//!
//! ## Runtime
//!
//! [`ConfigRuntime`] is the process-wide context: it opens one store, builds
//! the vault, the backup manager and (when an endpoint is configured) the
//! sync engine, and runs the backup and sync timers.
//!
//! ```rust,no_run
//! use confkeep::{ConfigRuntime, StoreConfig};
//! use std::time::Duration;
//!
//! # fn example() -> confkeep::Result<()> {
//! let config = StoreConfig::builder("assistant")
//!     .config_dir("~/.config/assistant")
//!     .backup_interval(Duration::from_secs(3600))
//!     .sync_endpoint("https://sync.example.com/config")
//!     .build();
//!
//! let runtime = ConfigRuntime::open(config)?;
//! runtime.start()?;
//!
//! let theme = runtime.store().get_path("interface.theme");
//! # Ok(())
//! # }
//! ```
//!
//! ## Backup & Restore
//!
//! ```rust,no_run
//! use confkeep::{ConfigRuntime, StoreConfig};
//!
//! # fn example(runtime: &ConfigRuntime) -> confkeep::Result<()> {
//! let manifest = runtime.backups().create_backup()?;
//! println!("{} file(s) in {}", manifest.files.len(), manifest.id);
//!
//! // Verified in full before anything is written, then reloaded
//! runtime.restore_backup(&manifest.id)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Change History
//!
//! ```rust,no_run
//! use confkeep::ConfigStore;
//!
//! # fn example(store: &ConfigStore) -> confkeep::Result<()> {
//! for set in store.history().view_history(Some("speech"), 10)? {
//!     for change in &set.changes {
//!         println!("{} {:?} {}", set.timestamp, change.change_type, change.path);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

// Core modules
mod error;
pub mod events;
pub mod scheduler;
pub mod security;
pub mod storage;

// Grouped modules
pub mod backup;
pub mod config;
pub mod crypto;
pub mod history;
pub mod remote;
pub mod runtime;
pub mod sections;
pub mod store;

// Re-exports from core
pub use error::{Error, ErrorKind, Recovery, Result};
pub use events::EventManager;
pub use storage::{JsonStorage, LoadOutcome, StorageBackend};

// Re-exports from config
pub use config::{CriticalFile, SchemaValidator, StoreConfig, StoreConfigBuilder, Violation};

pub use backup::{BackupManager, BackupManifest, RestoreResult};
pub use crypto::CryptoVault;
pub use history::{Change, ChangeHistory, ChangeType, ConflictRecord};
pub use remote::{SyncEngine, SyncOutcome, SyncPolicy, SyncTransport};
pub use runtime::ConfigRuntime;
pub use sections::Section;
pub use store::{ConfigStore, UpdateOutcome};
