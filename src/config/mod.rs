//! Store configuration and validation
//!
//! - `StoreConfig` - paths, retention and sync settings for a store
//! - `SchemaValidator` - structural schema checks plus domain rules
//! - `Violation` - one failed check, located by dotted path

mod schema;
mod types;

pub(crate) use schema::lookup;
pub use schema::{SchemaValidator, Violation};

pub use types::{
    CriticalFile, DEFAULT_BACKUP_INTERVAL, DEFAULT_BACKUP_RETENTION, DEFAULT_HISTORY_MAX_AGE,
    DEFAULT_HISTORY_MAX_FILES, DEFAULT_SYNC_INTERVAL, DEFAULT_SYNC_TIMEOUT, StoreConfig,
    StoreConfigBuilder,
};
