//! Remote synchronization
//!
//! [`SyncEngine`] exchanges the live configuration with one remote
//! counterpart through a [`SyncTransport`]. Sections changed on both sides
//! are settled per [`ConflictStrategy`], last writer wins by default.

mod conflict;
mod engine;
mod policy;
mod transport;

pub use conflict::{
    METADATA_KEY, Resolved, ServerTimes, parse_timestamp, resolve_conflicts, restrict_to_policy,
};
pub use engine::{PUSH_FORMAT_VERSION, SyncEngine, SyncOutcome};
pub use policy::{ALL_SECTIONS, ConflictStrategy, SyncPolicy};
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{PushMetadata, PushRequest, SyncRequest, SyncResponse, SyncTransport};
