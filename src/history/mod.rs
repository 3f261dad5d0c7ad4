//! Structural diffs, the change history and the conflict log

mod changelog;
mod conflicts;
mod diff;

pub use changelog::{ChangeHistory, ChangeSet};
pub use conflicts::{ConflictLog, ConflictRecord, Resolution};
pub use diff::{Change, ChangeType, Comparison, apply_changes, compare, structural_diff};
