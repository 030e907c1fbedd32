//! Out-of-process coordination records
//!
//! A stateless caller and a long-running session worker never share memory;
//! they exchange state through a handful of named, persistent records:
//! - `status`  - present while a worker is recording (worker writes, worker removes)
//! - `cancel`  - stop request (controller writes, worker removes)
//! - `partial` - latest partial hypothesis (worker overwrites, caller peeks)
//! - `final`   - session result (worker writes once, caller reads and deletes)
//! - `lock`    - spawn guard held from `start` until the worker exits
//!
//! Absent records are a normal outcome for every operation.

mod file;
mod reconcile;
mod records;

pub use file::{atomic_write, FileChannel};
pub use reconcile::{ReconcileReport, Reconciler};
pub use records::{read_json, write_json, peek_json, FinalRecord, LockRecord, StatusRecord};

use std::fmt;
use std::time::Duration;

use crate::error::Result;

/// Well-known record names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Status,
    Cancel,
    Partial,
    Final,
    Lock,
}

impl RecordKey {
    pub const ALL: [RecordKey; 5] = [
        RecordKey::Status,
        RecordKey::Cancel,
        RecordKey::Partial,
        RecordKey::Final,
        RecordKey::Lock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKey::Status => "status",
            RecordKey::Cancel => "cancel",
            RecordKey::Partial => "partial",
            RecordKey::Final => "final",
            RecordKey::Lock => "lock",
        }
    }

    /// File name used by [`FileChannel`]
    pub fn file_name(&self) -> &'static str {
        match self {
            RecordKey::Status => "status.json",
            RecordKey::Cancel => "cancel.flag",
            RecordKey::Partial => "partial.txt",
            RecordKey::Final => "final.json",
            RecordKey::Lock => "lock.json",
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named persistent records shared between unrelated executions.
///
/// Writes must be all-or-nothing with respect to concurrent reads of the same
/// key: a reader sees either the previous value, the new value, or no record.
pub trait CoordinationChannel: Send + Sync {
    /// Publish a presence-only record
    fn set_flag(&self, key: RecordKey) -> Result<()>;

    /// Remove a record; removing an absent record succeeds
    fn clear_flag(&self, key: RecordKey) -> Result<()>;

    fn has_flag(&self, key: RecordKey) -> Result<bool>;

    /// Atomically replace the record's value
    fn write_value(&self, key: RecordKey, text: &str) -> Result<()>;

    /// Atomically publish the value only if no record exists.
    ///
    /// Returns `false` when the record was already present.
    fn create_value(&self, key: RecordKey, text: &str) -> Result<bool>;

    /// Destructive read: at most one caller obtains a given value
    fn read_and_clear_value(&self, key: RecordKey) -> Result<Option<String>>;

    fn peek_value(&self, key: RecordKey) -> Result<Option<String>>;

    /// Time since the record was last written, if it exists
    fn age(&self, key: RecordKey) -> Result<Option<Duration>>;

    /// Remove leftovers of interrupted writes older than `older_than`
    fn sweep_scratch(&self, _older_than: Duration) -> Result<usize> {
        Ok(0)
    }
}
