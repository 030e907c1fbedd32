//! Startup reconciliation of orphaned records.
//!
//! A worker that crashed (or whose host process was killed) leaves its
//! records behind. Without this pass a leftover `status` would make
//! `is_active` report true forever.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::records::{peek_json, write_json};
use super::{CoordinationChannel, FinalRecord, LockRecord, RecordKey, StatusRecord};
use crate::error::{FailureKind, Result};

/// What a reconciliation pass removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// A stale `status` was removed
    pub stale_session: bool,
    /// An `Interrupted` final record was written for the stale session
    pub wrote_interrupted_final: bool,
    pub removed_lock: bool,
    pub removed_cancel: bool,
    pub removed_partial: bool,
    pub removed_scratch: usize,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        *self == ReconcileReport::default()
    }
}

pub struct Reconciler {
    channel: Arc<dyn CoordinationChannel>,
    stale_after: Duration,
}

impl Reconciler {
    pub fn new(channel: Arc<dyn CoordinationChannel>, stale_after: Duration) -> Self {
        Self {
            channel,
            stale_after,
        }
    }

    pub fn run(&self) -> Result<ReconcileReport> {
        let channel = self.channel.as_ref();
        let mut report = ReconcileReport::default();

        if channel.has_flag(RecordKey::Status)? {
            if let Some(session_id) = self.stale_status()? {
                warn!(
                    session_id = ?session_id,
                    "Removing stale status record left by a dead worker"
                );
                report.stale_session = true;

                if !channel.has_flag(RecordKey::Final)? {
                    let record = FinalRecord::failure(
                        session_id.unwrap_or_else(Uuid::nil),
                        FailureKind::Interrupted,
                        "recording was interrupted before a result was produced",
                        None,
                    );
                    write_json(channel, RecordKey::Final, &record)?;
                    report.wrote_interrupted_final = true;
                }

                channel.clear_flag(RecordKey::Status)?;
                report.removed_lock = self.remove_if_present(RecordKey::Lock)?;
                report.removed_cancel = self.remove_if_present(RecordKey::Cancel)?;
                report.removed_partial = self.remove_if_present(RecordKey::Partial)?;
            }
        } else if self.lock_is_stale()? {
            warn!("Removing stale lock record from a worker that never started recording");
            channel.clear_flag(RecordKey::Lock)?;
            report.removed_lock = true;
        }

        if !channel.has_flag(RecordKey::Status)? && !channel.has_flag(RecordKey::Lock)? {
            report.removed_cancel |= self.remove_if_present(RecordKey::Cancel)?;
            report.removed_partial |= self.remove_if_present(RecordKey::Partial)?;
        }

        report.removed_scratch = channel.sweep_scratch(self.stale_after)?;

        if !report.is_clean() {
            info!(?report, "Coordination records reconciled");
        }
        Ok(report)
    }

    /// `Some(session_id)` when the status record is stale; the id is `None`
    /// when the record cannot be parsed at all.
    ///
    /// Requires both an old heartbeat and a hosting process that has exited.
    fn stale_status(&self) -> Result<Option<Option<Uuid>>> {
        let status = match peek_json::<StatusRecord>(self.channel.as_ref(), RecordKey::Status) {
            Ok(Some(status)) => status,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!("Unreadable status record: {}", e);
                return Ok(self.record_is_old(RecordKey::Status)?.then_some(None));
            }
        };

        if since(status.heartbeat_at) < self.stale_after {
            return Ok(None);
        }
        if process_alive(status.pid) {
            warn!(
                session_id = %status.session_id,
                pid = status.pid,
                "Status heartbeat is stale but the worker process is still running; keeping it"
            );
            return Ok(None);
        }
        Ok(Some(Some(status.session_id)))
    }

    fn lock_is_stale(&self) -> Result<bool> {
        match peek_json::<LockRecord>(self.channel.as_ref(), RecordKey::Lock) {
            Ok(Some(lock)) => Ok(since(lock.created_at) >= self.stale_after),
            Ok(None) => Ok(false),
            Err(e) => {
                warn!("Unreadable lock record: {}", e);
                self.record_is_old(RecordKey::Lock)
            }
        }
    }

    /// Fallback for records whose content cannot be trusted: judge by write time
    fn record_is_old(&self, key: RecordKey) -> Result<bool> {
        Ok(self
            .channel
            .age(key)?
            .is_some_and(|age| age >= self.stale_after))
    }

    fn remove_if_present(&self, key: RecordKey) -> Result<bool> {
        if self.channel.has_flag(key)? {
            self.channel.clear_flag(key)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

fn since(at: DateTime<Utc>) -> Duration {
    Utc::now()
        .signed_duration_since(at)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs the permission and existence checks only.
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    matches!(
        std::io::Error::last_os_error().raw_os_error(),
        Some(code) if code == libc::EPERM
    )
}

#[cfg(not(unix))]
fn process_alive(pid: u32) -> bool {
    pid == std::process::id()
}
