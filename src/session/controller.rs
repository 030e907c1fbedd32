use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::spawner::WorkerSpawner;
use crate::coordination::{
    peek_json, read_json, CoordinationChannel, FinalRecord, LockRecord, ReconcileReport,
    Reconciler, RecordKey, StatusRecord,
};
use crate::error::{DictationError, Result};

/// Result of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started(Uuid),
    /// A session is already recording or being launched
    AlreadyActive,
}

/// Caller-facing session operations.
///
/// Holds no session state of its own: every call reads the coordination
/// records afresh, so a new controller in a new process sees exactly what the
/// previous one left behind.
pub struct SessionController {
    channel: Arc<dyn CoordinationChannel>,
    spawner: Arc<dyn WorkerSpawner>,
    stt_available: bool,
    stale_after: Duration,
}

impl SessionController {
    pub fn new(
        channel: Arc<dyn CoordinationChannel>,
        spawner: Arc<dyn WorkerSpawner>,
        stt_available: bool,
        stale_after: Duration,
    ) -> Self {
        Self {
            channel,
            spawner,
            stt_available,
            stale_after,
        }
    }

    pub fn stt_available(&self) -> bool {
        self.stt_available
    }

    /// Launch a background worker unless one is already active
    pub fn start(&self) -> Result<StartOutcome> {
        if !self.stt_available {
            return Err(DictationError::ModelUnavailable(
                "speech recognition is not available".to_string(),
            ));
        }

        if self.channel.has_flag(RecordKey::Status)? || self.channel.has_flag(RecordKey::Lock)? {
            debug!("Start ignored: session already active");
            return Ok(StartOutcome::AlreadyActive);
        }

        // No worker exists, so any cancel left here belongs to a dead session.
        self.channel.clear_flag(RecordKey::Cancel)?;

        let session_id = Uuid::new_v4();
        let lock = LockRecord {
            session_id,
            created_at: Utc::now(),
        };
        if !self
            .channel
            .create_value(RecordKey::Lock, &serde_json::to_string(&lock)?)?
        {
            debug!("Start lost the race for the lock record");
            return Ok(StartOutcome::AlreadyActive);
        }

        if let Err(e) = self.spawner.spawn(session_id) {
            warn!(session_id = %session_id, "Failed to spawn worker: {}", e);
            self.channel.clear_flag(RecordKey::Lock)?;
            return Err(e);
        }

        info!(session_id = %session_id, "Dictation session started");
        Ok(StartOutcome::Started(session_id))
    }

    /// Ask the active worker to stop. Returns `false` when nothing is active.
    pub fn request_stop(&self) -> Result<bool> {
        if !self.channel.has_flag(RecordKey::Status)? && !self.channel.has_flag(RecordKey::Lock)? {
            debug!("Stop ignored: no active session");
            return Ok(false);
        }
        self.channel.set_flag(RecordKey::Cancel)?;
        info!("Stop requested");
        Ok(true)
    }

    /// Latest partial hypothesis; non-destructive
    pub fn poll_partial(&self) -> Result<Option<String>> {
        self.channel.peek_value(RecordKey::Partial)
    }

    /// Take the session result; at most one caller receives it
    pub fn poll_final(&self) -> Result<Option<FinalRecord>> {
        read_json(self.channel.as_ref(), RecordKey::Final)
    }

    pub fn is_active(&self) -> Result<bool> {
        self.channel.has_flag(RecordKey::Status)
    }

    /// Current `status` record, if a worker is recording
    pub fn status(&self) -> Result<Option<StatusRecord>> {
        peek_json(self.channel.as_ref(), RecordKey::Status)
    }

    /// Clean up records orphaned by a crashed worker
    pub fn reconcile(&self) -> Result<ReconcileReport> {
        Reconciler::new(self.channel.clone(), self.stale_after).run()
    }
}
