use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::coordination::{CoordinationChannel, RecordKey};
use crate::error::Result;

/// Cooperative cancellation handed to a worker at spawn time.
///
/// A stop can come from the `cancel` record (written by an unrelated caller
/// execution) or from the hosting process itself via [`cancel`](Self::cancel).
/// The worker samples it at its poll cadence.
#[derive(Clone)]
pub struct CancellationToken {
    channel: Arc<dyn CoordinationChannel>,
    local: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new(channel: Arc<dyn CoordinationChannel>) -> Self {
        Self {
            channel,
            local: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request a stop from inside the hosting process
    pub fn cancel(&self) {
        self.local.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> Result<bool> {
        if self.local.load(Ordering::SeqCst) {
            return Ok(true);
        }
        self.channel.has_flag(RecordKey::Cancel)
    }
}
