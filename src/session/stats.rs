use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statistics about a finished dictation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// When the worker started
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Frames fed to the recognizer
    pub frames_processed: u64,

    /// Frames evicted from the queue because the worker fell behind
    pub frames_dropped: u64,

    /// Partial hypotheses received
    pub partials: usize,

    /// Finalized utterances received
    pub finals: usize,
}

impl SessionStats {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            duration_secs: 0.0,
            frames_processed: 0,
            frames_dropped: 0,
            partials: 0,
            finals: 0,
        }
    }

    /// Stamp the duration up to now
    pub fn finish(&mut self) {
        let duration = Utc::now().signed_duration_since(self.started_at);
        self.duration_secs = duration.num_milliseconds() as f64 / 1000.0;
    }
}
