use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;

/// Configuration for a dictation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sample rate for audio processing (the recognizer expects 16kHz)
    pub sample_rate: u32,

    /// Samples per audio frame
    pub frame_size: usize,

    /// Frames buffered between the capture driver and the worker
    pub queue_capacity: usize,

    /// Longest wait for a frame before the worker checks for cancellation.
    /// Bounds worst-case stop latency.
    pub poll_timeout: Duration,

    /// Minimum spacing between two `partial` record writes
    pub partial_interval: Duration,

    /// How often the `status` heartbeat is refreshed
    pub heartbeat_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,                          // Recognizer expects 16kHz
            frame_size: 1600,                            // 100ms
            queue_capacity: 64,
            poll_timeout: Duration::from_millis(100),
            partial_interval: Duration::from_millis(250),
            heartbeat_interval: Duration::from_secs(1),
        }
    }
}

impl From<&Config> for SessionConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            sample_rate: cfg.audio.sample_rate,
            frame_size: cfg.audio.frame_size,
            queue_capacity: cfg.audio.queue_capacity,
            poll_timeout: Duration::from_millis(cfg.coordination.poll_timeout_ms),
            partial_interval: Duration::from_millis(cfg.coordination.partial_interval_ms),
            heartbeat_interval: Duration::from_millis(cfg.coordination.heartbeat_interval_ms),
        }
    }
}
