use std::time::{Duration, Instant};
use tracing::info;

use super::config::SessionConfig;
use super::transcript::Transcript;
use crate::audio::{frame_queue, FrameSource, Next, OpenSource};
use crate::error::{DictationError, Result};
use crate::recognizer::IncrementalRecognizer;

/// Capture for a fixed duration in the foreground and return the text.
///
/// Bypasses the coordination records entirely; used to check a microphone and
/// model setup.
pub fn capture_for(
    source: Box<dyn FrameSource>,
    recognizer: &mut dyn IncrementalRecognizer,
    duration: Duration,
    config: &SessionConfig,
) -> Result<String> {
    let (producer, consumer) = frame_queue(config.queue_capacity, config.frame_size, config.sample_rate);
    let capture = OpenSource::open(source, producer)?;
    info!(source = capture.name(), seconds = duration.as_secs_f32(), "Test capture started");

    let mut transcript = Transcript::default();
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        match consumer.next(config.poll_timeout) {
            Next::Frame(frame) => {
                transcript.apply(recognizer.accept(&frame)?);
            }
            Next::Timeout => {}
            Next::Failed(reason) => return Err(DictationError::Device(reason)),
            Next::Closed => {
                return Err(DictationError::Device("capture stream closed unexpectedly".to_string()))
            }
        }
    }

    drop(capture);
    info!(dropped = consumer.dropped(), "Test capture finished");
    Ok(transcript.authoritative())
}
