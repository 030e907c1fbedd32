use chrono::Utc;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::cancel::CancellationToken;
use super::config::SessionConfig;
use super::state::WorkerState;
use super::stats::SessionStats;
use super::transcript::Transcript;
use crate::audio::{frame_queue, FrameConsumer, FrameSource, Next, OpenSource};
use crate::coordination::{write_json, CoordinationChannel, FinalRecord, RecordKey, StatusRecord};
use crate::error::{DictationError, FailureKind, Result};
use crate::recognizer::{HypothesisUpdate, IncrementalRecognizer, RecognizerProvider};

/// Builds the capture source for one session
pub type SourceProvider = Arc<dyn Fn() -> Result<Box<dyn FrameSource>> + Send + Sync>;

/// Background worker owning one capture source and one recognizer for the
/// lifetime of a session.
///
/// [`run`](Self::run) always ends by writing exactly one `final` record, no
/// matter how the session ended; a failure that escaped the worker would
/// leave `status` behind and the session stuck as "active" forever.
pub struct SessionWorker {
    session_id: Uuid,
    channel: Arc<dyn CoordinationChannel>,
    sources: SourceProvider,
    recognizers: RecognizerProvider,
    config: SessionConfig,
    cancel: CancellationToken,
    state: WorkerState,
    stats: SessionStats,
}

impl SessionWorker {
    pub fn new(
        session_id: Uuid,
        channel: Arc<dyn CoordinationChannel>,
        sources: SourceProvider,
        recognizers: RecognizerProvider,
        config: SessionConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            channel,
            sources,
            recognizers,
            config,
            cancel,
            state: WorkerState::Starting,
            stats: SessionStats::new(Utc::now()),
        }
    }

    /// Capture and decode until cancelled, then publish the result.
    pub fn run(mut self) -> FinalRecord {
        info!(session_id = %self.session_id, "Session worker started");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.capture()));

        self.stats.finish();
        let stats = Some(self.stats.clone());
        let record = match outcome {
            Ok(Ok(text)) => FinalRecord::success(self.session_id, text, stats),
            Ok(Err(e)) => {
                let kind = e.failure_kind();
                error!(session_id = %self.session_id, "Session failed: {}", e);
                FinalRecord::failure(self.session_id, kind, format!("[{}] {}", kind.marker(), e), stats)
            }
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                error!(session_id = %self.session_id, "Session worker panicked: {}", reason);
                FinalRecord::failure(
                    self.session_id,
                    FailureKind::Panic,
                    format!("[{}] worker panicked: {}", FailureKind::Panic.marker(), reason),
                    stats,
                )
            }
        };

        self.finish(record)
    }

    fn enter(&mut self, next: WorkerState) {
        if !self.state.can_transition_to(&next) {
            warn!(
                session_id = %self.session_id,
                "Unexpected worker transition: {} -> {}", self.state, next
            );
        }
        debug!(session_id = %self.session_id, "Worker state: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Starting -> Recording -> Finalizing. Returns the authoritative text.
    fn capture(&mut self) -> Result<String> {
        let (producer, consumer) = frame_queue(
            self.config.queue_capacity,
            self.config.frame_size,
            self.config.sample_rate,
        );

        let source = (self.sources)()?;
        let mut recognizer = (self.recognizers)(self.config.sample_rate)?;
        let capture = OpenSource::open(source, producer)?;

        let mut status = StatusRecord::new(self.session_id);
        write_json(self.channel.as_ref(), RecordKey::Status, &status)?;
        self.enter(WorkerState::Recording);
        self.channel.clear_flag(RecordKey::Partial)?;
        info!(
            session_id = %self.session_id,
            source = capture.name(),
            recognizer = recognizer.name(),
            "Recording"
        );

        let mut transcript = Transcript::default();
        let recorded = self.record(&consumer, recognizer.as_mut(), &mut transcript, &mut status);

        self.enter(WorkerState::Finalizing);
        self.stats.frames_dropped = consumer.dropped();
        self.stats.partials = transcript.partials();
        self.stats.finals = transcript.finals();
        if self.stats.frames_dropped > 0 {
            warn!(
                session_id = %self.session_id,
                dropped = self.stats.frames_dropped,
                "Frames were dropped because decoding fell behind capture"
            );
        }

        drop(capture);
        drop(recognizer);
        recorded?;

        self.channel.clear_flag(RecordKey::Cancel)?;
        Ok(transcript.authoritative())
    }

    /// Recording loop; returns once a stop is observed.
    fn record(
        &mut self,
        frames: &FrameConsumer,
        recognizer: &mut dyn IncrementalRecognizer,
        transcript: &mut Transcript,
        status: &mut StatusRecord,
    ) -> Result<()> {
        let poll_timeout = self.config.poll_timeout;
        let mut partials = PartialPublisher::new(self.config.partial_interval);
        let mut last_cancel_check = Instant::now();
        let mut last_heartbeat = Instant::now();

        loop {
            let timed_out = match frames.next(poll_timeout) {
                Next::Frame(frame) => {
                    self.stats.frames_processed += 1;
                    let update = recognizer.accept(&frame)?;
                    if let HypothesisUpdate::Final(text) = &update {
                        info!(
                            session_id = %self.session_id,
                            sequence = frame.sequence,
                            "Utterance finalized: {}", text
                        );
                    }
                    if let Some(text) = transcript.apply(update) {
                        partials.offer(text);
                    }
                    false
                }
                Next::Timeout => true,
                Next::Failed(reason) => return Err(DictationError::Device(reason)),
                Next::Closed => {
                    return Err(DictationError::Device(
                        "capture stream closed unexpectedly".to_string(),
                    ))
                }
            };

            partials.flush_due(self.channel.as_ref())?;

            // A steady frame stream never times out, so cancellation is also
            // sampled whenever a full poll interval has passed.
            if timed_out || last_cancel_check.elapsed() >= poll_timeout {
                last_cancel_check = Instant::now();
                if self.cancel.is_cancelled()? {
                    info!(session_id = %self.session_id, "Stop requested");
                    return Ok(());
                }
            }

            if last_heartbeat.elapsed() >= self.config.heartbeat_interval {
                last_heartbeat = Instant::now();
                status.heartbeat_at = Utc::now();
                write_json(self.channel.as_ref(), RecordKey::Status, status)?;
            }
        }
    }

    /// Finalizing -> Done: publish the result, then drop the session records.
    fn finish(mut self, record: FinalRecord) -> FinalRecord {
        if self.state == WorkerState::Recording {
            self.enter(WorkerState::Finalizing);
        }

        let channel = self.channel.as_ref();
        if let Err(e) = write_json(channel, RecordKey::Final, &record) {
            error!(session_id = %self.session_id, "Failed to write final record: {}", e);
        }
        for key in [
            RecordKey::Status,
            RecordKey::Partial,
            RecordKey::Cancel,
            RecordKey::Lock,
        ] {
            if let Err(e) = channel.clear_flag(key) {
                error!(session_id = %self.session_id, "Failed to remove {} record: {}", key, e);
            }
        }

        self.enter(WorkerState::Done);
        info!(
            session_id = %self.session_id,
            error = record.error.map(|k| k.marker()),
            frames = self.stats.frames_processed,
            duration_secs = self.stats.duration_secs,
            "Session worker finished"
        );
        record
    }
}

/// Throttles `partial` writes to at most one per interval; only the newest
/// pending text is ever written.
struct PartialPublisher {
    interval: Duration,
    last_write: Option<Instant>,
    pending: Option<String>,
}

impl PartialPublisher {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_write: None,
            pending: None,
        }
    }

    fn offer(&mut self, text: &str) {
        self.pending = Some(text.to_string());
    }

    fn flush_due(&mut self, channel: &dyn CoordinationChannel) -> Result<()> {
        let due = self
            .last_write
            .map_or(true, |at| at.elapsed() >= self.interval);
        if !due {
            return Ok(());
        }
        if let Some(text) = self.pending.take() {
            channel.write_value(RecordKey::Partial, &text)?;
            self.last_write = Some(Instant::now());
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
