// Shared fakes for the integration tests.
//
// Not every test file uses every helper.
#![allow(dead_code)]

use dictation_relay::audio::{FrameProducer, FrameSource};
use dictation_relay::coordination::{CoordinationChannel, FileChannel, RecordKey};
use dictation_relay::error::{DictationError, Result};
use dictation_relay::recognizer::{HypothesisUpdate, IncrementalRecognizer, RecognizerProvider};
use dictation_relay::session::{SessionConfig, SourceProvider};
use dictation_relay::AudioFrame;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub const FRAME_SIZE: usize = 160;
pub const SAMPLE_RATE: u32 = 16000;

/// Session timings short enough for tests
pub fn test_session_config() -> SessionConfig {
    SessionConfig {
        sample_rate: SAMPLE_RATE,
        frame_size: FRAME_SIZE,
        queue_capacity: 16,
        poll_timeout: Duration::from_millis(20),
        partial_interval: Duration::from_millis(0),
        heartbeat_interval: Duration::from_millis(50),
    }
}

pub fn temp_channel() -> (TempDir, Arc<FileChannel>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let channel = FileChannel::open(dir.path()).expect("open channel");
    (dir, Arc::new(channel))
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Pid of a process that has already exited and been reaped
pub fn dead_pid() -> u32 {
    let mut child = std::process::Command::new("true")
        .spawn()
        .expect("spawn true");
    let pid = child.id();
    child.wait().expect("wait for true");
    pid
}

pub fn has(channel: &dyn CoordinationChannel, key: RecordKey) -> bool {
    channel.has_flag(key).expect("has_flag")
}

/// How a [`ScriptedSource`] behaves once its frames are delivered
#[derive(Debug, Clone)]
pub enum AfterScript {
    /// Stay open and silent until closed
    Idle,
    /// Report a device fault
    Fail(String),
    /// Keep delivering frames faster than the poll timeout until closed
    Stream,
}

/// Capture source delivering a fixed number of frames from a driver thread.
pub struct ScriptedSource {
    frames: usize,
    after: AfterScript,
    stop: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    driver: Option<JoinHandle<()>>,
}

impl ScriptedSource {
    pub fn new(frames: usize) -> Self {
        Self {
            frames,
            after: AfterScript::Idle,
            stop: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
            driver: None,
        }
    }

    pub fn then(mut self, after: AfterScript) -> Self {
        self.after = after;
        self
    }

    /// Set once `close` has run
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

impl FrameSource for ScriptedSource {
    fn open(&mut self, mut producer: FrameProducer) -> Result<()> {
        let frames = self.frames;
        let after = self.after.clone();
        let stop = Arc::clone(&self.stop);
        let frame = vec![1000i16; producer.frame_size()];

        self.driver = Some(std::thread::spawn(move || {
            for _ in 0..frames {
                if stop.load(Ordering::SeqCst) {
                    return;
                }
                producer.push_samples(&frame);
                std::thread::sleep(Duration::from_millis(2));
            }
            if let AfterScript::Fail(reason) = &after {
                producer.fault_reporter().report(reason.clone());
            }
            while !stop.load(Ordering::SeqCst) {
                if let AfterScript::Stream = after {
                    producer.push_samples(&frame);
                }
                std::thread::sleep(Duration::from_millis(2));
            }
        }));
        Ok(())
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(driver) = self.driver.take() {
            let _ = driver.join();
        }
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_capturing(&self) -> bool {
        self.driver.is_some()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Source whose device cannot be opened
pub struct FailingSource;

impl FrameSource for FailingSource {
    fn open(&mut self, _producer: FrameProducer) -> Result<()> {
        Err(DictationError::Device("no input device".to_string()))
    }

    fn close(&mut self) {}

    fn is_capturing(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// What a [`ScriptedRecognizer`] does for one frame
#[derive(Debug, Clone)]
pub enum Step {
    Update(HypothesisUpdate),
    Fail(String),
    Panic(String),
}

pub fn partial(text: &str) -> Step {
    Step::Update(HypothesisUpdate::Partial(text.to_string()))
}

pub fn final_text(text: &str) -> Step {
    Step::Update(HypothesisUpdate::Final(text.to_string()))
}

/// Recognizer replaying one step per accepted frame, then `NoChange`.
pub struct ScriptedRecognizer {
    steps: Vec<Step>,
    accepted: Arc<AtomicUsize>,
}

impl ScriptedRecognizer {
    pub fn new(steps: Vec<Step>, accepted: Arc<AtomicUsize>) -> Self {
        Self { steps, accepted }
    }
}

impl IncrementalRecognizer for ScriptedRecognizer {
    fn accept(&mut self, _frame: &AudioFrame) -> Result<HypothesisUpdate> {
        let index = self.accepted.fetch_add(1, Ordering::SeqCst);
        match self.steps.get(index).cloned() {
            Some(Step::Update(update)) => Ok(update),
            Some(Step::Fail(reason)) => Err(DictationError::Recognition(reason)),
            Some(Step::Panic(reason)) => panic!("{}", reason),
            None => Ok(HypothesisUpdate::NoChange),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Providers handing out fresh scripted fakes for each session
pub struct Fakes {
    pub accepted: Arc<AtomicUsize>,
    pub source_closed: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
    pub sources_opened: Arc<AtomicUsize>,
}

impl Fakes {
    pub fn new() -> Self {
        Self {
            accepted: Arc::new(AtomicUsize::new(0)),
            source_closed: Arc::new(Mutex::new(Vec::new())),
            sources_opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn sources(&self, frames: usize, after: AfterScript) -> SourceProvider {
        let closed = Arc::clone(&self.source_closed);
        let opened = Arc::clone(&self.sources_opened);
        Arc::new(move || {
            let source = ScriptedSource::new(frames).then(after.clone());
            closed.lock().unwrap().push(source.closed_flag());
            opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(source) as Box<dyn FrameSource>)
        })
    }

    pub fn failing_sources(&self) -> SourceProvider {
        Arc::new(|| Ok(Box::new(FailingSource) as Box<dyn FrameSource>))
    }

    pub fn recognizers(&self, steps: Vec<Step>) -> RecognizerProvider {
        let accepted = Arc::clone(&self.accepted);
        Arc::new(move |_sample_rate: u32| {
            Ok(Box::new(ScriptedRecognizer::new(steps.clone(), Arc::clone(&accepted)))
                as Box<dyn IncrementalRecognizer>)
        })
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Every source handed out so far has been closed
    pub fn all_sources_closed(&self) -> bool {
        self.source_closed
            .lock()
            .unwrap()
            .iter()
            .all(|closed| closed.load(Ordering::SeqCst))
    }
}

/// Channel wrapper remembering every key ever written
pub struct RecordingChannel {
    inner: FileChannel,
    written: Mutex<Vec<RecordKey>>,
}

impl RecordingChannel {
    pub fn new(inner: FileChannel) -> Self {
        Self {
            inner,
            written: Mutex::new(Vec::new()),
        }
    }

    pub fn writes_of(&self, key: RecordKey) -> usize {
        self.written.lock().unwrap().iter().filter(|k| **k == key).count()
    }

    fn note(&self, key: RecordKey) {
        self.written.lock().unwrap().push(key);
    }
}

impl CoordinationChannel for RecordingChannel {
    fn set_flag(&self, key: RecordKey) -> Result<()> {
        self.note(key);
        self.inner.set_flag(key)
    }

    fn clear_flag(&self, key: RecordKey) -> Result<()> {
        self.inner.clear_flag(key)
    }

    fn has_flag(&self, key: RecordKey) -> Result<bool> {
        self.inner.has_flag(key)
    }

    fn write_value(&self, key: RecordKey, text: &str) -> Result<()> {
        self.note(key);
        self.inner.write_value(key, text)
    }

    fn create_value(&self, key: RecordKey, text: &str) -> Result<bool> {
        self.note(key);
        self.inner.create_value(key, text)
    }

    fn read_and_clear_value(&self, key: RecordKey) -> Result<Option<String>> {
        self.inner.read_and_clear_value(key)
    }

    fn peek_value(&self, key: RecordKey) -> Result<Option<String>> {
        self.inner.peek_value(key)
    }

    fn age(&self, key: RecordKey) -> Result<Option<Duration>> {
        self.inner.age(key)
    }
}
