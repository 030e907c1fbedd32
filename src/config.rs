use anyhow::{bail, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub coordination: CoordinationConfig,
    pub audio: AudioConfig,
    pub recognizer: RecognizerConfig,
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "dictation-relay".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8765,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// Directory holding the coordination records
    pub dir: PathBuf,
    /// How long the worker waits for a frame before checking for cancellation
    pub poll_timeout_ms: u64,
    /// Minimum spacing between two `partial` record writes
    pub partial_interval_ms: u64,
    /// How often the worker refreshes the `status` heartbeat
    pub heartbeat_interval_ms: u64,
    /// Records older than this are treated as orphans at startup
    pub stale_after_secs: u64,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".dictation"),
            poll_timeout_ms: 100,
            partial_interval_ms: 250,
            heartbeat_interval_ms: 1000,
            stale_after_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Microphone,
    File,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub source: SourceKind,
    /// Input device name, or "default"
    pub device: String,
    /// WAV file replayed when `source = "file"`
    pub file_path: Option<PathBuf>,
    /// Pace file playback like a live device
    pub realtime: bool,
    pub sample_rate: u32,
    /// Samples per frame
    pub frame_size: usize,
    /// Frames buffered between the driver and the worker
    pub queue_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Microphone,
            device: "default".to_string(),
            file_path: None,
            realtime: true,
            sample_rate: 16000, // Recognizer expects 16kHz
            frame_size: 1600,   // 100ms frames
            queue_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    pub model_path: PathBuf,
    /// Language code, or "auto"
    pub language: String,
    pub threads: u32,
    /// RMS level (0.0..1.0) above which a frame counts as speech
    pub speech_threshold: f32,
    /// Silence after speech that closes an utterance
    pub trailing_silence_ms: u64,
    /// Buffered speech between two partial decodes
    pub partial_every_ms: u64,
    /// Utterances are force-finalized at this length
    pub max_utterance_ms: u64,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/ggml-base.bin"),
            language: "fr".to_string(),
            threads: 4,
            speech_threshold: 0.01,
            trailing_silence_ms: 700,
            partial_every_ms: 500,
            max_utterance_ms: 30_000,
        }
    }
}

impl RecognizerConfig {
    pub fn endpoint(&self) -> crate::recognizer::EndpointConfig {
        crate::recognizer::EndpointConfig {
            speech_threshold: self.speech_threshold,
            trailing_silence_ms: self.trailing_silence_ms,
            partial_every_ms: self.partial_every_ms,
            max_utterance_ms: self.max_utterance_ms,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Program answering questions; the question is passed as its last argument
    pub command: Option<String>,
    pub args: Vec<String>,
    pub timeout_secs: u64,
    pub history_path: PathBuf,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            timeout_secs: 300,
            history_path: PathBuf::from(".dictation/history.json"),
        }
    }
}

impl Config {
    /// Load from an optional config file plus `DICTATION__SECTION__KEY` environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("DICTATION").separator("__"))
            .build()?;

        let cfg: Config = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let poll = self.coordination.poll_timeout_ms;
        if !(20..=200).contains(&poll) {
            bail!(
                "coordination.poll_timeout_ms must be between 20 and 200, got {}",
                poll
            );
        }
        if self.audio.sample_rate == 0 {
            bail!("audio.sample_rate must be non-zero");
        }
        if self.audio.frame_size == 0 {
            bail!("audio.frame_size must be non-zero");
        }
        if self.audio.queue_capacity == 0 {
            bail!("audio.queue_capacity must be non-zero");
        }
        if self.coordination.stale_after_secs == 0 {
            bail!("coordination.stale_after_secs must be non-zero");
        }
        let stale_ms = self.coordination.stale_after_secs.saturating_mul(1000);
        if self.coordination.heartbeat_interval_ms.saturating_mul(2) >= stale_ms {
            bail!(
                "coordination.heartbeat_interval_ms ({}) must be less than half of stale_after_secs ({}s)",
                self.coordination.heartbeat_interval_ms,
                self.coordination.stale_after_secs
            );
        }
        Ok(())
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.coordination.stale_after_secs)
    }
}
