use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the dictation core.
///
/// Worker-side failures never escape the worker thread: they are converted
/// into an error-flagged `final` record via [`DictationError::failure_kind`].
#[derive(Debug, Error)]
pub enum DictationError {
    /// The speech model could not be loaded. Fatal to starting a session,
    /// not to the process.
    #[error("speech model unavailable: {0}")]
    ModelUnavailable(String),

    /// The capture device could not be opened or failed mid-stream.
    #[error("device error: {0}")]
    Device(String),

    /// The recognizer failed while decoding.
    #[error("recognition error: {0}")]
    Recognition(String),

    /// The retrieval/generation collaborator failed.
    #[error("downstream error: {0}")]
    Downstream(String),

    #[error("coordination record I/O failed: {0}")]
    Coordination(#[from] std::io::Error),

    #[error("malformed coordination record: {0}")]
    Record(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to spawn session worker: {0}")]
    Spawn(String),
}

impl DictationError {
    /// Classification written into an error-flagged `final` record.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            DictationError::ModelUnavailable(_) => FailureKind::ModelUnavailable,
            DictationError::Device(_) => FailureKind::Device,
            DictationError::Recognition(_) | DictationError::Downstream(_) => {
                FailureKind::Recognition
            }
            DictationError::Coordination(_)
            | DictationError::Record(_)
            | DictationError::InvalidInput(_)
            | DictationError::Spawn(_) => FailureKind::Coordination,
        }
    }
}

/// Error marker carried by a `final` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ModelUnavailable,
    Device,
    Recognition,
    Coordination,
    /// The worker disappeared without writing a result (found by reconciliation).
    Interrupted,
    /// The worker panicked; the panic was caught at the thread boundary.
    Panic,
}

impl FailureKind {
    /// Short tag used in log lines and CLI output.
    pub fn marker(&self) -> &'static str {
        match self {
            FailureKind::ModelUnavailable => "ModelUnavailable",
            FailureKind::Device => "DeviceError",
            FailureKind::Recognition => "RecognitionError",
            FailureKind::Coordination => "CoordinationError",
            FailureKind::Interrupted => "Interrupted",
            FailureKind::Panic => "Panic",
        }
    }
}

pub type Result<T> = std::result::Result<T, DictationError>;
