//! Incremental speech recognition
//!
//! A [`SpeechModel`] is loaded once per process; every session asks it for a
//! fresh [`IncrementalRecognizer`] that consumes frames in capture order.

mod utterance;
#[cfg(feature = "whisper")]
mod whisper;

pub use utterance::{Decoder, EndpointConfig, UtteranceRecognizer};
#[cfg(feature = "whisper")]
pub use whisper::{WhisperDecoder, WhisperModel};

use std::sync::Arc;

use crate::audio::AudioFrame;
use crate::config::RecognizerConfig;
use crate::error::{DictationError, Result};

/// Outcome of feeding one frame to a recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HypothesisUpdate {
    /// Unstable hypothesis for the utterance in progress
    Partial(String),
    /// Stable text for a completed utterance; the recognizer starts over
    Final(String),
    NoChange,
}

/// Stateful decoder fed frames strictly in capture order.
///
/// Out-of-order or duplicate frames are a caller bug and are not detected.
pub trait IncrementalRecognizer: Send {
    fn accept(&mut self, frame: &AudioFrame) -> Result<HypothesisUpdate>;

    /// Recognizer name for logging
    fn name(&self) -> &str;
}

/// A loaded acoustic/language model
pub trait SpeechModel: Send + Sync {
    fn create_recognizer(&self, sample_rate: u32) -> Result<Box<dyn IncrementalRecognizer>>;

    fn name(&self) -> &str;
}

/// Builds a recognizer for one session at the given sample rate
pub type RecognizerProvider =
    Arc<dyn Fn(u32) -> Result<Box<dyn IncrementalRecognizer>> + Send + Sync>;

/// Provider handing out recognizers from a loaded model
pub fn model_provider(model: Arc<dyn SpeechModel>) -> RecognizerProvider {
    Arc::new(move |sample_rate| model.create_recognizer(sample_rate))
}

/// Provider that always fails, used when the model could not be loaded so the
/// failure still reaches the session's `final` record.
pub fn unavailable_provider(reason: String) -> RecognizerProvider {
    Arc::new(move |_| Err(DictationError::ModelUnavailable(reason.clone())))
}

pub struct ModelLoader;

impl ModelLoader {
    /// Cheap capability probe: engine compiled in and model file present.
    pub fn probe(config: &RecognizerConfig) -> bool {
        if !cfg!(feature = "whisper") {
            return false;
        }
        config.model_path.is_file()
    }

    /// Load the configured model. Done once at process start.
    pub fn load(config: &RecognizerConfig) -> Result<Arc<dyn SpeechModel>> {
        #[cfg(feature = "whisper")]
        {
            let model = WhisperModel::load(config)?;
            tracing::info!("Speech model loaded: {}", model.name());
            Ok(Arc::new(model))
        }

        #[cfg(not(feature = "whisper"))]
        {
            tracing::warn!(
                model = %config.model_path.display(),
                "No speech engine compiled in; enable the `whisper` feature"
            );
            Err(DictationError::ModelUnavailable(
                "no speech engine compiled in (enable the `whisper` feature)".to_string(),
            ))
        }
    }
}
