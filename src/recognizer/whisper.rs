//! whisper.cpp decoding via whisper-rs.
//!
//! Whisper only decodes whole buffers, so incremental behavior comes from
//! [`UtteranceRecognizer`] re-decoding the growing utterance buffer.

use std::sync::Arc;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::{Decoder, EndpointConfig, IncrementalRecognizer, SpeechModel, UtteranceRecognizer};
use crate::config::RecognizerConfig;
use crate::error::{DictationError, Result};

pub struct WhisperModel {
    ctx: Arc<WhisperContext>,
    language: String,
    threads: u32,
    endpoint: EndpointConfig,
}

impl WhisperModel {
    pub fn load(config: &RecognizerConfig) -> Result<Self> {
        let model_path = &config.model_path;
        if !model_path.is_file() {
            return Err(DictationError::ModelUnavailable(format!(
                "Whisper model file not found: {}",
                model_path.display()
            )));
        }

        let path = model_path.to_str().ok_or_else(|| {
            DictationError::ModelUnavailable(format!(
                "model path is not valid UTF-8: {}",
                model_path.display()
            ))
        })?;

        tracing::info!(model = %path, lang = %config.language, "Loading Whisper model");

        let ctx = WhisperContext::new_with_params(path, WhisperContextParameters::default())
            .map_err(|e| {
                DictationError::ModelUnavailable(format!("failed to load Whisper model: {}", e))
            })?;

        Ok(Self {
            ctx: Arc::new(ctx),
            language: config.language.clone(),
            threads: config.threads,
            endpoint: config.endpoint(),
        })
    }
}

impl SpeechModel for WhisperModel {
    fn create_recognizer(&self, sample_rate: u32) -> Result<Box<dyn IncrementalRecognizer>> {
        let decoder = WhisperDecoder {
            ctx: Arc::clone(&self.ctx),
            language: self.language.clone(),
            threads: self.threads,
        };
        Ok(Box::new(UtteranceRecognizer::new(decoder, self.endpoint, sample_rate)))
    }

    fn name(&self) -> &str {
        "whisper"
    }
}

pub struct WhisperDecoder {
    ctx: Arc<WhisperContext>,
    language: String,
    threads: u32,
}

impl Decoder for WhisperDecoder {
    fn decode(&mut self, samples: &[f32], sample_rate: u32) -> Result<String> {
        if samples.is_empty() {
            return Ok(String::new());
        }

        let samples_16k;
        let audio = if sample_rate != 16000 {
            samples_16k = crate::audio::convert::resample_linear(samples, sample_rate, 16000);
            &samples_16k[..]
        } else {
            samples
        };

        let mut state = self.ctx.create_state().map_err(|e| {
            DictationError::Recognition(format!("failed to create Whisper state: {}", e))
        })?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        let lang = if self.language == "auto" {
            None
        } else {
            Some(self.language.as_str())
        };
        params.set_language(lang);
        params.set_n_threads(self.threads as i32);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_no_context(true);

        state
            .full(params, audio)
            .map_err(|e| DictationError::Recognition(format!("Whisper inference failed: {}", e)))?;

        let n_segments = state.full_n_segments().map_err(|e| {
            DictationError::Recognition(format!("failed to get segment count: {}", e))
        })?;

        let mut text = String::new();
        for i in 0..n_segments {
            let segment = state.full_get_segment_text(i).map_err(|e| {
                DictationError::Recognition(format!("failed to get segment {} text: {}", i, e))
            })?;
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(segment.trim());
        }

        Ok(text)
    }
}
