use tracing::debug;

use super::{HypothesisUpdate, IncrementalRecognizer};
use crate::audio::{convert, AudioFrame};
use crate::error::Result;

/// Turns a buffer of normalized mono samples into text.
///
/// Decoders are stateless between calls; utterance state lives in
/// [`UtteranceRecognizer`].
pub trait Decoder: Send {
    fn decode(&mut self, samples: &[f32], sample_rate: u32) -> Result<String>;
}

/// Energy-based utterance segmentation parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndpointConfig {
    /// RMS level (0.0..1.0) above which a frame counts as speech
    pub speech_threshold: f32,
    /// Silence after speech that closes an utterance
    pub trailing_silence_ms: u64,
    /// Buffered speech between two partial decodes
    pub partial_every_ms: u64,
    /// Utterances are force-finalized at this length
    pub max_utterance_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            speech_threshold: 0.01,
            trailing_silence_ms: 700,
            partial_every_ms: 500,
            max_utterance_ms: 30_000,
        }
    }
}

/// Incremental recognizer built from a whole-buffer [`Decoder`].
///
/// Leading silence is discarded. Once speech starts, samples accumulate and
/// are re-decoded every `partial_every_ms` of audio. Trailing silence (or the
/// utterance length cap) closes the utterance: the buffer is decoded one last
/// time, emitted as `Final`, and all utterance state is cleared.
pub struct UtteranceRecognizer<D> {
    decoder: D,
    config: EndpointConfig,
    sample_rate: u32,
    buffer: Vec<f32>,
    in_speech: bool,
    silence_ms: u64,
    since_partial_ms: u64,
    last_partial: String,
}

impl<D: Decoder> UtteranceRecognizer<D> {
    pub fn new(decoder: D, config: EndpointConfig, sample_rate: u32) -> Self {
        Self {
            decoder,
            config,
            sample_rate,
            buffer: Vec::new(),
            in_speech: false,
            silence_ms: 0,
            since_partial_ms: 0,
            last_partial: String::new(),
        }
    }

    /// Whether an utterance is currently being buffered
    pub fn in_utterance(&self) -> bool {
        self.in_speech
    }

    fn buffered_ms(&self) -> u64 {
        self.buffer.len() as u64 * 1000 / self.sample_rate.max(1) as u64
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.in_speech = false;
        self.silence_ms = 0;
        self.since_partial_ms = 0;
        self.last_partial.clear();
    }

    fn finalize(&mut self) -> Result<HypothesisUpdate> {
        let decoded = self.decoder.decode(&self.buffer, self.sample_rate);
        let buffered_ms = self.buffered_ms();
        self.reset();

        let text = decoded?.trim().to_string();
        debug!(buffered_ms, text_len = text.len(), "Utterance closed");
        if text.is_empty() {
            Ok(HypothesisUpdate::NoChange)
        } else {
            Ok(HypothesisUpdate::Final(text))
        }
    }
}

impl<D: Decoder> IncrementalRecognizer for UtteranceRecognizer<D> {
    fn accept(&mut self, frame: &AudioFrame) -> Result<HypothesisUpdate> {
        let samples = convert::i16_to_f32(&frame.samples);
        let frame_ms = frame.duration_ms();
        let is_speech = convert::rms(&samples) >= self.config.speech_threshold;

        if is_speech {
            self.in_speech = true;
            self.silence_ms = 0;
        } else if self.in_speech {
            self.silence_ms += frame_ms;
        } else {
            return Ok(HypothesisUpdate::NoChange);
        }

        self.buffer.extend_from_slice(&samples);
        self.since_partial_ms += frame_ms;

        if self.silence_ms >= self.config.trailing_silence_ms
            || self.buffered_ms() >= self.config.max_utterance_ms
        {
            return self.finalize();
        }

        if self.since_partial_ms >= self.config.partial_every_ms {
            self.since_partial_ms = 0;
            let text = self.decoder.decode(&self.buffer, self.sample_rate)?.trim().to_string();
            if !text.is_empty() && text != self.last_partial {
                self.last_partial = text.clone();
                return Ok(HypothesisUpdate::Partial(text));
            }
        }

        Ok(HypothesisUpdate::NoChange)
    }

    fn name(&self) -> &str {
        "utterance"
    }
}
