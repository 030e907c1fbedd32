use hound::WavReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::backend::FrameSource;
use super::convert;
use super::queue::FrameProducer;
use crate::error::{DictationError, Result};

/// A decoded WAV file
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).map_err(|e| {
            DictationError::Device(format!("failed to open WAV file {}: {}", path.display(), e))
        })?;

        let spec = reader.spec();
        let samples: Vec<i16> = match spec.sample_format {
            hound::SampleFormat::Int => reader
                .into_samples::<i16>()
                .collect::<std::result::Result<Vec<_>, _>>(),
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
                .collect::<std::result::Result<Vec<_>, _>>(),
        }
        .map_err(|e| DictationError::Device(format!("failed to read audio samples: {}", e)))?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels.max(1) as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Mono i16 samples at `target_rate`
    pub fn to_mono(&self, target_rate: u32) -> Vec<i16> {
        if self.sample_rate == target_rate && self.channels == 1 {
            return self.samples.clone();
        }
        let normalized = convert::i16_to_f32(&self.samples);
        convert::to_mono_i16(&normalized, self.channels, self.sample_rate, target_rate)
    }
}

/// Replays a WAV file as a capture device.
///
/// Frames are pushed from a dedicated thread; once the file is exhausted the
/// source keeps delivering silence at real-time pace, like a microphone in a
/// quiet room, until it is closed.
pub struct WavFrameSource {
    path: PathBuf,
    sample_rate: u32,
    realtime: bool,
    stop: Arc<AtomicBool>,
    driver: Option<JoinHandle<()>>,
}

impl WavFrameSource {
    pub fn new(path: impl Into<PathBuf>, sample_rate: u32, realtime: bool) -> Self {
        Self {
            path: path.into(),
            sample_rate,
            realtime,
            stop: Arc::new(AtomicBool::new(false)),
            driver: None,
        }
    }
}

impl FrameSource for WavFrameSource {
    fn open(&mut self, mut producer: FrameProducer) -> Result<()> {
        if self.driver.is_some() {
            return Err(DictationError::Device("WAV source already open".to_string()));
        }

        let audio = AudioFile::open(&self.path)?;
        let samples = audio.to_mono(self.sample_rate);
        let frame_size = producer.frame_size();
        let frame_period = Duration::from_micros(frame_size as u64 * 1_000_000 / self.sample_rate.max(1) as u64);
        let realtime = self.realtime;
        let stop = Arc::clone(&self.stop);
        stop.store(false, Ordering::SeqCst);

        let driver = std::thread::Builder::new()
            .name("wav-source".to_string())
            .spawn(move || {
                for chunk in samples.chunks(frame_size) {
                    if stop.load(Ordering::SeqCst) {
                        return;
                    }
                    producer.push_samples(chunk);
                    if realtime {
                        std::thread::sleep(frame_period);
                    }
                }
                debug!("WAV source exhausted, delivering silence");

                let silence = vec![0i16; frame_size];
                while !stop.load(Ordering::SeqCst) {
                    producer.push_samples(&silence);
                    std::thread::sleep(frame_period);
                }
            })
            .map_err(|e| DictationError::Device(format!("failed to start WAV driver thread: {}", e)))?;

        self.driver = Some(driver);
        Ok(())
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(driver) = self.driver.take() {
            if driver.join().is_err() {
                warn!("WAV driver thread panicked");
            }
        }
    }

    fn is_capturing(&self) -> bool {
        self.driver.is_some()
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}
