use tracing::info;

use super::queue::FrameProducer;
use crate::config::{AudioConfig, SourceKind};
use crate::error::{DictationError, Result};

/// Fixed-size block of mono 16-bit PCM
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, mono)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Position in delivery order, starting at 0
    pub sequence: u64,
    /// Milliseconds since the source was opened
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Duration covered by this frame in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// Capture device contract.
///
/// `open` starts delivering frames into the producer from a driver-owned
/// thread and returns once the device is acquired. Delivery must never block
/// the driver thread.
///
/// Implementations:
/// - `MicrophoneSource`: cpal input stream (`microphone` feature)
/// - `WavFrameSource`: replays a WAV file as if it were a live device
pub trait FrameSource: Send {
    /// Acquire the device and start capturing
    fn open(&mut self, producer: FrameProducer) -> Result<()>;

    /// Release the device. Must be safe to call more than once.
    fn close(&mut self);

    /// Check if the source is currently capturing
    fn is_capturing(&self) -> bool;

    /// Source name for logging
    fn name(&self) -> &str;
}

/// Scoped acquisition of a [`FrameSource`].
///
/// The device is closed when the guard is dropped, so every exit path of the
/// owning scope releases it, including `?` returns and unwinding.
pub struct OpenSource {
    source: Box<dyn FrameSource>,
}

impl OpenSource {
    pub fn open(mut source: Box<dyn FrameSource>, producer: FrameProducer) -> Result<Self> {
        source.open(producer)?;
        info!("Capture source opened: {}", source.name());
        Ok(Self { source })
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }
}

impl Drop for OpenSource {
    fn drop(&mut self) {
        self.source.close();
        info!("Capture source closed: {}", self.source.name());
    }
}

/// Builds the capture source selected in configuration
pub struct FrameSourceFactory;

impl FrameSourceFactory {
    pub fn create(config: &AudioConfig) -> Result<Box<dyn FrameSource>> {
        match config.source {
            SourceKind::Microphone => {
                #[cfg(feature = "microphone")]
                {
                    use super::microphone::MicrophoneSource;
                    Ok(Box::new(MicrophoneSource::new(
                        config.device.clone(),
                        config.sample_rate,
                    )))
                }

                #[cfg(not(feature = "microphone"))]
                {
                    tracing::warn!("Microphone capture requested but the `microphone` feature is disabled");
                    Err(DictationError::Device(
                        "microphone capture requires the `microphone` feature".to_string(),
                    ))
                }
            }

            SourceKind::File => {
                let path = config.file_path.clone().ok_or_else(|| {
                    DictationError::Device("audio.file_path is not set".to_string())
                })?;
                Ok(Box::new(super::file::WavFrameSource::new(
                    path,
                    config.sample_rate,
                    config.realtime,
                )))
            }
        }
    }
}
