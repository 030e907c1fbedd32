// Microphone capture via cpal
//
// cpal streams are not `Send` on every platform, so the stream is built and
// owned by a dedicated driver thread. The data callback converts the device
// format to mono i16 at the target rate and hands it to the frame producer.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

use super::backend::FrameSource;
use super::convert;
use super::queue::FrameProducer;
use crate::error::{DictationError, Result};

pub struct MicrophoneSource {
    device_name: String,
    target_rate: u32,
    stop_tx: Option<mpsc::Sender<()>>,
    driver: Option<JoinHandle<()>>,
}

impl MicrophoneSource {
    /// `device_name` is matched case-insensitively; "default" picks the host default.
    pub fn new(device_name: impl Into<String>, target_rate: u32) -> Self {
        Self {
            device_name: device_name.into(),
            target_rate,
            stop_tx: None,
            driver: None,
        }
    }
}

fn select_device(name: &str) -> Result<cpal::Device> {
    let host = cpal::default_host();

    if name == "default" {
        return host
            .default_input_device()
            .ok_or_else(|| DictationError::Device("no default input device found".to_string()));
    }

    let wanted = name.to_lowercase();
    host.input_devices()
        .map_err(|e| DictationError::Device(format!("failed to enumerate devices: {}", e)))?
        .find(|d| {
            d.name()
                .map(|n| n.to_lowercase().contains(&wanted))
                .unwrap_or(false)
        })
        .ok_or_else(|| DictationError::Device(format!("audio device '{}' not found", name)))
}

fn build_stream(
    device: &cpal::Device,
    mut producer: FrameProducer,
    target_rate: u32,
) -> Result<cpal::Stream> {
    let supported = device
        .default_input_config()
        .map_err(|e| DictationError::Device(format!("failed to query input config: {}", e)))?;

    let device_rate = supported.sample_rate().0;
    let channels = supported.channels();
    let stream_config: cpal::StreamConfig = supported.config();
    let faults = producer.fault_reporter();
    let on_error = move |err: cpal::StreamError| {
        error!("Audio stream error: {}", err);
        faults.report(err.to_string());
    };

    info!(
        device_rate,
        channels,
        target_rate,
        format = ?supported.sample_format(),
        "Opening microphone stream"
    );

    let mut resampler = convert::StreamResampler::new(device_rate, target_rate);
    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mono = convert::downmix_to_mono(data, channels);
                producer.push_samples(&convert::f32_to_i16(&resampler.process(&mono)));
            },
            on_error,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let mono = convert::downmix_to_mono(&convert::i16_to_f32(data), channels);
                producer.push_samples(&convert::f32_to_i16(&resampler.process(&mono)));
            },
            on_error,
            None,
        ),
        other => {
            return Err(DictationError::Device(format!(
                "unsupported sample format: {:?}",
                other
            )))
        }
    }
    .map_err(|e| DictationError::Device(format!("failed to build audio stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| DictationError::Device(format!("failed to start audio stream: {}", e)))?;

    Ok(stream)
}

impl FrameSource for MicrophoneSource {
    fn open(&mut self, producer: FrameProducer) -> Result<()> {
        if self.driver.is_some() {
            return Err(DictationError::Device("microphone already open".to_string()));
        }

        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let device_name = self.device_name.clone();
        let target_rate = self.target_rate;

        let driver = std::thread::Builder::new()
            .name("mic-driver".to_string())
            .spawn(move || {
                let stream = select_device(&device_name)
                    .and_then(|device| build_stream(&device, producer, target_rate));
                match stream {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        // Hold the stream until close() or the source is dropped.
                        let _ = stop_rx.recv();
                        drop(stream);
                        debug!("Microphone stream dropped");
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| DictationError::Device(format!("failed to start driver thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.stop_tx = Some(stop_tx);
                self.driver = Some(driver);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = driver.join();
                Err(e)
            }
            Err(_) => {
                let _ = driver.join();
                Err(DictationError::Device("microphone driver exited during open".to_string()))
            }
        }
    }

    fn close(&mut self) {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        if let Some(driver) = self.driver.take() {
            if driver.join().is_err() {
                warn!("Microphone driver thread panicked");
            }
        }
    }

    fn is_capturing(&self) -> bool {
        self.driver.is_some()
    }

    fn name(&self) -> &str {
        "microphone"
    }
}
