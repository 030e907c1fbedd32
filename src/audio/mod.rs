pub mod backend;
pub mod convert;
pub mod file;
pub mod queue;

#[cfg(feature = "microphone")]
pub mod microphone;

pub use backend::{AudioFrame, FrameSource, FrameSourceFactory, OpenSource};
pub use file::{AudioFile, WavFrameSource};
pub use queue::{frame_queue, FaultReporter, FrameConsumer, FrameProducer, Next};

#[cfg(feature = "microphone")]
pub use microphone::MicrophoneSource;
