pub mod audio;
pub mod chat;
pub mod config;
pub mod coordination;
pub mod error;
pub mod http;
pub mod recognizer;
pub mod session;

pub use audio::{AudioFile, AudioFrame, FrameSource, FrameSourceFactory, OpenSource, WavFrameSource};
pub use chat::{AnswerService, ChatEntry, ChatHistory, ChatSession, CommandAnswerService};
pub use config::Config;
pub use coordination::{CoordinationChannel, FileChannel, FinalRecord, RecordKey, Reconciler};
pub use error::{DictationError, FailureKind, Result};
pub use http::{create_router, AppState};
pub use recognizer::{HypothesisUpdate, IncrementalRecognizer, ModelLoader, SpeechModel};
pub use session::{
    SessionConfig, SessionController, SessionStats, SessionWorker, StartOutcome, ThreadSpawner,
    WorkerSpawner,
};
