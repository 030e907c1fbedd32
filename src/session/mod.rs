//! Dictation session management
//!
//! This module provides:
//! - `SessionController`: stateless start/stop/poll operations for callers
//! - `SessionWorker`: the background capture + recognition loop
//! - `WorkerSpawner`: in-process thread or detached process launchers
//! - Session statistics, state machine and result policy

mod cancel;
mod config;
mod controller;
mod probe;
mod spawner;
mod state;
mod stats;
mod transcript;
mod worker;

pub use cancel::CancellationToken;
pub use config::SessionConfig;
pub use controller::{SessionController, StartOutcome};
pub use probe::capture_for;
pub use spawner::{ProcessSpawner, ThreadSpawner, WorkerSpawner};
pub use state::WorkerState;
pub use stats::SessionStats;
pub use transcript::{Transcript, NO_SPEECH};
pub use worker::{SessionWorker, SourceProvider};
