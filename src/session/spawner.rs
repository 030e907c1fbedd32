use std::ffi::OsString;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::{error, info};
use uuid::Uuid;

use super::cancel::CancellationToken;
use super::config::SessionConfig;
use super::worker::{SessionWorker, SourceProvider};
use crate::coordination::{CoordinationChannel, FinalRecord};
use crate::error::{DictationError, Result};
use crate::recognizer::RecognizerProvider;

/// Launches a session worker that outlives the call that started it.
pub trait WorkerSpawner: Send + Sync {
    fn spawn(&self, session_id: Uuid) -> Result<()>;
}

struct RunningWorker {
    session_id: Uuid,
    token: CancellationToken,
    handle: JoinHandle<FinalRecord>,
}

/// Runs each worker on a dedicated thread of the current process.
///
/// Used by the long-lived HTTP daemon and by tests.
pub struct ThreadSpawner {
    channel: Arc<dyn CoordinationChannel>,
    sources: SourceProvider,
    recognizers: RecognizerProvider,
    config: SessionConfig,
    workers: Mutex<Vec<RunningWorker>>,
    spawned: AtomicUsize,
}

impl ThreadSpawner {
    pub fn new(
        channel: Arc<dyn CoordinationChannel>,
        sources: SourceProvider,
        recognizers: RecognizerProvider,
        config: SessionConfig,
    ) -> Self {
        Self {
            channel,
            sources,
            recognizers,
            config,
            workers: Mutex::new(Vec::new()),
            spawned: AtomicUsize::new(0),
        }
    }

    /// Number of workers launched so far
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Wait for every launched worker to exit
    pub fn join_all(&self) -> Vec<FinalRecord> {
        let workers: Vec<RunningWorker> = self.workers().drain(..).collect();
        workers
            .into_iter()
            .filter_map(|worker| match worker.handle.join() {
                Ok(record) => Some(record),
                Err(_) => {
                    error!(session_id = %worker.session_id, "Worker thread panicked outside its boundary");
                    None
                }
            })
            .collect()
    }

    /// Ask every running worker to stop, then wait for them
    pub fn shutdown(&self) -> Vec<FinalRecord> {
        for worker in self.workers().iter() {
            worker.token.cancel();
        }
        self.join_all()
    }

    fn workers(&self) -> MutexGuard<'_, Vec<RunningWorker>> {
        self.workers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl WorkerSpawner for ThreadSpawner {
    fn spawn(&self, session_id: Uuid) -> Result<()> {
        let token = CancellationToken::new(self.channel.clone());
        let worker = SessionWorker::new(
            session_id,
            self.channel.clone(),
            self.sources.clone(),
            self.recognizers.clone(),
            self.config.clone(),
            token.clone(),
        );

        let handle = thread::Builder::new()
            .name("dictation-worker".to_string())
            .spawn(move || worker.run())
            .map_err(|e| DictationError::Spawn(e.to_string()))?;

        let mut workers = self.workers();
        workers.retain(|w| !w.handle.is_finished());
        workers.push(RunningWorker {
            session_id,
            token,
            handle,
        });
        self.spawned.fetch_add(1, Ordering::SeqCst);

        info!(session_id = %session_id, "Worker thread spawned");
        Ok(())
    }
}

/// Re-executes the current binary as a detached `worker` process.
///
/// Used by the one-shot CLI, whose own process exits right after `start`.
pub struct ProcessSpawner {
    program: PathBuf,
    args: Vec<OsString>,
    log_path: Option<PathBuf>,
}

impl ProcessSpawner {
    /// `args` are passed ahead of the `worker` subcommand (e.g. `--config <path>`)
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
            log_path: None,
        }
    }

    pub fn current_exe(args: Vec<OsString>) -> Result<Self> {
        let program = std::env::current_exe()
            .map_err(|e| DictationError::Spawn(format!("cannot locate own executable: {}", e)))?;
        Ok(Self::new(program, args))
    }

    /// Append the worker's stderr to `path`
    pub fn with_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    fn stderr(&self) -> Result<Stdio> {
        match &self.log_path {
            Some(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Ok(Stdio::from(file))
            }
            None => Ok(Stdio::null()),
        }
    }
}

impl WorkerSpawner for ProcessSpawner {
    fn spawn(&self, session_id: Uuid) -> Result<()> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg("worker")
            .arg("--session-id")
            .arg(session_id.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(self.stderr()?)
            .spawn()
            .map_err(|e| {
                DictationError::Spawn(format!("{}: {}", self.program.display(), e))
            })?;

        info!(session_id = %session_id, pid = child.id(), "Worker process spawned");
        Ok(())
    }
}
