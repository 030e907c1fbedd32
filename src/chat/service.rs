use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::error::{DictationError, Result};

/// Retrieval/generation collaborator answering dictated questions.
///
/// Answers may take seconds to minutes; failures carry a readable reason.
#[async_trait]
pub trait AnswerService: Send + Sync {
    async fn answer_question(&self, question: &str) -> Result<String>;

    /// Cheap health probe
    async fn is_available(&self) -> bool;
}

/// Answers by running an external program with the question as its last
/// argument; stdout is the answer.
pub struct CommandAnswerService {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandAnswerService {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// `None` when no command is configured
    pub fn from_config(config: &ChatConfig) -> Option<Self> {
        config.command.as_ref().map(|program| {
            Self::new(
                program.clone(),
                config.args.clone(),
                Duration::from_secs(config.timeout_secs),
            )
        })
    }
}

#[async_trait]
impl AnswerService for CommandAnswerService {
    async fn answer_question(&self, question: &str) -> Result<String> {
        debug!(program = %self.program, "Asking collaborator");

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(question)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| collaborator_io_error(&self.program, "cannot run", e))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output
                .map_err(|e| collaborator_io_error(&self.program, "lost contact with", e))?,
            Err(_) => {
                warn!(program = %self.program, "Collaborator timed out");
                return Err(DictationError::Downstream(format!(
                    "{} did not answer within {}s",
                    self.program,
                    self.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(DictationError::Downstream(if stderr.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                stderr
            }));
        }

        let answer = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!(chars = answer.len(), "Collaborator answered");
        Ok(answer)
    }

    async fn is_available(&self) -> bool {
        which(&self.program)
    }
}

/// Collaborator I/O failures are downstream failures, not record I/O
fn collaborator_io_error(program: &str, action: &str, e: std::io::Error) -> DictationError {
    DictationError::Downstream(format!("{} {}: {}", action, program, e))
}

fn which(program: &str) -> bool {
    let path = std::path::Path::new(program);
    if path.components().count() > 1 {
        return path.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}
