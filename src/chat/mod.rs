//! Bridge from dictated text to the chat collaborator
//!
//! Every exchange, failed or not, lands in the history; collaborator failures
//! never touch dictation session state.

mod history;
mod service;

pub use history::{ChatEntry, ChatHistory};
pub use service::{AnswerService, CommandAnswerService};

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{DictationError, Result};

pub struct ChatSession {
    service: Arc<dyn AnswerService>,
    history: ChatHistory,
    history_path: Option<PathBuf>,
}

impl ChatSession {
    pub fn new(service: Arc<dyn AnswerService>) -> Self {
        Self {
            service,
            history: ChatHistory::default(),
            history_path: None,
        }
    }

    /// Persist the history to `path` after every change, starting from its
    /// current content.
    pub fn with_history_file(mut self, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        self.history = ChatHistory::load(&path)?;
        self.history_path = Some(path);
        Ok(self)
    }

    /// Ask a question and record the exchange.
    ///
    /// Only an empty question is an error; a collaborator failure is returned
    /// as an entry with `is_error` set.
    pub async fn ask(&mut self, question: &str) -> Result<ChatEntry> {
        let entry = Self::answer(self.service.as_ref(), question).await?;
        self.record(entry.clone())?;
        Ok(entry)
    }

    /// Obtain an answer without touching the history.
    ///
    /// Lets callers sharing the session release it while the collaborator
    /// works, then [`record`](Self::record) the entry.
    pub async fn answer(service: &dyn AnswerService, question: &str) -> Result<ChatEntry> {
        let question = question.trim();
        if question.is_empty() {
            return Err(DictationError::InvalidInput("question is empty".to_string()));
        }

        let entry = match service.answer_question(question).await {
            Ok(answer) => ChatEntry::answered(question, answer),
            Err(e) => {
                warn!("Question failed: {}", e);
                ChatEntry::failed(question, e.to_string())
            }
        };
        Ok(entry)
    }

    pub fn record(&mut self, entry: ChatEntry) -> Result<()> {
        info!(is_error = entry.is_error, "Chat exchange recorded: {}", entry.title());
        self.history.push(entry);
        self.persist()
    }

    pub fn service(&self) -> Arc<dyn AnswerService> {
        Arc::clone(&self.service)
    }

    pub async fn is_available(&self) -> bool {
        self.service.is_available().await
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn clear_history(&mut self) -> Result<()> {
        self.history.clear();
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        match &self.history_path {
            Some(path) => self.history.save(path),
            None => Ok(()),
        }
    }
}

/// Collaborator used when no answer command is configured
pub struct UnconfiguredAnswerService;

#[async_trait::async_trait]
impl AnswerService for UnconfiguredAnswerService {
    async fn answer_question(&self, _question: &str) -> Result<String> {
        Err(DictationError::Downstream(
            "no chat command configured (set chat.command)".to_string(),
        ))
    }

    async fn is_available(&self) -> bool {
        false
    }
}
