use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::coordination::atomic_write;
use crate::error::Result;

const TITLE_CHARS: usize = 40;

/// One question/answer exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub question: String,
    /// Answer text, or the failure reason when `is_error`
    pub answer: String,
    pub is_error: bool,
    pub timestamp: DateTime<Utc>,
}

impl ChatEntry {
    pub fn answered(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            is_error: false,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(question: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: reason.into(),
            is_error: true,
            timestamp: Utc::now(),
        }
    }

    /// Short label for list views
    pub fn title(&self) -> String {
        let question = self.question.trim();
        if question.chars().count() <= TITLE_CHARS {
            return question.to_string();
        }
        let head: String = question.chars().take(TITLE_CHARS).collect();
        format!("{}...", head)
    }
}

/// Ordered list of exchanges, oldest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatHistory {
    entries: Vec<ChatEntry>,
}

impl ChatHistory {
    pub fn push(&mut self, entry: ChatEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&ChatEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Load from JSON; a missing file is an empty history
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        atomic_write(path, &json)?;
        Ok(())
    }
}
