use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CoordinationChannel, RecordKey};
use crate::error::{FailureKind, Result};
use crate::session::SessionStats;

/// Content of the `status` record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub session_id: Uuid,
    /// Process hosting the worker
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    /// Refreshed periodically while recording
    pub heartbeat_at: DateTime<Utc>,
}

impl StatusRecord {
    pub fn new(session_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            pid: std::process::id(),
            started_at: now,
            heartbeat_at: now,
        }
    }
}

/// Content of the `lock` record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Content of the `final` record: the session's one result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalRecord {
    pub session_id: Uuid,
    /// Transcription, sentinel, or readable error text
    pub text: String,
    /// Set when the session ended in failure
    pub error: Option<FailureKind>,
    pub finished_at: DateTime<Utc>,
    pub stats: Option<SessionStats>,
}

impl FinalRecord {
    pub fn success(session_id: Uuid, text: impl Into<String>, stats: Option<SessionStats>) -> Self {
        Self {
            session_id,
            text: text.into(),
            error: None,
            finished_at: Utc::now(),
            stats,
        }
    }

    pub fn failure(
        session_id: Uuid,
        kind: FailureKind,
        text: impl Into<String>,
        stats: Option<SessionStats>,
    ) -> Self {
        Self {
            session_id,
            text: text.into(),
            error: Some(kind),
            finished_at: Utc::now(),
            stats,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

pub fn write_json<T: Serialize>(
    channel: &dyn CoordinationChannel,
    key: RecordKey,
    value: &T,
) -> Result<()> {
    channel.write_value(key, &serde_json::to_string(value)?)
}

pub fn peek_json<T: DeserializeOwned>(
    channel: &dyn CoordinationChannel,
    key: RecordKey,
) -> Result<Option<T>> {
    match channel.peek_value(key)? {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

/// Destructive typed read
pub fn read_json<T: DeserializeOwned>(
    channel: &dyn CoordinationChannel,
    key: RecordKey,
) -> Result<Option<T>> {
    match channel.read_and_clear_value(key)? {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}
