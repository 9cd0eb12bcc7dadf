//! Per-session interview state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::executor::TokenUsage;
use super::message::Message;
use super::stage::StageId;

/// Everything carried between turns of one session.
///
/// Only replaced wholesale at the end of a successful turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Uuid,
    /// Full transcript, in the order it is sent to the model.
    pub history: Vec<Message>,
    /// Stage the session is currently on.
    pub stage: StageId,
    /// Whether the session has ended.
    pub terminal: bool,
    /// Latest validated structured record.
    pub record: serde_json::Map<String, serde_json::Value>,
    /// Completed turns.
    pub turns: u32,
    pub usage: TokenUsage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    /// A fresh session on `first_stage` with an empty transcript.
    pub fn new(first_stage: StageId) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            history: Vec::new(),
            stage: first_stage,
            terminal: false,
            record: serde_json::Map::new(),
            turns: 0,
            usage: TokenUsage::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.history.last()
    }
}
