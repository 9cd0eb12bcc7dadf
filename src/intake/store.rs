//! Pluggable session state storage.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::IntakeError;

use super::state::SessionState;

/// Where session state lives between turns.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load a session, or `None` if it does not exist.
    async fn load(&self, session_id: Uuid) -> Result<Option<SessionState>, IntakeError>;

    /// Insert or replace a session.
    async fn save(&self, state: &SessionState) -> Result<(), IntakeError>;
}

/// Process-memory store. Sessions vanish when the process exits.
#[derive(Default)]
pub struct InMemoryStateStore {
    sessions: RwLock<HashMap<Uuid, SessionState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load(&self, session_id: Uuid) -> Result<Option<SessionState>, IntakeError> {
        Ok(self.sessions.read().await.get(&session_id).cloned())
    }

    async fn save(&self, state: &SessionState) -> Result<(), IntakeError> {
        self.sessions
            .write()
            .await
            .insert(state.session_id, state.clone());
        Ok(())
    }
}
