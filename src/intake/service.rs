//! Caller-facing intake API.
//!
//! Loads a session from the store, runs one turn on a state machine, and
//! saves the result. At most one turn per session is in flight; a second
//! concurrent caller gets `IntakeError::Busy` instead of waiting.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::IntakeError;

use super::executor::TokenUsage;
use super::machine::{IntakeDeps, SessionStateMachine, TurnOutcome};
use super::message::Message;
use super::stage::StageId;
use super::state::SessionState;
use super::store::StateStore;

/// Snapshot of a session for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: Uuid,
    pub stage: StageId,
    pub terminal: bool,
    pub turns: u32,
    pub usage: TokenUsage,
    /// Cost of the tokens used so far at the model's list price.
    pub estimated_cost: Decimal,
}

pub struct IntakeService {
    deps: Arc<IntakeDeps>,
    store: Arc<dyn StateStore>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl IntakeService {
    pub fn new(deps: Arc<IntakeDeps>, store: Arc<dyn StateStore>) -> Self {
        Self {
            deps,
            store,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Create a session positioned on the first stage.
    pub async fn create_session(&self) -> Result<Uuid, IntakeError> {
        let state = SessionState::new(self.deps.registry.first());
        self.store.save(&state).await?;
        info!(session_id = %state.session_id, stage = %state.stage, "Session created");
        Ok(state.session_id)
    }

    /// Have the assistant open the conversation before the user speaks.
    pub async fn start_conversation(&self, session_id: Uuid) -> Result<TurnOutcome, IntakeError> {
        let _guard = self.acquire(session_id)?;
        let mut machine = self.load_machine(session_id).await?;
        let outcome = machine.open().await?;
        self.store.save(machine.state()).await?;
        Ok(outcome)
    }

    /// Run one turn under the configured timeout.
    pub async fn advance_turn(
        &self,
        session_id: Uuid,
        user_text: &str,
    ) -> Result<TurnOutcome, IntakeError> {
        self.advance_turn_with_timeout(session_id, user_text, self.deps.turn_timeout)
            .await
    }

    /// Run one turn with a per-call timeout chosen by the caller.
    pub async fn advance_turn_with_timeout(
        &self,
        session_id: Uuid,
        user_text: &str,
        timeout: Duration,
    ) -> Result<TurnOutcome, IntakeError> {
        let _guard = self.acquire(session_id)?;
        let mut machine = self.load_machine(session_id).await?;
        let outcome = machine
            .advance_turn_with_timeout(user_text, timeout)
            .await?;
        self.store.save(machine.state()).await?;
        Ok(outcome)
    }

    pub async fn session_status(&self, session_id: Uuid) -> Result<SessionStatus, IntakeError> {
        let state = self.load(session_id).await?;
        let (input_price, output_price) = self.deps.executor.llm().cost_per_token();
        let estimated_cost = Decimal::from(state.usage.input_tokens) * input_price
            + Decimal::from(state.usage.output_tokens) * output_price;
        Ok(SessionStatus {
            session_id,
            stage: state.stage,
            terminal: state.terminal,
            turns: state.turns,
            usage: state.usage,
            estimated_cost,
        })
    }

    /// Full transcript of a session, including any closing summary.
    pub async fn transcript(&self, session_id: Uuid) -> Result<Vec<Message>, IntakeError> {
        Ok(self.load(session_id).await?.history)
    }

    async fn load(&self, session_id: Uuid) -> Result<SessionState, IntakeError> {
        self.store
            .load(session_id)
            .await?
            .ok_or(IntakeError::SessionNotFound { id: session_id })
    }

    async fn load_machine(&self, session_id: Uuid) -> Result<SessionStateMachine, IntakeError> {
        let state = self.load(session_id).await?;
        Ok(SessionStateMachine::new(Arc::clone(&self.deps), state))
    }

    fn acquire(&self, session_id: Uuid) -> Result<TurnGuard, IntakeError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !in_flight.insert(session_id) {
            debug!(session_id = %session_id, "Rejected concurrent turn");
            return Err(IntakeError::Busy { id: session_id });
        }
        Ok(TurnGuard {
            session_id,
            in_flight: Arc::clone(&self.in_flight),
        })
    }
}

/// Marks a session busy until dropped, including when the turn future is cancelled.
struct TurnGuard {
    session_id: Uuid,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.session_id);
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use secrecy::SecretString;

    use super::*;
    use crate::config::IntakeConfig;
    use crate::error::LlmError;
    use crate::intake::store::InMemoryStateStore;
    use crate::intake::stage::StageRegistry;
    use crate::llm::{
        CompletionRequest, CompletionResponse, FinishReason, LlmProvider, ToolCompletionRequest,
        ToolCompletionResponse,
    };

    struct FixedLlm;

    #[async_trait]
    impl LlmProvider for FixedLlm {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (dec!(0.001), dec!(0.002))
        }
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            unimplemented!("no summaries in these tests")
        }
        async fn complete_with_tools(
            &self,
            _request: ToolCompletionRequest,
        ) -> Result<ToolCompletionResponse, LlmError> {
            Ok(ToolCompletionResponse {
                content: Some(
                    r#"{"reply_text": "go on", "status": "in-progress", "structured_record": {}}"#
                        .into(),
                ),
                tool_calls: vec![],
                input_tokens: 100,
                output_tokens: 10,
                finish_reason: FinishReason::Stop,
                response_id: None,
            })
        }
    }

    fn service() -> IntakeService {
        let registry = StageRegistry::from_ordered([(StageId(1), "one")]).unwrap();
        let config = IntakeConfig::with_api_key(SecretString::from("sk-test"));
        let deps = IntakeDeps::new(Arc::new(registry), Arc::new(FixedLlm), &config);
        IntakeService::new(Arc::new(deps), Arc::new(InMemoryStateStore::new()))
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let svc = service();
        let err = svc.advance_turn(Uuid::new_v4(), "hi").await.unwrap_err();
        assert!(matches!(err, IntakeError::SessionNotFound { .. }));
        assert!(matches!(
            svc.session_status(Uuid::new_v4()).await.unwrap_err(),
            IntakeError::SessionNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn status_reports_usage_and_cost() {
        let svc = service();
        let id = svc.create_session().await.unwrap();
        svc.advance_turn(id, "hi").await.unwrap();

        let status = svc.session_status(id).await.unwrap();
        assert_eq!(status.turns, 1);
        assert_eq!(status.stage, StageId(1));
        assert_eq!(status.usage.input_tokens, 100);
        assert_eq!(status.estimated_cost, dec!(0.120));
        assert_eq!(svc.transcript(id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn held_guard_makes_session_busy() {
        let svc = service();
        let id = svc.create_session().await.unwrap();

        let guard = svc.acquire(id).unwrap();
        let err = svc.advance_turn(id, "hi").await.unwrap_err();
        assert!(matches!(err, IntakeError::Busy { .. }));

        drop(guard);
        assert!(svc.advance_turn(id, "hi").await.is_ok());
    }
}
