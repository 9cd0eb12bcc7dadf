//! Session state machine. Drives one interview turn at a time.
//!
//! A turn appends the user's message, asks the collaborator for a reply
//! under the current stage's instructions, parses it, and applies the
//! transition policy. Tool-calling replies are acknowledged and re-run
//! within the same turn. All work happens on a draft copy of the session
//! state that replaces the committed state only once the whole turn has
//! succeeded, so a failed or cancelled turn leaves the session untouched.
//!
//! The machine only holds state in memory. Loading it from and saving it
//! to a `StateStore` around each turn is done by `IntakeService`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::IntakeConfig;
use crate::error::IntakeError;
use crate::llm::LlmProvider;

use super::executor::TurnExecutor;
use super::message::Message;
use super::parser::{IntakeResult, parse_reply};
use super::policy::{Transition, decide};
use super::prompts::{TOOL_ACK_TEXT, summary_requirements_tool};
use super::stage::{StageId, StageRegistry};
use super::state::SessionState;
use super::summary::SummaryGenerator;

/// Process-wide, read-only collaborators shared by every session.
pub struct IntakeDeps {
    pub registry: Arc<StageRegistry>,
    pub executor: TurnExecutor,
    pub summarizer: SummaryGenerator,
    /// Default upper bound for each collaborator call.
    pub turn_timeout: Duration,
    /// Tool-acknowledgment detours allowed per turn.
    pub max_tool_round_trips: u32,
}

impl IntakeDeps {
    pub fn new(
        registry: Arc<StageRegistry>,
        llm: Arc<dyn LlmProvider>,
        config: &IntakeConfig,
    ) -> Self {
        let executor = TurnExecutor::new(Arc::clone(&llm))
            .with_tools(vec![summary_requirements_tool()])
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens);
        let summarizer = SummaryGenerator::new(llm).with_max_tokens(config.max_tokens);
        Self {
            registry,
            executor,
            summarizer,
            turn_timeout: config.turn_timeout,
            max_tool_round_trips: config.max_tool_round_trips,
        }
    }
}

/// What one turn produced.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    /// One result per collaborator reply, in order.
    pub results: Vec<IntakeResult>,
    /// Stage after the turn was committed.
    pub stage: StageId,
    pub terminal: bool,
    /// Closing summary, when the chain completed this turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Why the summary could not be produced, if it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_error: Option<String>,
}

/// Owns one session's state and advances it turn by turn.
pub struct SessionStateMachine {
    deps: Arc<IntakeDeps>,
    state: SessionState,
}

impl SessionStateMachine {
    /// Resume a machine over existing state.
    pub fn new(deps: Arc<IntakeDeps>, state: SessionState) -> Self {
        Self { deps, state }
    }

    /// A fresh session on the registry's first stage.
    pub fn start(deps: Arc<IntakeDeps>) -> Self {
        let state = SessionState::new(deps.registry.first());
        Self { deps, state }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn into_state(self) -> SessionState {
        self.state
    }

    /// Process one user message under the default timeout.
    pub async fn advance_turn(&mut self, user_text: &str) -> Result<TurnOutcome, IntakeError> {
        let timeout = self.deps.turn_timeout;
        self.run_turn(Some(user_text), timeout).await
    }

    /// Process one user message with a caller-supplied per-call timeout.
    pub async fn advance_turn_with_timeout(
        &mut self,
        user_text: &str,
        timeout: Duration,
    ) -> Result<TurnOutcome, IntakeError> {
        self.run_turn(Some(user_text), timeout).await
    }

    /// Let the assistant speak first. Only valid before any message exists.
    pub async fn open(&mut self) -> Result<TurnOutcome, IntakeError> {
        if !self.state.history.is_empty() {
            return Err(IntakeError::AlreadyStarted {
                id: self.state.session_id,
            });
        }
        let timeout = self.deps.turn_timeout;
        self.run_turn(None, timeout).await
    }

    async fn run_turn(
        &mut self,
        user_text: Option<&str>,
        timeout: Duration,
    ) -> Result<TurnOutcome, IntakeError> {
        if self.state.terminal {
            return Err(IntakeError::Finished {
                id: self.state.session_id,
            });
        }

        let registry = Arc::clone(&self.deps.registry);
        let session_id = self.state.session_id;
        let mut draft = self.state.clone();
        if let Some(text) = user_text {
            draft.history.push(Message::user(text));
        }

        let mut results = Vec::new();
        let mut detours = 0u32;

        let transition = loop {
            let stage = draft.stage;
            let result = self.reply_on_stage(&mut draft, stage, timeout).await?;
            let status = result.status;
            results.push(result);

            let transition = decide(&registry, draft.stage, draft.last_message(), Some(status))?;
            if transition != Transition::AwaitToolAck {
                break transition;
            }

            acknowledge_tool_calls(&mut draft);
            if detours >= self.deps.max_tool_round_trips {
                warn!(
                    session_id = %session_id,
                    stage = %draft.stage,
                    detours,
                    "Tool round-trip limit reached, ending turn on current stage"
                );
                break Transition::Stay(draft.stage);
            }
            detours += 1;
        };

        let from = draft.stage;
        let mut summary = None;
        let mut summary_error = None;

        match transition {
            Transition::Stay(stage) => {
                draft.stage = stage;
            }
            Transition::Advance(next) => {
                draft.stage = next;
            }
            Transition::Complete => {
                draft.terminal = true;
                match self
                    .deps
                    .summarizer
                    .summarize(&draft.history, &draft.record, timeout)
                    .await
                {
                    Ok(text) => {
                        draft.history.push(Message::Summary { text: text.clone() });
                        summary = Some(text);
                    }
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "Summary generation failed");
                        summary_error = Some(e.to_string());
                    }
                }
            }
            Transition::Halt => {
                if let Some(stop) = registry.stop_stage() {
                    draft.stage = stop.id;
                    let result = self.reply_on_stage(&mut draft, stop.id, timeout).await?;
                    acknowledge_tool_calls(&mut draft);
                    results.push(result);
                }
                draft.terminal = true;
            }
            Transition::Exhausted => {
                draft.terminal = true;
            }
            Transition::AwaitToolAck => {
                // Resolved inside the reply loop.
            }
        }

        info!(
            session_id = %session_id,
            from = %from,
            to = %draft.stage,
            transition = ?transition,
            terminal = draft.terminal,
            replies = results.len(),
            "Turn committed"
        );

        draft.turns += 1;
        draft.updated_at = Utc::now();
        self.state = draft;

        Ok(TurnOutcome {
            results,
            stage: self.state.stage,
            terminal: self.state.terminal,
            summary,
            summary_error,
        })
    }

    /// Ask the collaborator for one reply on `stage` and record it in `draft`.
    async fn reply_on_stage(
        &self,
        draft: &mut SessionState,
        stage: StageId,
        timeout: Duration,
    ) -> Result<IntakeResult, IntakeError> {
        let instructions = &self.deps.registry.lookup(stage)?.instructions;
        let reply = self
            .deps
            .executor
            .execute(instructions, &draft.history, timeout)
            .await?;
        draft.usage.add(reply.input_tokens, reply.output_tokens);

        let parsed = parse_reply(reply.message.text());
        if parsed.validated {
            draft.record = parsed.result.structured_record.clone();
        }
        draft.history.push(reply.message);
        Ok(parsed.result)
    }
}

/// Append one synthetic tool result per call on the latest message.
fn acknowledge_tool_calls(draft: &mut SessionState) {
    let acks: Vec<Message> = draft
        .last_message()
        .map(|m| m.pending_tool_calls())
        .unwrap_or_default()
        .iter()
        .map(|tc| Message::ToolResult {
            tool_call_id: tc.id.clone(),
            tool_name: tc.name.clone(),
            text: TOOL_ACK_TEXT.to_string(),
        })
        .collect();
    draft.history.extend(acks);
}
