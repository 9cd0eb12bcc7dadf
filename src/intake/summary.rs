//! Condenses a finished interview into one summary.

use std::sync::Arc;
use std::time::Duration;

use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, FinishReason, LlmProvider};

use super::message::Message;
use super::prompts::{SUMMARY_TOOL_NAME, summary_prompt};

/// Produces the closing summary via the same collaborator as stage turns.
pub struct SummaryGenerator {
    llm: Arc<dyn LlmProvider>,
    max_tokens: u32,
}

impl SummaryGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            max_tokens: 1024,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Summarize `history`.
    ///
    /// Requirements come from the latest summary-requirements tool call; the
    /// session's structured `record` is used when the model never made one.
    pub async fn summarize(
        &self,
        history: &[Message],
        record: &serde_json::Map<String, serde_json::Value>,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        let messages = summary_messages(history, record);
        let request = CompletionRequest::new(messages)
            .with_max_tokens(self.max_tokens)
            .with_temperature(0.0);

        let response = tokio::time::timeout(timeout, self.llm.complete(request))
            .await
            .map_err(|_| LlmError::Timeout {
                provider: self.llm.model_name().to_string(),
                timeout,
            })??;

        tracing::debug!(
            response_id = response.response_id.as_deref().unwrap_or("-"),
            finish_reason = ?response.finish_reason,
            output_tokens = response.output_tokens,
            "Summary received"
        );
        if response.finish_reason == FinishReason::Length {
            tracing::warn!(max_tokens = self.max_tokens, "Summary hit the token limit");
        }

        Ok(response.content.trim().to_string())
    }
}

/// Summary template followed by the transcript it should cover.
fn summary_messages(
    history: &[Message],
    record: &serde_json::Map<String, serde_json::Value>,
) -> Vec<ChatMessage> {
    let last_call = history.iter().enumerate().rev().find_map(|(i, m)| {
        m.pending_tool_calls()
            .iter()
            .find(|tc| tc.name == SUMMARY_TOOL_NAME)
            .map(|tc| (i, tc.arguments.clone()))
    });

    let (requirements, covered) = match last_call {
        Some((index, arguments)) => (arguments, &history[index + 1..]),
        None => (serde_json::Value::Object(record.clone()), history),
    };

    let mut messages = vec![ChatMessage::system(summary_prompt(&requirements))];
    messages.extend(
        covered
            .iter()
            .filter(|m| matches!(m, Message::User { .. } | Message::Assistant { .. }))
            .filter(|m| m.pending_tool_calls().is_empty())
            .map(Message::to_chat_message),
    );
    messages
}
