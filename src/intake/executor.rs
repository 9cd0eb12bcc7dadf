//! Turn executor: one collaborator call per stage reply.

use std::sync::Arc;
use std::time::Duration;

use crate::error::LlmError;
use crate::llm::{
    ChatMessage, FinishReason, LlmProvider, ToolCompletionRequest, ToolDefinition,
};

use super::message::Message;

/// Token counts for one or more collaborator calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, input_tokens: u32, output_tokens: u32) {
        self.input_tokens += u64::from(input_tokens);
        self.output_tokens += u64::from(output_tokens);
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// A freshly produced assistant message and what it cost.
#[derive(Debug, Clone)]
pub struct ExecutedReply {
    pub message: Message,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Calls the collaborator with a stage's instructions and the transcript.
pub struct TurnExecutor {
    llm: Arc<dyn LlmProvider>,
    tools: Vec<ToolDefinition>,
    temperature: f32,
    max_tokens: u32,
}

impl TurnExecutor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            tools: Vec::new(),
            temperature: 0.0,
            max_tokens: 1024,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.llm
    }

    /// Produce one reply for `instructions` over `history`.
    ///
    /// Fails with the collaborator's error, or `LlmError::Timeout` when the
    /// call outlives `timeout`. Never retried here.
    pub async fn execute(
        &self,
        instructions: &str,
        history: &[Message],
        timeout: Duration,
    ) -> Result<ExecutedReply, LlmError> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(instructions));
        messages.extend(history.iter().map(Message::to_chat_message));

        let request = ToolCompletionRequest::new(messages, self.tools.clone())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let response = tokio::time::timeout(timeout, self.llm.complete_with_tools(request))
            .await
            .map_err(|_| LlmError::Timeout {
                provider: self.llm.model_name().to_string(),
                timeout,
            })??;

        tracing::debug!(
            model = self.llm.model_name(),
            response_id = response.response_id.as_deref().unwrap_or("-"),
            finish_reason = ?response.finish_reason,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            tool_calls = response.tool_calls.len(),
            "Collaborator reply received"
        );
        if response.finish_reason == FinishReason::Length {
            tracing::warn!(
                model = self.llm.model_name(),
                max_tokens = self.max_tokens,
                "Collaborator reply hit the token limit"
            );
        }

        Ok(ExecutedReply {
            message: Message::Assistant {
                text: response.content.unwrap_or_default(),
                tool_calls: response.tool_calls,
            },
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
        })
    }
}
