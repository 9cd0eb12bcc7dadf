//! Transcript messages for an intake session.

use serde::{Deserialize, Serialize};

use crate::llm::{ChatMessage, ToolCall};

/// One entry of the conversation transcript.
///
/// The transcript is append-only and its order is exactly what is sent to
/// the model on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// Something the user typed.
    User { text: String },
    /// A model reply. Carries tool calls when the model requested any.
    Assistant {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    /// Synthetic acknowledgment of a tool call.
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        text: String,
    },
    /// Closing summary appended when the chain completes.
    Summary { text: String },
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::User { text }
            | Self::Assistant { text, .. }
            | Self::ToolResult { text, .. }
            | Self::Summary { text } => text,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User { .. })
    }

    /// Tool calls awaiting acknowledgment, if this is a tool-calling reply.
    pub fn pending_tool_calls(&self) -> &[ToolCall] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// Convert into the provider wire message.
    pub fn to_chat_message(&self) -> ChatMessage {
        match self {
            Self::User { text } => ChatMessage::user(text),
            Self::Assistant { text, tool_calls } if tool_calls.is_empty() => {
                ChatMessage::assistant(text)
            }
            Self::Assistant { text, tool_calls } => {
                let content = (!text.is_empty()).then(|| text.clone());
                ChatMessage::assistant_with_tool_calls(content, tool_calls.clone())
            }
            Self::ToolResult {
                tool_call_id,
                text,
                ..
            } => ChatMessage::tool_result(tool_call_id, text),
            Self::Summary { text } => ChatMessage::assistant(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn kind_tag_is_explicit_in_json() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json["kind"], "user");
        assert_eq!(json["text"], "hi");

        let ack = Message::ToolResult {
            tool_call_id: "call_1".into(),
            tool_name: "record_summary_requirements".into(),
            text: "ok".into(),
        };
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json["kind"], "tool_result");
    }

    #[test]
    fn only_assistant_messages_have_pending_tool_calls() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "record_summary_requirements".into(),
            arguments: serde_json::json!({}),
        };
        let reply = Message::Assistant {
            text: String::new(),
            tool_calls: vec![call],
        };
        assert_eq!(reply.pending_tool_calls().len(), 1);
        assert!(Message::user("x").pending_tool_calls().is_empty());
        assert!(Message::assistant("x").pending_tool_calls().is_empty());
    }

    #[test]
    fn wire_roles_follow_variant() {
        assert_eq!(Message::user("a").to_chat_message().role, Role::User);
        assert_eq!(Message::assistant("b").to_chat_message().role, Role::Assistant);
        assert_eq!(
            Message::Summary { text: "c".into() }.to_chat_message().role,
            Role::Assistant
        );
        let ack = Message::ToolResult {
            tool_call_id: "id".into(),
            tool_name: "t".into(),
            text: "d".into(),
        };
        let wire = ack.to_chat_message();
        assert_eq!(wire.role, Role::Tool);
        assert_eq!(wire.tool_call_id.as_deref(), Some("id"));
    }
}
