use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    Completed,
}

/// One ordered piece of a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        #[serde(default)]
        input: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
        status: ToolCallStatus,
    },
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Self::ToolCall { tool_call_id, .. } => Some(tool_call_id),
            Self::Text { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
    #[serde(default)]
    pub created_at_ms: i64,
}

impl ChatMessage {
    pub fn user(id: impl Into<String>, text: impl Into<String>, created_at_ms: i64) -> Self {
        Self {
            id: id.into(),
            role: ChatRole::User,
            parts: vec![MessagePart::text(text)],
            created_at_ms,
        }
    }

    pub fn assistant(id: impl Into<String>, created_at_ms: i64) -> Self {
        Self {
            id: id.into(),
            role: ChatRole::Assistant,
            parts: Vec::new(),
            created_at_ms,
        }
    }

    /// Concatenated content of all text parts, in part order.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text { text } => Some(text.as_str()),
                MessagePart::ToolCall { .. } => None,
            })
            .collect()
    }

    pub fn tool_call_part_mut(&mut self, call_id: &str) -> Option<&mut MessagePart> {
        self.parts
            .iter_mut()
            .find(|part| part.tool_call_id() == Some(call_id))
    }
}
