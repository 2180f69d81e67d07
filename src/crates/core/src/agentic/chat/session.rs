use super::tool_calls::ToolCallCorrelator;
use chatloom_core_types::{ChatMessage, ChatRole};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChatStatus {
    Idle,
    Streaming,
    Ready,
    /// Partial content stays visible; the turn can be retried.
    Error { message: String },
}

impl ChatStatus {
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }
}

/// Ephemeral per-request state, alive from send until finish, error or cancel.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSession {
    pub message_id: String,
    /// Every text delta of this stream, in arrival order.
    pub accumulated_text: String,
    pub tool_calls: ToolCallCorrelator,
    /// Text part id -> index of the part in the assistant message.
    pub(crate) open_buffers: HashMap<String, usize>,
}

impl StreamSession {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            accumulated_text: String::new(),
            tool_calls: ToolCallCorrelator::new(),
            open_buffers: HashMap::new(),
        }
    }

    pub fn open_buffer_count(&self) -> usize {
        self.open_buffers.len()
    }
}

/// Everything the message accumulator owns.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatState {
    pub messages: Vec<ChatMessage>,
    pub status: ChatStatus,
    pub session: Option<StreamSession>,
    /// Tool calls of finished streams, in first-seen order.
    pub(crate) tool_call_history: ToolCallCorrelator,
    /// Assistant message id waiting for post-stream sync.
    pub(crate) sync_due: Option<String>,
}

impl Default for ChatState {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            status: ChatStatus::Idle,
            session: None,
            tool_call_history: ToolCallCorrelator::new(),
            sync_due: None,
        }
    }
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|message| message.id == id)
    }

    pub fn last_assistant_message(&self) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == ChatRole::Assistant)
    }

    pub fn assistant_messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages
            .iter()
            .filter(|message| message.role == ChatRole::Assistant)
    }
}
