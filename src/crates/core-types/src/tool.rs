use serde::{Deserialize, Serialize};

pub const ASK_CONFIRMATION_TOOL: &str = "ask_confirmation";

/// Tools the chat core treats specially. Everything else is `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Waits for the user to answer; the frontend submits the result.
    AskConfirmation,
    Other(String),
}

impl ToolKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            ASK_CONFIRMATION_TOOL => Self::AskConfirmation,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn requires_user_result(&self) -> bool {
        match self {
            Self::AskConfirmation => true,
            Self::Other(_) => false,
        }
    }
}
