use super::unified::{ArtifactProgressUpdate, StreamEvent};
use serde::Deserialize;
use serde_json::Value;

/// One frame of the current (typed) Data Stream Protocol.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DataStreamFrame {
    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },
    Data {
        #[serde(default)]
        data: Value,
    },
    DataProgress {
        data: ArtifactProgressUpdate,
    },
    #[serde(rename_all = "camelCase")]
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolOutputAvailable {
        tool_call_id: String,
        #[serde(default)]
        output: Value,
    },
    #[serde(rename_all = "camelCase")]
    Finish {
        #[serde(default)]
        message_metadata: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        #[serde(alias = "error", alias = "message")]
        error_text: String,
    },
    // Lifecycle frames that carry nothing the chat core consumes.
    Start,
    StartStep,
    FinishStep,
    ReasoningStart,
    ReasoningDelta,
    ReasoningEnd,
    ToolInputStart,
    ToolInputDelta,
    MessageMetadata,
    #[serde(other)]
    Unknown,
}

impl DataStreamFrame {
    /// Returns `None` for frames the chat core ignores.
    pub fn into_event(self) -> Option<StreamEvent> {
        match self {
            Self::TextStart { id } => Some(StreamEvent::TextStart { id }),
            Self::TextDelta { id, delta } => Some(StreamEvent::TextDelta {
                id: Some(id),
                delta,
            }),
            Self::TextEnd { id } => Some(StreamEvent::TextEnd { id }),
            Self::Data { data } => Some(StreamEvent::Data { data }),
            Self::DataProgress { data } => Some(StreamEvent::Progress(data)),
            Self::ToolInputAvailable {
                tool_call_id,
                tool_name,
                input,
            } => Some(StreamEvent::ToolInputAvailable {
                tool_call_id,
                tool_name,
                input,
            }),
            Self::ToolOutputAvailable {
                tool_call_id,
                output,
            } => Some(StreamEvent::ToolOutputAvailable {
                tool_call_id,
                output,
            }),
            Self::Finish { message_metadata } => Some(StreamEvent::Finish {
                metadata: message_metadata,
            }),
            Self::Error { error_text } => Some(StreamEvent::Error { error_text }),
            Self::Start
            | Self::StartStep
            | Self::FinishStep
            | Self::ReasoningStart
            | Self::ReasoningDelta
            | Self::ReasoningEnd
            | Self::ToolInputStart
            | Self::ToolInputDelta
            | Self::MessageMetadata
            | Self::Unknown => None,
        }
    }
}
