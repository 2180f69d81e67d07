use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Artifact progress carried by `data-progress` frames (or legacy data
/// elements tagged `"type": "progress"`).
///
/// Every field is optional; absent fields leave the receiver's state alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactProgressUpdate {
    /// Key of the artifact currently being generated.
    #[serde(default)]
    pub generating: Option<String>,
    /// Keys the backend reports as finished.
    #[serde(default)]
    pub completed: Vec<String>,
    /// Final content by artifact key. Content for a key implies completion.
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
    /// Partial content for the artifact named by `generating`.
    #[serde(default)]
    pub artifact_delta: Option<String>,
    /// Workflow stage the backend is working on.
    #[serde(default)]
    pub stage_id: Option<String>,
}

impl ArtifactProgressUpdate {
    pub fn is_empty(&self) -> bool {
        self.generating.is_none()
            && self.completed.is_empty()
            && self.artifacts.is_empty()
            && self.artifact_delta.is_none()
            && self.stage_id.is_none()
    }
}

/// Protocol-independent stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    TextStart {
        id: String,
    },
    /// `id` is `None` for the legacy encoding, which has no part ids.
    TextDelta {
        id: Option<String>,
        delta: String,
    },
    TextEnd {
        id: String,
    },
    Data {
        data: Value,
    },
    Progress(ArtifactProgressUpdate),
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
    ToolOutputAvailable {
        tool_call_id: String,
        output: Value,
    },
    Finish {
        metadata: Option<Value>,
    },
    Error {
        error_text: String,
    },
}

impl StreamEvent {
    /// `finish` and `error` end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish { .. } | Self::Error { .. })
    }

    pub fn error(error_text: impl Into<String>) -> Self {
        Self::Error {
            error_text: error_text.into(),
        }
    }
}
