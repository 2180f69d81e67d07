use serde::{Deserialize, Serialize};

/// Static mapping from a workflow stage to the document it produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactTemplateItem {
    pub stage_id: String,
    pub artifact_key: String,
    pub name: String,
}

impl ArtifactTemplateItem {
    pub fn new(
        stage_id: impl Into<String>,
        artifact_key: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            stage_id: stage_id.into(),
            artifact_key: artifact_key.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Pending,
    Generating,
    Completed,
}

/// Finds the artifact key produced by `stage_id`.
pub fn artifact_key_for_stage<'a>(
    template: &'a [ArtifactTemplateItem],
    stage_id: &str,
) -> Option<&'a str> {
    template
        .iter()
        .find(|item| item.stage_id == stage_id)
        .map(|item| item.artifact_key.as_str())
}
