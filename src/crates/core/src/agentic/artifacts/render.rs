use chatloom_core_types::{artifact_key_for_stage, ArtifactTemplateItem};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What to show while an artifact that already has content is regenerated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegenerationPolicy {
    /// Keep showing the stored version until the new one is complete.
    #[default]
    PreferStored,
    /// Always show the live stream.
    PreferLive,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderInput<'a> {
    pub artifacts: &'a BTreeMap<String, String>,
    pub template: &'a [ArtifactTemplateItem],
    pub selected_stage_id: Option<&'a str>,
    pub current_stage_id: Option<&'a str>,
    pub streaming_content: &'a str,
    pub streaming_key: Option<&'a str>,
}

/// Picks the artifact content to display. Pure: equal inputs give equal output.
///
/// The displayed stage is the selected one, else the current one. Live stream
/// content is shown unless it names an artifact other than the displayed one.
/// A displayed stage without a template entry has nothing stored, so any
/// live stream is shown for it.
pub fn select_artifact_content(input: &RenderInput<'_>, policy: RegenerationPolicy) -> String {
    let key = input
        .selected_stage_id
        .or(input.current_stage_id)
        .and_then(|stage_id| artifact_key_for_stage(input.template, stage_id));

    let stored = key
        .and_then(|key| input.artifacts.get(key))
        .filter(|content| !content.is_empty());

    let stream_matches = match (input.streaming_key, key) {
        (None, _) => true,
        (Some(streaming_key), Some(key)) => streaming_key == key,
        (Some(_), None) => true,
    };

    if !input.streaming_content.is_empty() && stream_matches {
        return match (policy, stored) {
            (RegenerationPolicy::PreferStored, Some(stored)) => stored.clone(),
            _ => input.streaming_content.to_string(),
        };
    }

    stored.cloned().unwrap_or_default()
}
