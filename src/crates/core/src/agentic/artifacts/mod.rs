//! Artifacts - documents generated per workflow stage
//!
//! `progress` folds progress events into per-artifact status; `render` decides
//! which content string the artifact panel shows.

pub mod progress;
pub mod render;

pub use progress::{ArtifactProgress, StreamingArtifact};
pub use render::{select_artifact_content, RegenerationPolicy, RenderInput};

impl ArtifactProgress {
    /// Content to display for the given stage selection.
    pub fn rendered_content(
        &self,
        selected_stage_id: Option<&str>,
        policy: RegenerationPolicy,
    ) -> String {
        let input = RenderInput {
            artifacts: &self.artifacts,
            template: &self.template,
            selected_stage_id,
            current_stage_id: self.current_stage_id.as_deref(),
            streaming_content: self.streaming_content(),
            streaming_key: self.streaming.as_ref().map(|s| s.key.as_str()),
        };
        select_artifact_content(&input, policy)
    }
}
