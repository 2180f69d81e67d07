//! Artifact progress reducer
//!
//! Tracks which generated documents are pending, generating or completed.
//! Only one artifact generates at a time: a new `generating` key replaces the
//! previous one. Stored content and the explicit `completed` list are both
//! sufficient evidence of completion.

use chatloom_ai_adapters::ArtifactProgressUpdate;
use chatloom_core_types::{ArtifactStatus, ArtifactTemplateItem};
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingArtifact {
    pub key: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactProgress {
    pub template: Vec<ArtifactTemplateItem>,
    pub artifacts: BTreeMap<String, String>,
    pub completed: BTreeSet<String>,
    pub generating: Option<String>,
    pub streaming: Option<StreamingArtifact>,
    pub current_stage_id: Option<String>,
}

impl ArtifactProgress {
    pub fn new(template: Vec<ArtifactTemplateItem>) -> Self {
        Self {
            template,
            ..Default::default()
        }
    }

    pub fn apply(&mut self, update: &ArtifactProgressUpdate) {
        if let Some(stage_id) = update.stage_id.as_ref() {
            self.current_stage_id = Some(stage_id.clone());
        }

        if let Some(key) = update.generating.as_ref() {
            if self.generating.as_deref() != Some(key.as_str()) {
                debug!(
                    "Artifact generation switched: previous={:?}, current={}",
                    self.generating, key
                );
                self.streaming = None;
            }
            self.generating = Some(key.clone());
        }

        if let Some(delta) = update.artifact_delta.as_ref() {
            match self.generating.clone() {
                Some(key) => self
                    .streaming
                    .get_or_insert_with(|| StreamingArtifact {
                        key,
                        content: String::new(),
                    })
                    .content
                    .push_str(delta),
                None => debug!("Ignoring artifact delta without a generating artifact"),
            }
        }

        for (key, content) in &update.artifacts {
            self.artifacts.insert(key.clone(), content.clone());
            self.completed.insert(key.clone());
            if self.streaming.as_ref().map(|s| &s.key) == Some(key) {
                self.streaming = None;
            }
        }

        for key in &update.completed {
            self.completed.insert(key.clone());
        }
    }

    /// Called by the owner when the stream ends for any reason. There may never
    /// be an explicit completion signal for the last artifact.
    pub fn end_stream(&mut self) {
        self.generating = None;
        self.streaming = None;
    }

    pub fn set_template(&mut self, template: Vec<ArtifactTemplateItem>) {
        self.template = template;
    }

    pub fn reset(&mut self) {
        let template = std::mem::take(&mut self.template);
        *self = Self::new(template);
    }

    pub fn active_key(&self) -> Option<&str> {
        self.generating.as_deref()
    }

    pub fn status_of(&self, key: &str) -> ArtifactStatus {
        if self.generating.as_deref() == Some(key) {
            ArtifactStatus::Generating
        } else if self.completed.contains(key) || self.artifacts.contains_key(key) {
            ArtifactStatus::Completed
        } else {
            ArtifactStatus::Pending
        }
    }

    /// Status of every template stage, in template order.
    pub fn stage_statuses(&self) -> Vec<(ArtifactTemplateItem, ArtifactStatus)> {
        self.template
            .iter()
            .map(|item| (item.clone(), self.status_of(&item.artifact_key)))
            .collect()
    }

    pub fn streaming_content(&self) -> &str {
        self.streaming
            .as_ref()
            .map(|s| s.content.as_str())
            .unwrap_or("")
    }
}
