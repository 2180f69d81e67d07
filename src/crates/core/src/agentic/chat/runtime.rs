//! Chat runtime
//!
//! Owns one chat: sends user turns to the backend, consumes the reply stream
//! and fans every event out to the message accumulator and the artifact
//! progress reducer. Subscribers observe state through a `watch` channel.

use super::accumulator::reduce;
use super::automation::{AutomationHandle, AutomationHook, AutomationRegistration};
use super::session::{ChatState, ChatStatus};
use super::tool_calls::ToolCallState;
use crate::agentic::artifacts::{ArtifactProgress, RegenerationPolicy};
use crate::infrastructure::backend::BackendClient;
use crate::service::config::ChatClientConfig;
use crate::service::sync::{MessageStore, PostStreamSync};
use crate::util::errors::{ChatloomError, ChatloomResult};
use crate::util::now_ms;
use chatloom_ai_adapters::{handle_data_stream, StreamEvent, StreamReadOptions};
use chatloom_core_types::{ArtifactTemplateItem, ChatMessage};
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Read-only view published after every state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSnapshot {
    pub session_id: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub status: ChatStatus,
    pub tool_calls: IndexMap<String, ToolCallState>,
    pub artifacts: ArtifactProgress,
    pub selected_stage_id: Option<String>,
    pub rendered_artifact: String,
}

impl Default for ChatSnapshot {
    fn default() -> Self {
        Self {
            session_id: None,
            messages: Vec::new(),
            status: ChatStatus::Idle,
            tool_calls: IndexMap::new(),
            artifacts: ArtifactProgress::default(),
            selected_stage_id: None,
            rendered_artifact: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Finished,
    Failed(String),
    Cancelled,
}

struct RuntimeState {
    chat: ChatState,
    artifacts: ArtifactProgress,
    selected_stage_id: Option<String>,
    session_id: Option<String>,
    cancel_token: Option<CancellationToken>,
    /// Bumped whenever a turn starts or the history is cleared. A turn task
    /// only touches state while the id it started with is still current.
    turn_id: u64,
    pending_syncs: Vec<JoinHandle<()>>,
}

impl RuntimeState {
    fn start_turn(&mut self, cancel_token: CancellationToken) -> u64 {
        self.turn_id += 1;
        self.cancel_token = Some(cancel_token);
        self.turn_id
    }

    fn owns(&self, turn_id: u64) -> bool {
        self.turn_id == turn_id
    }
}

pub(crate) struct RuntimeInner {
    config: ChatClientConfig,
    client: BackendClient,
    sync: PostStreamSync,
    state: Mutex<RuntimeState>,
    snapshot_tx: watch::Sender<ChatSnapshot>,
}

#[derive(Clone)]
pub struct ChatRuntime {
    inner: Arc<RuntimeInner>,
}

impl ChatRuntime {
    pub fn new(config: ChatClientConfig) -> ChatloomResult<Self> {
        let client = BackendClient::new(&config)?;
        let store: Arc<dyn MessageStore> = Arc::new(client.clone());
        Ok(Self::with_store(config, client, store))
    }

    /// Uses `store` for post-stream sync instead of the backend client.
    pub fn with_store(
        config: ChatClientConfig,
        client: BackendClient,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(ChatSnapshot::default());
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                client,
                sync: PostStreamSync::new(store),
                state: Mutex::new(RuntimeState {
                    chat: ChatState::new(),
                    artifacts: ArtifactProgress::default(),
                    selected_stage_id: None,
                    session_id: None,
                    cancel_token: None,
                    turn_id: 0,
                    pending_syncs: Vec::new(),
                }),
                snapshot_tx,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<RuntimeInner>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &ChatClientConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.inner.snapshot_tx.borrow().clone()
    }

    pub async fn session_id(&self) -> Option<String> {
        self.inner.state.lock().await.session_id.clone()
    }

    /// Creates the backend session if this chat has none yet.
    pub async fn ensure_session(&self) -> ChatloomResult<String> {
        if let Some(session_id) = self.session_id().await {
            return Ok(session_id);
        }
        let session = self.inner.client.create_session().await?;
        let mut state = self.inner.state.lock().await;
        state.session_id = Some(session.id.clone());
        self.publish(&state);
        Ok(session.id)
    }

    /// Sends one user message and waits until the reply stream ends.
    ///
    /// Fails with `Validation` when a reply is still streaming. Backend and
    /// stream failures are reported as [`TurnOutcome::Failed`] with the
    /// partial reply kept in the message list.
    pub async fn send_message(&self, text: impl Into<String>) -> ChatloomResult<TurnOutcome> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ChatloomError::validation("Message text must not be empty"));
        }

        let cancel_token = CancellationToken::new();
        let turn_id = {
            let mut state = self.inner.state.lock().await;
            let user_message = ChatMessage::user(new_message_id(), text, now_ms());
            state.chat.begin_turn(user_message, new_message_id())?;
            let turn_id = state.start_turn(cancel_token.clone());
            self.publish(&state);
            turn_id
        };

        Ok(self.drive_turn(turn_id, cancel_token).await)
    }

    /// Sends the last user message again, dropping the reply it got.
    pub async fn retry(&self) -> ChatloomResult<TurnOutcome> {
        let cancel_token = CancellationToken::new();
        let turn_id = {
            let mut state = self.inner.state.lock().await;
            let user_message = state.chat.begin_retry(new_message_id())?;
            debug!("Retrying turn: user_message_id={}", user_message.id);
            let turn_id = state.start_turn(cancel_token.clone());
            self.publish(&state);
            turn_id
        };

        Ok(self.drive_turn(turn_id, cancel_token).await)
    }

    /// Cancels the active stream. Returns false when nothing was streaming.
    pub async fn stop(&self) -> bool {
        let state = self.inner.state.lock().await;
        match state.cancel_token.as_ref() {
            Some(token) => {
                info!("Stopping active stream");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drops every message and artifact of this chat. The backend session and
    /// the artifact template are kept. A reply still streaming is cancelled
    /// and nothing it produces afterwards reaches the cleared chat.
    pub async fn clear_history(&self) {
        let mut state = self.inner.state.lock().await;
        if let Some(token) = state.cancel_token.take() {
            token.cancel();
        }
        state.turn_id += 1;
        state.chat.clear_history();
        state.artifacts.reset();
        state.selected_stage_id = None;
        self.publish(&state);
    }

    /// Records the user's answer to a tool call, e.g. an `ask_confirmation`.
    pub async fn submit_tool_result(&self, tool_call_id: &str, output: Value) -> ChatloomResult<()> {
        let mut state = self.inner.state.lock().await;
        if !state.chat.tool_calls().contains_key(tool_call_id) {
            return Err(ChatloomError::not_found(format!(
                "Tool call not found: {}",
                tool_call_id
            )));
        }
        state.chat.submit_tool_result(tool_call_id, output);
        self.publish(&state);
        Ok(())
    }

    pub async fn pending_confirmations(&self) -> Vec<(String, ToolCallState)> {
        self.inner.state.lock().await.chat.pending_confirmations()
    }

    pub async fn set_artifact_template(&self, template: Vec<ArtifactTemplateItem>) {
        let mut state = self.inner.state.lock().await;
        state.artifacts.set_template(template);
        self.publish(&state);
    }

    /// Selects the stage whose artifact is displayed; `None` follows the
    /// stage the backend currently works on.
    pub async fn select_stage(&self, stage_id: Option<String>) -> ChatloomResult<()> {
        let mut state = self.inner.state.lock().await;
        if let Some(stage_id) = stage_id.as_deref() {
            if !state.artifacts.template.iter().any(|item| item.stage_id == stage_id) {
                return Err(ChatloomError::not_found(format!(
                    "Stage not found: {}",
                    stage_id
                )));
            }
        }
        state.selected_stage_id = stage_id;
        self.publish(&state);
        Ok(())
    }

    pub async fn rendered_artifact(&self) -> String {
        let state = self.inner.state.lock().await;
        self.render(&state)
    }

    /// Waits for post-stream syncs started so far.
    pub async fn flush_sync(&self) {
        let handles = std::mem::take(&mut self.inner.state.lock().await.pending_syncs);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Sync task failed: {}", e);
            }
        }
    }

    /// Hands `hook` a handle to this runtime until the registration is dropped.
    pub fn attach_automation(&self, hook: Box<dyn AutomationHook>) -> AutomationRegistration {
        AutomationRegistration::new(hook, AutomationHandle::new(Arc::downgrade(&self.inner)))
    }

    async fn drive_turn(&self, turn_id: u64, cancel_token: CancellationToken) -> TurnOutcome {
        let opened = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return self.finish_cancelled(turn_id).await,
            opened = self.open_stream() => opened,
        };
        let response = match opened {
            Ok(response) => response,
            Err(e) => {
                let error_text = e.to_string();
                warn!("Failed to open message stream: {}", error_text);
                self.apply_event(turn_id, StreamEvent::error(error_text.clone())).await;
                return TurnOutcome::Failed(error_text);
            }
        };

        let (tx_event, mut rx_event) = mpsc::unbounded_channel();
        let options = StreamReadOptions {
            idle_timeout: self.inner.config.idle_timeout(),
            cancel_token: cancel_token.clone(),
        };
        let reader = tokio::spawn(handle_data_stream(response, tx_event, options));

        let outcome = loop {
            let next = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => None,
                event = rx_event.recv() => event,
            };
            let Some(event) = next else {
                break if cancel_token.is_cancelled() {
                    self.finish_cancelled(turn_id).await
                } else {
                    let error_text = "Data stream ended without a terminal event".to_string();
                    self.apply_event(turn_id, StreamEvent::error(error_text.clone())).await;
                    TurnOutcome::Failed(error_text)
                };
            };

            let outcome = match &event {
                StreamEvent::Finish { .. } => Some(TurnOutcome::Finished),
                StreamEvent::Error { error_text } => Some(TurnOutcome::Failed(error_text.clone())),
                _ => None,
            };
            if !self.apply_event(turn_id, event).await {
                break TurnOutcome::Cancelled;
            }
            if let Some(outcome) = outcome {
                break outcome;
            }
        };

        if let Err(e) = reader.await {
            warn!("Stream reader task failed: {}", e);
        }
        debug!("Turn ended: outcome={:?}", outcome);
        outcome
    }

    async fn open_stream(&self) -> ChatloomResult<reqwest::Response> {
        let session_id = self.ensure_session().await?;
        let messages = self.inner.state.lock().await.chat.request_messages();
        self.inner
            .client
            .open_message_stream(&session_id, &self.inner.config.assistant_type, &messages)
            .await
    }

    /// Returns false when the turn was superseded and the event dropped.
    async fn apply_event(&self, turn_id: u64, event: StreamEvent) -> bool {
        let mut state = self.inner.state.lock().await;
        if !state.owns(turn_id) {
            debug!("Dropping event of a superseded turn: turn_id={}", turn_id);
            return false;
        }
        reduce(&mut state.chat, &event);
        if let StreamEvent::Progress(update) = &event {
            state.artifacts.apply(update);
        }

        if event.is_terminal() {
            state.artifacts.end_stream();
            state.cancel_token = None;
            if let Some(message) = state.chat.take_sync_due() {
                match state.session_id.clone() {
                    Some(session_id) => {
                        let handle = self.inner.sync.spawn(session_id, message);
                        state.pending_syncs.retain(|pending| !pending.is_finished());
                        state.pending_syncs.push(handle);
                    }
                    None => warn!("Finished message has no session to sync to"),
                }
            }
        }
        self.publish(&state);
        true
    }

    async fn finish_cancelled(&self, turn_id: u64) -> TurnOutcome {
        let mut state = self.inner.state.lock().await;
        if !state.owns(turn_id) {
            return TurnOutcome::Cancelled;
        }
        state.chat.cancel_stream();
        state.artifacts.end_stream();
        state.cancel_token = None;
        self.publish(&state);
        TurnOutcome::Cancelled
    }

    fn render(&self, state: &RuntimeState) -> String {
        let policy: RegenerationPolicy = self.inner.config.regeneration_policy;
        state
            .artifacts
            .rendered_content(state.selected_stage_id.as_deref(), policy)
    }

    fn publish(&self, state: &RuntimeState) {
        let snapshot = ChatSnapshot {
            session_id: state.session_id.clone(),
            messages: state.chat.messages.clone(),
            status: state.chat.status.clone(),
            tool_calls: state.chat.tool_calls(),
            artifacts: state.artifacts.clone(),
            selected_stage_id: state.selected_stage_id.clone(),
            rendered_artifact: self.render(state),
        };
        self.inner.snapshot_tx.send_replace(snapshot);
    }
}

fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
