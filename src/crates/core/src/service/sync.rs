//! Post-stream sync
//!
//! Persists a finished assistant message. Best effort: a failed sync is logged
//! and dropped, and is never retried.

use crate::util::errors::ChatloomResult;
use async_trait::async_trait;
use chatloom_core_types::ChatMessage;
use log::{debug, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn sync(&self, session_id: &str, messages: &[ChatMessage]) -> ChatloomResult<()>;
}

#[derive(Clone)]
pub struct PostStreamSync {
    store: Arc<dyn MessageStore>,
}

impl PostStreamSync {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// Syncs `message` now; errors are swallowed.
    pub async fn run(&self, session_id: &str, message: ChatMessage) {
        let message_id = message.id.clone();
        match self.store.sync(session_id, &[message]).await {
            Ok(()) => debug!(
                "Message synced: session_id={}, message_id={}",
                session_id, message_id
            ),
            Err(e) => warn!(
                "Message sync failed, keeping local copy: session_id={}, message_id={}, error={}",
                session_id, message_id, e
            ),
        }
    }

    /// Fire-and-forget variant of [`run`](Self::run).
    pub fn spawn(&self, session_id: String, message: ChatMessage) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.run(&session_id, message).await })
    }
}
