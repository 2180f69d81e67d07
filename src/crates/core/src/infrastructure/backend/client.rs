//! HTTP client for the chat backend

use super::types::{MessagesRequest, SessionInfo};
use crate::service::config::ChatClientConfig;
use crate::service::sync::MessageStore;
use crate::util::errors::{ChatloomError, ChatloomResult};
use async_trait::async_trait;
use chatloom_core_types::ChatMessage;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

pub const ASSISTANT_TYPE_HEADER: &str = "X-Assistant-Type";

#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    client: reqwest::Client,
    request_timeout: Duration,
}

impl BackendClient {
    fn build_default_headers(headers: &HashMap<String, String>) -> HeaderMap {
        let mut header_map = HeaderMap::new();

        for (name, value) in headers {
            let Ok(header_name) = HeaderName::from_str(name) else {
                warn!("Invalid HTTP header name in config (skipping): {}", name);
                continue;
            };
            let Ok(header_value) = HeaderValue::from_str(value.trim()) else {
                warn!("Invalid HTTP header value in config (skipping): header={}", name);
                continue;
            };
            header_map.insert(header_name, header_value);
        }

        if !header_map.contains_key(USER_AGENT) {
            header_map.insert(USER_AGENT, HeaderValue::from_static("Chatloom-Client/0.1"));
        }

        header_map
    }

    pub fn new(config: &ChatClientConfig) -> ChatloomResult<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .use_rustls_tls()
            .default_headers(Self::build_default_headers(&config.headers))
            .build()
            .map_err(|e| ChatloomError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            client,
            request_timeout: config.request_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Non-2xx responses become [`ChatloomError::Http`] carrying the body text.
    async fn check_status(response: reqwest::Response) -> ChatloomResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ChatloomError::Http {
            status: status.as_u16(),
            body,
        })
    }

    pub async fn create_session(&self) -> ChatloomResult<SessionInfo> {
        let response = self
            .client
            .post(self.url("/sessions"))
            .timeout(self.request_timeout)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let session: SessionInfo = response
            .json()
            .await
            .map_err(|e| ChatloomError::Decode(format!("Invalid session response: {}", e)))?;
        debug!("Session created: session_id={}", session.id);
        Ok(session)
    }

    /// Opens the reply stream. The returned response body is the data
    /// stream; no overall timeout is applied since replies may be long.
    pub async fn open_message_stream(
        &self,
        session_id: &str,
        assistant_type: &str,
        messages: &[ChatMessage],
    ) -> ChatloomResult<reqwest::Response> {
        let url = self.url(&format!("/sessions/{}/messages/v2/stream", session_id));
        debug!(
            "Opening message stream: session_id={}, assistant_type={}, messages={}",
            session_id,
            assistant_type,
            messages.len()
        );
        let response = self
            .client
            .post(url)
            .header(ASSISTANT_TYPE_HEADER, assistant_type)
            .json(&MessagesRequest { messages })
            .send()
            .await?;
        Self::check_status(response).await
    }

    pub async fn sync_messages(
        &self,
        session_id: &str,
        messages: &[ChatMessage],
    ) -> ChatloomResult<()> {
        let response = self
            .client
            .post(self.url(&format!("/sessions/{}/sync", session_id)))
            .timeout(self.request_timeout)
            .json(&MessagesRequest { messages })
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for BackendClient {
    async fn sync(&self, session_id: &str, messages: &[ChatMessage]) -> ChatloomResult<()> {
        self.sync_messages(session_id, messages).await
    }
}
