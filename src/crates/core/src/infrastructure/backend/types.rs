use chatloom_core_types::ChatMessage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Response of `POST /sessions`. Fields other than `id` are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of both the stream and the sync requests.
#[derive(Debug, Clone, Serialize)]
pub struct MessagesRequest<'a> {
    pub messages: &'a [ChatMessage],
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_info_keeps_extra_fields() {
        let info: SessionInfo =
            serde_json::from_value(json!({"id": "s-1", "title": "New chat"})).expect("valid");
        assert_eq!(info.id, "s-1");
        assert_eq!(info.extra.get("title"), Some(&json!("New chat")));
    }

    #[test]
    fn messages_request_wraps_in_messages_key() {
        let messages = vec![ChatMessage::user("u1", "hi", 0)];
        let body = serde_json::to_value(MessagesRequest { messages: &messages }).expect("json");
        assert_eq!(body["messages"][0]["role"], json!("user"));
        assert_eq!(body["messages"][0]["parts"][0]["text"], json!("hi"));
    }
}
