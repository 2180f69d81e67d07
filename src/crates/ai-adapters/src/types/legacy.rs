//! Legacy Data Stream Protocol (`<prefix>:<json>` lines)
//!
//! | prefix | meaning     | payload                              |
//! |--------|-------------|--------------------------------------|
//! | `0`    | text delta  | JSON string                          |
//! | `8`    | data        | JSON array                           |
//! | `9`    | tool call   | `{toolCallId, toolName, args}`       |
//! | `a`    | tool result | `{toolCallId, result}`               |
//! | `d`    | finish      | `{finishReason, usage}`              |
//! | `e`    | error       | JSON string or `{message}`/`{error}` |

use super::unified::{ArtifactProgressUpdate, StreamEvent};
use anyhow::{anyhow, Result};
use log::debug;
use serde::Deserialize;
use serde_json::Value;

const PROGRESS_DATA_TYPE: &str = "progress";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyToolCall {
    tool_call_id: String,
    tool_name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyToolResult {
    tool_call_id: String,
    #[serde(default)]
    result: Value,
}

/// Whether `payload` looks like `<prefix>:<json>`.
pub fn is_legacy_frame(payload: &str) -> bool {
    let bytes = payload.as_bytes();
    bytes.len() >= 2
        && bytes[1] == b':'
        && (bytes[0].is_ascii_digit() || bytes[0].is_ascii_lowercase())
}

/// Decodes one legacy frame. Prefixes the chat core does not consume yield
/// an empty list.
pub fn parse_legacy_frame(payload: &str) -> Result<Vec<StreamEvent>> {
    if !is_legacy_frame(payload) {
        return Err(anyhow!("not a legacy frame: {}", payload));
    }
    let (prefix, rest) = payload.split_at(1);
    let body = &rest[1..];

    let events = match prefix {
        "0" => {
            let delta: String = serde_json::from_str(body)?;
            vec![StreamEvent::TextDelta { id: None, delta }]
        }
        "8" => {
            let items: Vec<Value> = serde_json::from_str(body)?;
            items.into_iter().map(data_item_to_event).collect()
        }
        "9" => {
            let call: LegacyToolCall = serde_json::from_str(body)?;
            vec![StreamEvent::ToolInputAvailable {
                tool_call_id: call.tool_call_id,
                tool_name: call.tool_name,
                input: call.args,
            }]
        }
        "a" => {
            let result: LegacyToolResult = serde_json::from_str(body)?;
            vec![StreamEvent::ToolOutputAvailable {
                tool_call_id: result.tool_call_id,
                output: result.result,
            }]
        }
        "d" => {
            let finish: Value = serde_json::from_str(body)?;
            let metadata = match finish {
                Value::Null => None,
                other => Some(other),
            };
            vec![StreamEvent::Finish { metadata }]
        }
        "e" => {
            let error: Value = serde_json::from_str(body)?;
            vec![StreamEvent::error(legacy_error_text(&error))]
        }
        other => {
            debug!("Ignoring legacy data stream frame: prefix={}", other);
            Vec::new()
        }
    };
    Ok(events)
}

fn data_item_to_event(item: Value) -> StreamEvent {
    let is_progress = item.get("type").and_then(Value::as_str) == Some(PROGRESS_DATA_TYPE);
    if is_progress {
        if let Ok(update) = serde_json::from_value::<ArtifactProgressUpdate>(item.clone()) {
            return StreamEvent::Progress(update);
        }
    }
    StreamEvent::Data { data: item }
}

fn legacy_error_text(error: &Value) -> String {
    if let Some(text) = error.as_str() {
        return text.to_string();
    }
    for key in ["message", "error", "errorText"] {
        if let Some(text) = error.get(key).and_then(Value::as_str) {
            return text.to_string();
        }
    }
    error.to_string()
}
