//! Tool call correlation
//!
//! Tool invocations are keyed by call id, never by position. Input creates or
//! overwrites a pending entry; output completes the entry with the same id, or
//! creates a completed one when the input was never seen.

use chatloom_core_types::{ToolCallStatus, ToolKind};
use indexmap::IndexMap;
use log::debug;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallState {
    pub tool_name: String,
    pub input: Value,
    pub output: Option<Value>,
    pub status: ToolCallStatus,
}

impl ToolCallState {
    pub fn kind(&self) -> ToolKind {
        ToolKind::from_name(&self.tool_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallCorrelator {
    calls: IndexMap<String, ToolCallState>,
}

impl ToolCallCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input_available(&mut self, call_id: &str, tool_name: &str, input: Value) {
        self.calls.insert(
            call_id.to_string(),
            ToolCallState {
                tool_name: tool_name.to_string(),
                input,
                output: None,
                status: ToolCallStatus::Pending,
            },
        );
    }

    pub fn output_available(&mut self, call_id: &str, output: Value) {
        match self.calls.get_mut(call_id) {
            Some(entry) => {
                entry.output = Some(output);
                entry.status = ToolCallStatus::Completed;
            }
            None => {
                debug!(
                    "Tool output without matching input, recording as completed: call_id={}",
                    call_id
                );
                self.calls.insert(
                    call_id.to_string(),
                    ToolCallState {
                        tool_name: String::new(),
                        input: Value::Null,
                        output: Some(output),
                        status: ToolCallStatus::Completed,
                    },
                );
            }
        }
    }

    pub fn get(&self, call_id: &str) -> Option<&ToolCallState> {
        self.calls.get(call_id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Read-only copy in first-seen order.
    pub fn snapshot(&self) -> IndexMap<String, ToolCallState> {
        self.calls.clone()
    }

    /// Moves every entry of `other` into `self`, `other` winning on conflicts.
    pub fn absorb(&mut self, other: ToolCallCorrelator) {
        self.calls.extend(other.calls);
    }

    /// Pending calls that wait for a result from the user.
    pub fn pending_confirmations(&self) -> Vec<(String, ToolCallState)> {
        self.calls
            .iter()
            .filter(|(_, call)| {
                call.status == ToolCallStatus::Pending && call.kind().requires_user_result()
            })
            .map(|(id, call)| (id.clone(), call.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_completes_the_matching_entry() {
        let mut correlator = ToolCallCorrelator::new();
        correlator.input_available("call_1", "search", json!({"q": "rust"}));
        correlator.input_available("call_2", "fetch", json!({}));
        correlator.output_available("call_1", json!(["result"]));

        assert_eq!(correlator.len(), 2);
        let call = correlator.get("call_1").expect("call_1 tracked");
        assert_eq!(call.status, ToolCallStatus::Completed);
        assert_eq!(call.output, Some(json!(["result"])));
        assert_eq!(call.input, json!({"q": "rust"}));
        assert_eq!(
            correlator.get("call_2").map(|c| c.status),
            Some(ToolCallStatus::Pending)
        );
    }

    #[test]
    fn repeated_output_never_duplicates() {
        let mut correlator = ToolCallCorrelator::new();
        correlator.input_available("call_1", "search", json!({}));
        correlator.output_available("call_1", json!(1));
        correlator.output_available("call_1", json!(2));

        assert_eq!(correlator.len(), 1);
        assert_eq!(correlator.get("call_1").and_then(|c| c.output.clone()), Some(json!(2)));
    }

    #[test]
    fn output_without_input_creates_completed_entry() {
        let mut correlator = ToolCallCorrelator::new();
        correlator.output_available("orphan", json!("late"));

        let call = correlator.get("orphan").expect("orphan recorded");
        assert_eq!(call.status, ToolCallStatus::Completed);
        assert!(call.tool_name.is_empty());
    }

    #[test]
    fn input_overwrites_previous_entry() {
        let mut correlator = ToolCallCorrelator::new();
        correlator.input_available("call_1", "search", json!({"q": "a"}));
        correlator.output_available("call_1", json!("done"));
        correlator.input_available("call_1", "search", json!({"q": "b"}));

        let call = correlator.get("call_1").expect("call_1 tracked");
        assert_eq!(call.status, ToolCallStatus::Pending);
        assert_eq!(call.input, json!({"q": "b"}));
        assert!(call.output.is_none());
    }

    #[test]
    fn lists_pending_confirmations_only() {
        let mut correlator = ToolCallCorrelator::new();
        correlator.input_available("c1", "ask_confirmation", json!({"question": "Deploy?"}));
        correlator.input_available("c2", "search", json!({}));
        correlator.input_available("c3", "ask_confirmation", json!({}));
        correlator.output_available("c3", json!({"confirmed": true}));

        let pending = correlator.pending_confirmations();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0, "c1");
    }
}
