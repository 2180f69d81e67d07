//! Message accumulator
//!
//! Folds stream events into the ordered message list. [`reduce`] performs no
//! I/O; the runtime applies events one at a time in arrival order.
//!
//! Delta policy: a delta for an unknown or already closed text id opens a new
//! buffer under that id instead of being dropped. Legacy deltas carry no id and
//! extend the trailing text part of the assistant message.

use super::session::{ChatState, ChatStatus, StreamSession};
use super::tool_calls::ToolCallState;
use crate::util::errors::{ChatloomError, ChatloomResult};
use chatloom_ai_adapters::StreamEvent;
use chatloom_core_types::{ChatMessage, ChatRole, MessagePart, ToolCallStatus};
use indexmap::IndexMap;
use log::{debug, warn};
use serde_json::Value;

/// Applies one stream event to `state`.
pub fn reduce(state: &mut ChatState, event: &StreamEvent) {
    match event {
        StreamEvent::TextStart { id } => state.open_text_buffer(id),
        StreamEvent::TextDelta { id, delta } => state.append_delta(id.as_deref(), delta),
        StreamEvent::TextEnd { id } => {
            if let Some(session) = state.session.as_mut() {
                session.open_buffers.remove(id);
            }
        }
        StreamEvent::ToolInputAvailable {
            tool_call_id,
            tool_name,
            input,
        } => state.tool_input_available(tool_call_id, tool_name, input.clone()),
        StreamEvent::ToolOutputAvailable {
            tool_call_id,
            output,
        } => state.tool_output_available(tool_call_id, output.clone()),
        StreamEvent::Finish { .. } => state.finish_stream(),
        StreamEvent::Error { error_text } => state.fail_stream(error_text),
        // Artifact progress has its own reducer.
        StreamEvent::Data { .. } | StreamEvent::Progress(_) => {}
    }
}

impl ChatState {
    /// Starts a turn: records the user message and opens a stream session whose
    /// assistant message will be `assistant_message_id`.
    pub fn begin_turn(
        &mut self,
        user_message: ChatMessage,
        assistant_message_id: impl Into<String>,
    ) -> ChatloomResult<()> {
        if self.session.is_some() {
            return Err(ChatloomError::validation(
                "A response is still streaming for this chat",
            ));
        }
        if user_message.role != ChatRole::User {
            return Err(ChatloomError::validation("A turn must start with a user message"));
        }
        self.messages.push(user_message);
        self.session = Some(StreamSession::new(assistant_message_id));
        self.status = ChatStatus::Streaming;
        Ok(())
    }

    /// Restarts the latest turn after a failure. Assistant output produced
    /// after the last user message is discarded. Returns the user message
    /// to send again.
    pub fn begin_retry(
        &mut self,
        assistant_message_id: impl Into<String>,
    ) -> ChatloomResult<ChatMessage> {
        if self.session.is_some() {
            return Err(ChatloomError::validation(
                "A response is still streaming for this chat",
            ));
        }
        let user_index = self
            .messages
            .iter()
            .rposition(|message| message.role == ChatRole::User)
            .ok_or_else(|| ChatloomError::not_found("No user message to retry"))?;

        self.messages.truncate(user_index + 1);
        self.session = Some(StreamSession::new(assistant_message_id));
        self.status = ChatStatus::Streaming;
        Ok(self.messages[user_index].clone())
    }

    /// Ends the active stream on caller request, keeping whatever arrived.
    pub fn cancel_stream(&mut self) {
        if self.close_session().is_some() {
            debug!("Stream cancelled, keeping partial assistant message");
            self.status = ChatStatus::Ready;
        }
    }

    pub fn clear_history(&mut self) {
        *self = ChatState::default();
    }

    /// Equivalent to a `tool-output-available` event for `call_id`.
    pub fn submit_tool_result(&mut self, call_id: &str, output: Value) {
        self.tool_output_available(call_id, output);
    }

    /// Messages to send to the backend for the current turn: the whole
    /// history minus the assistant message being streamed.
    pub fn request_messages(&self) -> Vec<ChatMessage> {
        let streaming_id = self.session.as_ref().map(|s| s.message_id.as_str());
        self.messages
            .iter()
            .filter(|message| Some(message.id.as_str()) != streaming_id)
            .cloned()
            .collect()
    }

    /// Tool calls of the whole conversation, in first-seen order.
    pub fn tool_calls(&self) -> IndexMap<String, ToolCallState> {
        let mut calls = self.tool_call_history.snapshot();
        if let Some(session) = self.session.as_ref() {
            calls.extend(session.tool_calls.snapshot());
        }
        calls
    }

    pub fn pending_confirmations(&self) -> Vec<(String, ToolCallState)> {
        let mut merged = self.tool_call_history.clone();
        if let Some(session) = self.session.as_ref() {
            merged.absorb(session.tool_calls.clone());
        }
        merged.pending_confirmations()
    }

    /// Takes the finished assistant message that still needs syncing. Yields
    /// it at most once per turn.
    pub fn take_sync_due(&mut self) -> Option<ChatMessage> {
        let message_id = self.sync_due.take()?;
        self.message(&message_id).cloned()
    }

    fn open_text_buffer(&mut self, id: &str) {
        let Some(index) = self.push_assistant_part(MessagePart::text("")) else {
            return;
        };
        if let Some(session) = self.session.as_mut() {
            session.open_buffers.insert(id.to_string(), index);
        }
    }

    fn append_delta(&mut self, id: Option<&str>, delta: &str) {
        let Some(session) = self.session.as_ref() else {
            warn!("Dropping text delta outside of an active stream");
            return;
        };

        let open_index = id.and_then(|id| session.open_buffers.get(id).copied());
        let index = match (id, open_index) {
            (Some(_), Some(index)) => Some(index),
            (Some(id), None) => {
                debug!("Text delta for unknown buffer, opening a new one: id={}", id);
                self.open_text_buffer(id);
                self.session
                    .as_ref()
                    .and_then(|session| session.open_buffers.get(id).copied())
            }
            (None, _) => self.trailing_text_part_index(),
        };

        let Some(index) = index else {
            return;
        };
        if let Some(MessagePart::Text { text }) = self
            .assistant_message_mut()
            .and_then(|message| message.parts.get_mut(index))
        {
            text.push_str(delta);
        }
        if let Some(session) = self.session.as_mut() {
            session.accumulated_text.push_str(delta);
        }
    }

    /// Index of the trailing text part, opening one if the last part is not text.
    fn trailing_text_part_index(&mut self) -> Option<usize> {
        let last_is_text = self
            .assistant_message_mut()
            .and_then(|message| message.parts.last())
            .map(MessagePart::is_text)
            .unwrap_or(false);
        if last_is_text {
            return self
                .assistant_message_mut()
                .map(|message| message.parts.len() - 1);
        }
        self.push_assistant_part(MessagePart::text(""))
    }

    fn tool_input_available(&mut self, call_id: &str, tool_name: &str, input: Value) {
        let Some(session) = self.session.as_mut() else {
            warn!("Dropping tool input outside of an active stream: call_id={}", call_id);
            return;
        };
        session
            .tool_calls
            .input_available(call_id, tool_name, input.clone());

        let part = MessagePart::ToolCall {
            tool_call_id: call_id.to_string(),
            tool_name: tool_name.to_string(),
            input,
            output: None,
            status: ToolCallStatus::Pending,
        };
        match self
            .assistant_message_mut()
            .and_then(|message| message.tool_call_part_mut(call_id))
        {
            Some(existing) => *existing = part,
            None => {
                self.push_assistant_part(part);
            }
        }
    }

    fn tool_output_available(&mut self, call_id: &str, output: Value) {
        let in_session = self
            .session
            .as_ref()
            .map(|session| session.tool_calls.get(call_id).is_some())
            .unwrap_or(false);
        let in_history = self.tool_call_history.get(call_id).is_some();

        if in_history && !in_session {
            self.tool_call_history
                .output_available(call_id, output.clone());
        } else if let Some(session) = self.session.as_mut() {
            session.tool_calls.output_available(call_id, output.clone());
        } else {
            self.tool_call_history
                .output_available(call_id, output.clone());
        }

        // Update the part in place wherever it lives.
        for message in self.messages.iter_mut().rev() {
            if let Some(MessagePart::ToolCall {
                output: part_output,
                status,
                ..
            }) = message.tool_call_part_mut(call_id)
            {
                *part_output = Some(output);
                *status = ToolCallStatus::Completed;
                return;
            }
        }

        let tool_name = self
            .tool_calls()
            .get(call_id)
            .map(|call| call.tool_name.clone())
            .unwrap_or_default();
        self.push_assistant_part(MessagePart::ToolCall {
            tool_call_id: call_id.to_string(),
            tool_name,
            input: Value::Null,
            output: Some(output),
            status: ToolCallStatus::Completed,
        });
    }

    fn finish_stream(&mut self) {
        if self.session.is_none() {
            warn!("Finish received outside of an active stream");
            return;
        }
        // Every finished turn owns exactly one assistant message, even an empty one.
        self.assistant_message_mut();
        if let Some(session) = self.close_session() {
            self.sync_due = Some(session.message_id);
        }
        self.status = ChatStatus::Ready;
    }

    fn fail_stream(&mut self, error_text: &str) {
        self.close_session();
        self.status = ChatStatus::Error {
            message: error_text.to_string(),
        };
    }

    fn close_session(&mut self) -> Option<StreamSession> {
        let mut session = self.session.take()?;
        session.open_buffers.clear();
        let calls = std::mem::take(&mut session.tool_calls);
        self.tool_call_history.absorb(calls);
        Some(session)
    }

    /// Creates the assistant message for the active turn if needed.
    fn assistant_message_mut(&mut self) -> Option<&mut ChatMessage> {
        let message_id = self.session.as_ref()?.message_id.clone();
        let position = self
            .messages
            .iter()
            .rposition(|message| message.id == message_id);
        let index = match position {
            Some(index) => index,
            None => {
                self.messages
                    .push(ChatMessage::assistant(message_id, crate::util::now_ms()));
                self.messages.len() - 1
            }
        };
        self.messages.get_mut(index)
    }

    fn push_assistant_part(&mut self, part: MessagePart) -> Option<usize> {
        let message = self.assistant_message_mut()?;
        message.parts.push(part);
        Some(message.parts.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatloom_ai_adapters::decode_chunks;
    use serde_json::json;

    fn fold_turn<'a, I>(user_text: &str, assistant_message_id: &str, events: I) -> ChatState
    where
        I: IntoIterator<Item = &'a StreamEvent>,
    {
        let mut state = ChatState::new();
        let user = ChatMessage::user("user-0", user_text, 0);
        if state.begin_turn(user, assistant_message_id).is_ok() {
            for event in events {
                reduce(&mut state, event);
            }
        }
        state
    }

    fn start(id: &str) -> StreamEvent {
        StreamEvent::TextStart { id: id.to_string() }
    }

    fn delta(id: &str, text: &str) -> StreamEvent {
        StreamEvent::TextDelta {
            id: Some(id.to_string()),
            delta: text.to_string(),
        }
    }

    fn finish() -> StreamEvent {
        StreamEvent::Finish { metadata: None }
    }

    fn assistant_text(state: &ChatState) -> String {
        state
            .last_assistant_message()
            .map(ChatMessage::text)
            .unwrap_or_default()
    }

    #[test]
    fn single_turn_produces_one_assistant_message() {
        let events = [start("m1"), delta("m1", "你好"), finish()];
        let state = fold_turn("hi", "a1", &events);

        assert_eq!(state.assistant_messages().count(), 1);
        assert_eq!(assistant_text(&state), "你好");
        assert_eq!(state.status, ChatStatus::Ready);
        assert!(state.session.is_none());
    }

    #[test]
    fn deltas_concatenate_in_arrival_order() {
        let events = [start("m1"), delta("m1", "Hel"), delta("m1", "lo"), delta("m1", "lo")];
        let state = fold_turn("hi", "a1", &events);

        assert_eq!(assistant_text(&state), "Hellolo");
        let session = state.session.as_ref().expect("still streaming");
        assert_eq!(session.accumulated_text, "Hellolo");
    }

    #[test]
    fn delta_for_unknown_id_opens_new_buffer() {
        let events = [start("m1"), delta("m1", "a"), delta("m2", "b"), delta("m1", "c")];
        let state = fold_turn("hi", "a1", &events);

        let message = state.last_assistant_message().expect("assistant message");
        assert_eq!(message.parts, vec![MessagePart::text("ac"), MessagePart::text("b")]);
    }

    #[test]
    fn delta_after_text_end_is_kept() {
        let events = [
            start("m1"),
            delta("m1", "a"),
            StreamEvent::TextEnd { id: "m1".to_string() },
            delta("m1", "b"),
        ];
        let state = fold_turn("hi", "a1", &events);
        assert_eq!(assistant_text(&state), "ab");
    }

    #[test]
    fn tool_output_completes_part_in_place() {
        let events = [
            start("t1"),
            delta("t1", "Looking up"),
            StreamEvent::ToolInputAvailable {
                tool_call_id: "call_1".to_string(),
                tool_name: "search".to_string(),
                input: json!({"q": "rust"}),
            },
            StreamEvent::ToolOutputAvailable {
                tool_call_id: "call_1".to_string(),
                output: json!({"hits": 3}),
            },
            finish(),
        ];
        let state = fold_turn("hi", "a1", &events);

        let message = state.last_assistant_message().expect("assistant message");
        assert_eq!(message.parts.len(), 2);
        match &message.parts[1] {
            MessagePart::ToolCall { status, output, .. } => {
                assert_eq!(*status, ToolCallStatus::Completed);
                assert_eq!(output, &Some(json!({"hits": 3})));
            }
            other => panic!("expected tool call part, got {:?}", other),
        }
        assert_eq!(state.tool_calls().len(), 1);
    }

    #[test]
    fn orphan_tool_output_is_recorded_as_completed() {
        let events = [StreamEvent::ToolOutputAvailable {
            tool_call_id: "ghost".to_string(),
            output: json!("late"),
        }];
        let state = fold_turn("hi", "a1", &events);

        let call = state.tool_calls().get("ghost").cloned().expect("ghost recorded");
        assert_eq!(call.status, ToolCallStatus::Completed);
        let message = state.last_assistant_message().expect("assistant message");
        assert_eq!(message.parts.len(), 1);
    }

    #[test]
    fn submitted_confirmation_result_completes_call() {
        let events = [StreamEvent::ToolInputAvailable {
            tool_call_id: "confirm_1".to_string(),
            tool_name: "ask_confirmation".to_string(),
            input: json!({"question": "Proceed?"}),
        }];
        let mut state = fold_turn("hi", "a1", &events);
        assert_eq!(state.pending_confirmations().len(), 1);

        state.submit_tool_result("confirm_1", json!({"confirmed": true}));
        assert!(state.pending_confirmations().is_empty());
        assert_eq!(state.tool_calls().len(), 1);
    }

    #[test]
    fn confirmation_can_be_answered_after_stream_finished() {
        let events = [
            StreamEvent::ToolInputAvailable {
                tool_call_id: "confirm_1".to_string(),
                tool_name: "ask_confirmation".to_string(),
                input: json!({}),
            },
            finish(),
        ];
        let mut state = fold_turn("hi", "a1", &events);
        assert_eq!(state.pending_confirmations().len(), 1);

        state.submit_tool_result("confirm_1", json!(true));
        assert!(state.pending_confirmations().is_empty());
        let message = state.last_assistant_message().expect("assistant message");
        assert!(matches!(
            message.parts[0],
            MessagePart::ToolCall {
                status: ToolCallStatus::Completed,
                ..
            }
        ));
    }

    #[test]
    fn error_keeps_partial_text() {
        let events = [start("m1"), delta("m1", "partial"), StreamEvent::error("boom")];
        let state = fold_turn("hi", "a1", &events);

        assert_eq!(assistant_text(&state), "partial");
        assert_eq!(
            state.status,
            ChatStatus::Error {
                message: "boom".to_string()
            }
        );
    }

    #[test]
    fn cancel_keeps_partial_text_and_skips_sync() {
        let events = [start("m1"), delta("m1", "part")];
        let mut state = fold_turn("hi", "a1", &events);
        state.cancel_stream();

        assert_eq!(assistant_text(&state), "part");
        assert_eq!(state.status, ChatStatus::Ready);
        assert!(state.take_sync_due().is_none());
    }

    #[test]
    fn sync_is_due_exactly_once_after_finish() {
        let events = [start("m1"), delta("m1", "done"), finish()];
        let mut state = fold_turn("hi", "a1", &events);

        let message = state.take_sync_due().expect("sync due");
        assert_eq!(message.id, "a1");
        assert!(state.take_sync_due().is_none());
    }

    #[test]
    fn empty_reply_still_yields_one_assistant_message() {
        let events = [finish()];
        let mut state = fold_turn("hi", "a1", &events);

        assert_eq!(state.assistant_messages().count(), 1);
        assert_eq!(assistant_text(&state), "");
        assert_eq!(state.status, ChatStatus::Ready);
        let message = state.take_sync_due().expect("sync due");
        assert_eq!(message.id, "a1");
        assert!(message.parts.is_empty());
    }

    #[test]
    fn finish_outside_stream_creates_nothing() {
        let mut state = ChatState::new();
        reduce(&mut state, &finish());

        assert!(state.messages.is_empty());
        assert!(state.take_sync_due().is_none());
    }

    #[test]
    fn retry_discards_failed_output() {
        let events = [start("m1"), delta("m1", "partial"), StreamEvent::error("boom")];
        let mut state = fold_turn("hi", "a1", &events);

        let user = state.begin_retry("a2").expect("retry allowed");
        assert_eq!(user.text(), "hi");
        assert_eq!(state.messages.len(), 1);
        assert!(state.status.is_streaming());

        reduce(&mut state, &start("m1"));
        reduce(&mut state, &delta("m1", "full answer"));
        reduce(&mut state, &finish());
        assert_eq!(assistant_text(&state), "full answer");
        assert_eq!(state.assistant_messages().count(), 1);
    }

    #[test]
    fn second_turn_while_streaming_is_rejected() {
        let mut state = fold_turn("hi", "a1", &[start("m1")]);
        let result = state.begin_turn(ChatMessage::user("u2", "again", 0), "a2");
        assert!(matches!(result, Err(ChatloomError::Validation(_))));
    }

    #[test]
    fn request_messages_exclude_streaming_reply() {
        let state = fold_turn("hi", "a1", &[start("m1"), delta("m1", "x")]);
        let request = state.request_messages();
        assert_eq!(request.len(), 1);
        assert_eq!(request[0].role, ChatRole::User);
    }

    #[test]
    fn malformed_line_between_deltas_does_not_lose_text() {
        let body = concat!(
            "{\"type\":\"text-start\",\"id\":\"m1\"}\n",
            "{\"type\":\"text-delta\",\"id\":\"m1\",\"delta\":\"Hel\"}\n",
            "{\"type\":\"text-delta\",\"id\"\n",
            "{\"type\":\"text-delta\",\"id\":\"m1\",\"delta\":\"lo\"}\n",
            "{\"type\":\"finish\"}\n"
        );
        let events = decode_chunks([body.as_bytes()]);
        let state = fold_turn("hi", "a1", &events);
        assert_eq!(assistant_text(&state), "Hello");
    }

    #[test]
    fn legacy_and_current_encodings_converge() {
        let current = concat!(
            "{\"type\":\"text-start\",\"id\":\"t1\"}\n",
            "{\"type\":\"text-delta\",\"id\":\"t1\",\"delta\":\"Let me \"}\n",
            "{\"type\":\"text-delta\",\"id\":\"t1\",\"delta\":\"check.\"}\n",
            "{\"type\":\"tool-input-available\",\"toolCallId\":\"c1\",\"toolName\":\"search\",\"input\":{\"q\":\"x\"}}\n",
            "{\"type\":\"tool-output-available\",\"toolCallId\":\"c1\",\"output\":[1,2]}\n",
            "{\"type\":\"text-start\",\"id\":\"t2\"}\n",
            "{\"type\":\"text-delta\",\"id\":\"t2\",\"delta\":\"Found 2.\"}\n",
            "{\"type\":\"finish\"}\n"
        );
        let legacy = concat!(
            "0:\"Let me \"\n",
            "0:\"check.\"\n",
            "9:{\"toolCallId\":\"c1\",\"toolName\":\"search\",\"args\":{\"q\":\"x\"}}\n",
            "a:{\"toolCallId\":\"c1\",\"result\":[1,2]}\n",
            "0:\"Found 2.\"\n",
            "d:{\"finishReason\":\"stop\"}\n"
        );

        let mut from_current = fold_turn("hi", "a1", &decode_chunks([current.as_bytes()]));
        let mut from_legacy = fold_turn("hi", "a1", &decode_chunks([legacy.as_bytes()]));

        // Creation timestamps come from the wall clock.
        for state in [&mut from_current, &mut from_legacy] {
            for message in state.messages.iter_mut() {
                message.created_at_ms = 0;
            }
        }
        assert_eq!(from_current.messages, from_legacy.messages);
        assert_eq!(from_current.status, from_legacy.status);
        assert_eq!(from_current.tool_calls(), from_legacy.tool_calls());
    }
}
