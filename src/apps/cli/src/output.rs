//! Terminal rendering of chat snapshots
//!
//! Snapshots are full state; the printer remembers what it already wrote and
//! only emits the difference.

use chatloom_core::ChatSnapshot;
use chatloom_core_types::{ArtifactStatus, ChatRole, MessagePart, ToolCallStatus};
use std::collections::HashMap;
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintItem {
    Text(String),
    Line(String),
}

#[derive(Debug, Default)]
pub struct StreamPrinter {
    message_id: Option<String>,
    /// Bytes already printed, per part index of the current assistant message.
    printed: HashMap<usize, usize>,
    tool_status: HashMap<String, ToolCallStatus>,
    artifact_status: HashMap<String, ArtifactStatus>,
    at_line_start: bool,
}

impl StreamPrinter {
    pub fn new() -> Self {
        Self {
            at_line_start: true,
            ..Default::default()
        }
    }

    pub fn diff(&mut self, snapshot: &ChatSnapshot) -> Vec<PrintItem> {
        let mut items = Vec::new();

        if let Some(message) = snapshot
            .messages
            .last()
            .filter(|message| message.role == ChatRole::Assistant)
        {
            if self.message_id.as_deref() != Some(message.id.as_str()) {
                self.message_id = Some(message.id.clone());
                self.printed.clear();
            }
            for (index, part) in message.parts.iter().enumerate() {
                let MessagePart::Text { text } = part else {
                    continue;
                };
                let printed = self.printed.entry(index).or_insert(0);
                if text.len() > *printed && text.is_char_boundary(*printed) {
                    items.push(PrintItem::Text(text[*printed..].to_string()));
                    *printed = text.len();
                }
            }
        }

        for (call_id, call) in &snapshot.tool_calls {
            if self.tool_status.get(call_id) == Some(&call.status) {
                continue;
            }
            self.tool_status.insert(call_id.clone(), call.status);
            let name = if call.tool_name.is_empty() {
                "unknown"
            } else {
                call.tool_name.as_str()
            };
            items.push(PrintItem::Line(format!(
                "[tool] {} ({}) {}",
                name,
                call_id,
                tool_status_label(call.status)
            )));
        }

        for (item, status) in snapshot.artifacts.stage_statuses() {
            if self.artifact_status.get(&item.artifact_key) == Some(&status) {
                continue;
            }
            let first_seen = !self.artifact_status.contains_key(&item.artifact_key);
            self.artifact_status.insert(item.artifact_key.clone(), status);
            if first_seen && status == ArtifactStatus::Pending {
                continue;
            }
            items.push(PrintItem::Line(format!(
                "[artifact] {} {}",
                item.name,
                artifact_status_label(status)
            )));
        }

        items
    }

    pub fn print(&mut self, snapshot: &ChatSnapshot) {
        let items = self.diff(snapshot);
        if items.is_empty() {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        for item in items {
            let result = match item {
                PrintItem::Text(text) => {
                    self.at_line_start = text.ends_with('\n');
                    write!(stdout, "{}", text)
                }
                PrintItem::Line(line) => {
                    let prefix = if self.at_line_start { "" } else { "\n" };
                    self.at_line_start = true;
                    writeln!(stdout, "{}{}", prefix, line)
                }
            };
            if let Err(e) = result {
                log::warn!("Failed to write to stdout: {}", e);
                return;
            }
        }
        let _ = stdout.flush();
    }

    /// Terminates a partially printed line.
    pub fn finish(&mut self) {
        if !self.at_line_start {
            println!();
            self.at_line_start = true;
        }
    }
}

fn tool_status_label(status: ToolCallStatus) -> &'static str {
    match status {
        ToolCallStatus::Pending => "running",
        ToolCallStatus::Completed => "done",
    }
}

fn artifact_status_label(status: ArtifactStatus) -> &'static str {
    match status {
        ArtifactStatus::Pending => "pending",
        ArtifactStatus::Generating => "generating",
        ArtifactStatus::Completed => "completed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatloom_core::agentic::chat::ToolCallState;
    use chatloom_core::ArtifactProgress;
    use chatloom_core_types::{ArtifactTemplateItem, ChatMessage};
    use serde_json::json;

    fn snapshot_with_text(id: &str, texts: &[&str]) -> ChatSnapshot {
        let mut message = ChatMessage::assistant(id, 0);
        message.parts = texts.iter().map(|t| MessagePart::text(*t)).collect();
        ChatSnapshot {
            messages: vec![ChatMessage::user("u1", "hi", 0), message],
            ..Default::default()
        }
    }

    #[test]
    fn prints_only_new_text() {
        let mut printer = StreamPrinter::new();
        assert_eq!(
            printer.diff(&snapshot_with_text("a1", &["Hel"])),
            vec![PrintItem::Text("Hel".to_string())]
        );
        assert_eq!(
            printer.diff(&snapshot_with_text("a1", &["Hello"])),
            vec![PrintItem::Text("lo".to_string())]
        );
        assert!(printer.diff(&snapshot_with_text("a1", &["Hello"])).is_empty());
    }

    #[test]
    fn new_assistant_message_restarts_offsets() {
        let mut printer = StreamPrinter::new();
        printer.diff(&snapshot_with_text("a1", &["first"]));
        assert_eq!(
            printer.diff(&snapshot_with_text("a2", &["second"])),
            vec![PrintItem::Text("second".to_string())]
        );
    }

    #[test]
    fn tool_status_changes_print_once() {
        let mut printer = StreamPrinter::new();
        let mut snapshot = ChatSnapshot::default();
        snapshot.tool_calls.insert(
            "c1".to_string(),
            ToolCallState {
                tool_name: "search".to_string(),
                input: json!({}),
                output: None,
                status: ToolCallStatus::Pending,
            },
        );
        assert_eq!(
            printer.diff(&snapshot),
            vec![PrintItem::Line("[tool] search (c1) running".to_string())]
        );
        assert!(printer.diff(&snapshot).is_empty());

        if let Some(call) = snapshot.tool_calls.get_mut("c1") {
            call.status = ToolCallStatus::Completed;
        }
        assert_eq!(
            printer.diff(&snapshot),
            vec![PrintItem::Line("[tool] search (c1) done".to_string())]
        );
    }

    #[test]
    fn initial_pending_artifacts_are_silent() {
        let mut printer = StreamPrinter::new();
        let mut artifacts = ArtifactProgress::new(vec![ArtifactTemplateItem::new(
            "requirements",
            "prd",
            "PRD",
        )]);
        let mut snapshot = ChatSnapshot {
            artifacts: artifacts.clone(),
            ..Default::default()
        };
        assert!(printer.diff(&snapshot).is_empty());

        artifacts.generating = Some("prd".to_string());
        snapshot.artifacts = artifacts;
        assert_eq!(
            printer.diff(&snapshot),
            vec![PrintItem::Line("[artifact] PRD generating".to_string())]
        );
    }
}
