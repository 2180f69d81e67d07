//! Line decoding for the Data Stream Protocol
//!
//! [`decode_line`] handles one complete line. [`DataStreamCodec`] buffers raw
//! bytes until a newline arrives, so a frame split across network chunks (even
//! inside a multi-byte character) is only parsed once it is whole. Malformed
//! lines are logged and skipped; they never end the stream.

use crate::types::data_stream::DataStreamFrame;
use crate::types::legacy::{is_legacy_frame, parse_legacy_frame};
use crate::types::unified::StreamEvent;
use anyhow::{anyhow, Result};
use bytes::BytesMut;
use log::{trace, warn};
use std::collections::VecDeque;
use std::io;
use tokio_util::codec::Decoder;

const SSE_DATA_PREFIX: &str = "data:";
const SSE_DONE_SENTINEL: &str = "[DONE]";
const SSE_FIELD_PREFIXES: [&str; 3] = ["event:", "id:", "retry:"];

/// Decodes one line into zero or more events.
///
/// Blank lines, SSE comments and SSE control fields, the `[DONE]` sentinel and
/// frames the chat core ignores produce an empty list. Lines that cannot be
/// parsed produce an error.
pub fn decode_line(line: &str) -> Result<Vec<StreamEvent>> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() || line.starts_with(':') {
        return Ok(Vec::new());
    }

    let payload = match line.strip_prefix(SSE_DATA_PREFIX) {
        Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
        None => {
            if SSE_FIELD_PREFIXES
                .iter()
                .any(|prefix| line.starts_with(prefix))
            {
                return Ok(Vec::new());
            }
            line
        }
    };

    decode_payload(payload)
}

/// Decodes the payload of one frame, without any SSE wrapping.
pub fn decode_payload(payload: &str) -> Result<Vec<StreamEvent>> {
    let payload = payload.trim();
    if payload.is_empty() || payload == SSE_DONE_SENTINEL {
        return Ok(Vec::new());
    }

    if payload.starts_with('{') {
        let frame: DataStreamFrame = serde_json::from_str(payload)?;
        return Ok(frame.into_event().into_iter().collect());
    }

    if is_legacy_frame(payload) {
        return parse_legacy_frame(payload);
    }

    Err(anyhow!("unrecognized data stream frame"))
}

/// `tokio_util` codec yielding [`StreamEvent`]s from newline-delimited frames.
#[derive(Debug, Default)]
pub struct DataStreamCodec {
    /// Index up to which the buffer is known to hold no newline.
    next_index: usize,
    pending: VecDeque<StreamEvent>,
    skipped_frames: usize,
}

impl DataStreamCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of malformed lines dropped so far.
    pub fn skipped_frames(&self) -> usize {
        self.skipped_frames
    }

    fn process_line(&mut self, raw: &[u8]) {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => {
                self.skipped_frames += 1;
                warn!("Skipping data stream frame with invalid UTF-8: {}", e);
                return;
            }
        };
        trace!("Data stream line: {:?}", line);
        match decode_line(line) {
            Ok(events) => self.pending.extend(events),
            Err(e) => {
                self.skipped_frames += 1;
                warn!("Skipping malformed data stream frame: {}, data: {}", e, line);
            }
        }
    }
}

impl Decoder for DataStreamCodec {
    type Item = StreamEvent;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<StreamEvent>, io::Error> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }

            let newline = buf[self.next_index..]
                .iter()
                .position(|byte| *byte == b'\n')
                .map(|offset| self.next_index + offset);

            match newline {
                Some(index) => {
                    let line = buf.split_to(index + 1);
                    self.next_index = 0;
                    self.process_line(&line[..index]);
                }
                None => {
                    self.next_index = buf.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<StreamEvent>, io::Error> {
        if let Some(event) = self.decode(buf)? {
            return Ok(Some(event));
        }
        if !buf.is_empty() {
            let line = buf.split_to(buf.len());
            self.next_index = 0;
            self.process_line(&line);
        }
        Ok(self.pending.pop_front())
    }
}

/// Runs `chunks` through a fresh [`DataStreamCodec`] as if they had arrived
/// one network read at a time, followed by end of stream.
pub fn decode_chunks<I, B>(chunks: I) -> Vec<StreamEvent>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut codec = DataStreamCodec::new();
    let mut buf = BytesMut::new();
    let mut events = Vec::new();

    for chunk in chunks {
        buf.extend_from_slice(chunk.as_ref());
        while let Ok(Some(event)) = codec.decode(&mut buf) {
            events.push(event);
        }
    }
    while let Ok(Some(event)) = codec.decode_eof(&mut buf) {
        events.push(event);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(id: &str, text: &str) -> StreamEvent {
        StreamEvent::TextDelta {
            id: Some(id.to_string()),
            delta: text.to_string(),
        }
    }

    #[test]
    fn skips_sse_noise() {
        assert!(decode_line("").expect("blank").is_empty());
        assert!(decode_line(": keep-alive").expect("comment").is_empty());
        assert!(decode_line("event: message").expect("event field").is_empty());
        assert!(decode_line("id: 42").expect("id field").is_empty());
        assert!(decode_line("data: [DONE]").expect("done").is_empty());
    }

    #[test]
    fn unwraps_sse_data_lines() {
        assert_eq!(
            decode_line(r#"data: {"type":"text-delta","id":"m1","delta":"hi"}"#).expect("frame"),
            vec![delta("m1", "hi")]
        );
        assert_eq!(
            decode_line(r#"data:0:"hi""#).expect("legacy frame"),
            vec![StreamEvent::TextDelta {
                id: None,
                delta: "hi".to_string()
            }]
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_line("hello world").is_err());
        assert!(decode_line(r#"{"type":"text-delta""#).is_err());
    }

    #[test]
    fn buffers_frame_split_across_chunks() {
        let frame = r#"{"type":"text-delta","id":"m1","delta":"你好"}"#.as_bytes();
        // Split inside the multi-byte sequence of the first character.
        let split = frame
            .iter()
            .position(|byte| *byte >= 0x80)
            .expect("frame contains non-ascii")
            + 1;

        let events = decode_chunks([&frame[..split], &frame[split..], &b"\n"[..]]);
        assert_eq!(events, vec![delta("m1", "你好")]);
    }

    #[test]
    fn decodes_trailing_line_without_newline() {
        let events = decode_chunks([
            r#"{"type":"text-start","id":"m1"}"#.as_bytes(),
            &b"\n{\"type\":\"finish\"}"[..],
        ]);
        assert_eq!(
            events,
            vec![
                StreamEvent::TextStart {
                    id: "m1".to_string()
                },
                StreamEvent::Finish { metadata: None }
            ]
        );
    }

    #[test]
    fn malformed_line_between_deltas_is_skipped() {
        let body = concat!(
            r#"{"type":"text-delta","id":"m1","delta":"Hel"}"#,
            "\n",
            "{not json at all\n",
            r#"{"type":"text-delta","id":"m1","delta":"lo"}"#,
            "\n"
        );

        let mut codec = DataStreamCodec::new();
        let mut buf = BytesMut::from(body.as_bytes());
        let mut events = Vec::new();
        while let Some(event) = codec.decode(&mut buf).expect("decode never fails") {
            events.push(event);
        }

        assert_eq!(events, vec![delta("m1", "Hel"), delta("m1", "lo")]);
        assert_eq!(codec.skipped_frames(), 1);
    }

    #[test]
    fn invalid_utf8_line_is_skipped() {
        let events = decode_chunks([
            &b"0:\"a\"\n"[..],
            &[0xff, 0xfe, b'\n'][..],
            &b"0:\"b\"\n"[..],
        ]);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let events = decode_chunks([&b"0:\"a\"\r\n0:\"b\"\r\n"[..]]);
        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta {
                    id: None,
                    delta: "a".to_string()
                },
                StreamEvent::TextDelta {
                    id: None,
                    delta: "b".to_string()
                },
            ]
        );
    }
}
