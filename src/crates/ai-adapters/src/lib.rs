//! Chatloom AI adapters
//!
//! Turns a streamed HTTP body speaking the Vercel AI SDK Data Stream Protocol
//! (current typed frames, or the legacy `<prefix>:<json>` encoding) into a
//! sequence of [`StreamEvent`]s.

pub mod decoder;
pub mod stream_handler;
pub mod types;

pub use decoder::{decode_chunks, decode_line, DataStreamCodec};
pub use stream_handler::{handle_data_stream, pump_data_stream, StreamReadOptions};
pub use types::unified::{ArtifactProgressUpdate, StreamEvent};
