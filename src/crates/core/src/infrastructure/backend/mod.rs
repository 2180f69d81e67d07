pub mod client;
pub mod types;

pub use client::{BackendClient, ASSISTANT_TYPE_HEADER};
pub use types::{MessagesRequest, SessionInfo};
