//! Agentic layer - chat turns and generated artifacts

pub mod artifacts;
pub mod chat;
