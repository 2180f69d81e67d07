//! Infrastructure layer - talks to the outside world

pub mod backend;

pub use backend::{BackendClient, SessionInfo};
