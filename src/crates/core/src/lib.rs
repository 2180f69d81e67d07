// Chatloom Core Library - streaming chat client logic
// Layers: Util -> Infrastructure -> Service -> Agentic

pub mod agentic; // Chat runtime, reducers, artifacts
pub mod infrastructure; // Backend HTTP client
pub mod service; // Config, post-stream sync
pub mod util; // Errors, helpers

pub use util::errors::*;

pub use agentic::artifacts::{ArtifactProgress, RegenerationPolicy};
pub use agentic::chat::{
    AutomationHandle, AutomationHook, AutomationRegistration, ChatRuntime, ChatSnapshot,
    ChatState, ChatStatus, TurnOutcome,
};
pub use infrastructure::{BackendClient, SessionInfo};
pub use service::{ChatClientConfig, MessageStore, PostStreamSync};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CORE_NAME: &str = "Chatloom Core";
