//! Chat - message accumulation, tool calls and the runtime driving a turn

pub mod accumulator;
pub mod automation;
pub mod runtime;
pub mod session;
pub mod tool_calls;

pub use accumulator::reduce;
pub use automation::{AutomationHandle, AutomationHook, AutomationRegistration};
pub use runtime::{ChatRuntime, ChatSnapshot, TurnOutcome};
pub use session::{ChatState, ChatStatus, StreamSession};
pub use tool_calls::{ToolCallCorrelator, ToolCallState};
