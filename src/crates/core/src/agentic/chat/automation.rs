//! Automation bridge
//!
//! Lets an external driver (test harness, browser automation, scripted demo)
//! operate a chat without a process-wide hook. A hook is attached to one
//! runtime explicitly and detached when its registration is dropped.

use super::runtime::{ChatRuntime, ChatSnapshot, RuntimeInner, TurnOutcome};
use crate::util::errors::{ChatloomError, ChatloomResult};
use log::debug;
use std::sync::Weak;

pub trait AutomationHook: Send {
    fn attach(&mut self, handle: AutomationHandle);
    fn detach(&mut self);
}

/// Weak handle to a runtime. Calls fail with `NotFound` once the runtime
/// has been dropped.
#[derive(Clone)]
pub struct AutomationHandle {
    runtime: Weak<RuntimeInner>,
}

impl AutomationHandle {
    pub(crate) fn new(runtime: Weak<RuntimeInner>) -> Self {
        Self { runtime }
    }

    fn runtime(&self) -> ChatloomResult<ChatRuntime> {
        self.runtime
            .upgrade()
            .map(ChatRuntime::from_inner)
            .ok_or_else(|| ChatloomError::not_found("Chat runtime is gone"))
    }

    pub fn is_alive(&self) -> bool {
        self.runtime.strong_count() > 0
    }

    pub async fn send_message(&self, text: impl Into<String>) -> ChatloomResult<TurnOutcome> {
        self.runtime()?.send_message(text).await
    }

    pub async fn stop(&self) -> ChatloomResult<bool> {
        Ok(self.runtime()?.stop().await)
    }

    pub fn snapshot(&self) -> ChatloomResult<ChatSnapshot> {
        Ok(self.runtime()?.snapshot())
    }
}

/// Keeps a hook attached. Dropping it calls [`AutomationHook::detach`].
pub struct AutomationRegistration {
    hook: Option<Box<dyn AutomationHook>>,
}

impl AutomationRegistration {
    pub(crate) fn new(mut hook: Box<dyn AutomationHook>, handle: AutomationHandle) -> Self {
        debug!("Automation hook attached");
        hook.attach(handle);
        Self { hook: Some(hook) }
    }

    pub fn detach(mut self) {
        self.detach_hook();
    }

    fn detach_hook(&mut self) {
        if let Some(mut hook) = self.hook.take() {
            hook.detach();
            debug!("Automation hook detached");
        }
    }
}

impl Drop for AutomationRegistration {
    fn drop(&mut self) {
        self.detach_hook();
    }
}
