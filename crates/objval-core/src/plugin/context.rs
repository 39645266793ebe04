//! Per-invocation execution context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::log::Log;

/// Cooperative cancellation flag shared between a caller and a running job.
///
/// Checked between records and between plugins, never in the middle of a
/// hash computation or tool call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Context handed to exactly one plugin invocation.
///
/// Owns the invocation's diagnostic log and progress string and borrows the
/// caller's push callback for incremental reporting.
pub struct ExecutionContext<'a> {
    pub log: Log,
    progress: String,
    push: Option<&'a mut dyn FnMut(&str)>,
    cancel: CancelToken,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        origin: impl Into<String>,
        push: &'a mut dyn FnMut(&str),
        cancel: CancelToken,
    ) -> Self {
        Self {
            log: Log::new(origin),
            progress: String::new(),
            push: Some(push),
            cancel,
        }
    }

    /// Context without a push target, used for nested calls.
    pub fn detached(origin: impl Into<String>) -> ExecutionContext<'static> {
        ExecutionContext {
            log: Log::new(origin),
            progress: String::new(),
            push: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn set_progress(&mut self, progress: impl Into<String>) {
        self.progress = progress.into();
    }

    pub fn progress(&self) -> &str {
        &self.progress
    }

    /// Forward the current progress string to the caller.
    pub fn push(&mut self) {
        if let Some(push) = self.push.as_deref_mut() {
            push(&self.progress);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Move the accumulated log out, leaving an empty one with the same origin.
    pub fn take_log(&mut self) -> Log {
        let origin = self.log.default_origin().to_string();
        std::mem::replace(&mut self.log, Log::new(origin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::LogLevel;

    #[test]
    fn test_push_forwards_progress() {
        let mut seen = Vec::new();
        let mut push = |msg: &str| seen.push(msg.to_string());
        {
            let mut context = ExecutionContext::new("test", &mut push, CancelToken::new());
            context.set_progress("collecting targets");
            context.push();
            context.set_progress("success");
            context.push();
        }
        assert_eq!(seen, vec!["collecting targets", "success"]);
    }

    #[test]
    fn test_detached_push_is_noop() {
        let mut context = ExecutionContext::detached("test");
        context.set_progress("anything");
        context.push();
        assert_eq!(context.progress(), "anything");
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let mut push = |_: &str| {};
        let context = ExecutionContext::new("test", &mut push, token.clone());
        assert!(!context.is_cancelled());
        token.cancel();
        assert!(context.is_cancelled());
    }

    #[test]
    fn test_take_log_keeps_origin() {
        let mut context = ExecutionContext::detached("Integrity-Plugin");
        context.log.error("boom");
        let log = context.take_log();
        assert_eq!(log.count(LogLevel::Error), 1);
        assert!(context.log.is_empty());
        assert_eq!(context.log.default_origin(), "Integrity-Plugin");
    }
}
