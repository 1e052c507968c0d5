//! Evaluation limits, tracing, and cross-thread interruption
//!
//! A [`Context`](crate::Context) checks its configuration at every call
//! (depth limit) and at every backward jump or loop step (interrupt), so a
//! runaway card script can be stopped from the UI thread while it runs on
//! another.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Call depth allowed before `StackOverflow`.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1000;

/// A clonable switch that stops evaluation on every context sharing it.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    /// Ask running evaluations to stop at their next loop step.
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Allow evaluation again.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    /// Whether an interrupt is pending.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Settings of one [`Context`](crate::Context).
#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// Maximum nesting of script and builtin calls. Tail calls do not count.
    pub max_call_depth: usize,

    /// Log every executed instruction at trace level
    pub trace: bool,

    interrupt: InterruptHandle,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            trace: false,
            interrupt: InterruptHandle::default(),
        }
    }
}

impl EvalConfig {
    /// Default limits, tracing off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Default settings with another call depth limit.
    pub fn with_max_call_depth(max_depth: usize) -> Self {
        Self {
            max_call_depth: max_depth,
            ..Self::default()
        }
    }

    /// Turn per-instruction tracing on or off.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Share an interrupt switch, for instance one per open card set.
    pub fn with_interrupt(mut self, handle: InterruptHandle) -> Self {
        self.interrupt = handle;
        self
    }

    /// A handle to hand to the thread that may need to stop evaluation.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Shorthand for `interrupt_handle().interrupt()`.
    pub fn interrupt(&self) {
        self.interrupt.interrupt();
    }

    /// Shorthand for `interrupt_handle().reset()`.
    pub fn reset_interrupt(&self) {
        self.interrupt.reset();
    }

    /// Whether an interrupt is pending.
    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_reaches_every_clone() {
        let config = EvalConfig::new();
        let copy = config.clone();
        let handle = config.interrupt_handle();
        assert!(!copy.is_interrupted());

        std::thread::spawn(move || handle.interrupt()).join().unwrap();
        assert!(config.is_interrupted());
        assert!(copy.is_interrupted());
        copy.reset_interrupt();
        assert!(!config.is_interrupted());
    }

    #[test]
    fn test_shared_handle_between_configs() {
        let handle = InterruptHandle::default();
        let a = EvalConfig::new().with_interrupt(handle.clone());
        let b = EvalConfig::with_max_call_depth(7).with_interrupt(handle.clone());
        handle.interrupt();
        assert!(a.is_interrupted() && b.is_interrupted());
        assert_eq!(b.max_call_depth, 7);
    }

    #[test]
    fn test_defaults() {
        let config = EvalConfig::default().with_trace(true);
        assert_eq!(config.max_call_depth, DEFAULT_MAX_CALL_DEPTH);
        assert!(config.trace);
    }
}
