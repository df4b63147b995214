//! Session lifecycle state machine.
//!
//! ```text
//! UNINITIALIZED -> INITIALIZING -> READY <-> BUSY -> (READY | ERROR)
//! * -> TERMINATING -> TERMINATED
//! ```
//!
//! `TERMINATING`/`TERMINATED` are reachable from any state — a client can
//! disconnect mid-`initialize`, mid-operation, or from `ERROR`.

use crate::error::DapperError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Ready,
    Busy,
    Error,
    Terminating,
    Terminated,
}

impl LifecycleState {
    fn name(self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "UNINITIALIZED",
            LifecycleState::Initializing => "INITIALIZING",
            LifecycleState::Ready => "READY",
            LifecycleState::Busy => "BUSY",
            LifecycleState::Error => "ERROR",
            LifecycleState::Terminating => "TERMINATING",
            LifecycleState::Terminated => "TERMINATED",
        }
    }
}

type CleanupHook = Box<dyn FnOnce() + Send>;

/// The session's lifecycle, plus a stack of cleanup callbacks run in reverse
/// registration order on termination (last acquired, first released).
pub struct Lifecycle {
    state: Mutex<LifecycleState>,
    cleanup: Mutex<Vec<CleanupHook>>,
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self { state: Mutex::new(LifecycleState::Uninitialized), cleanup: Mutex::new(Vec::new()) }
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.lock().expect("lifecycle mutex poisoned")
    }

    pub fn register_cleanup(&self, hook: CleanupHook) {
        self.cleanup.lock().expect("lifecycle mutex poisoned").push(hook);
    }

    pub fn begin_initialize(&self) -> Result<(), DapperError> {
        self.transition(LifecycleState::Uninitialized, LifecycleState::Initializing)
    }

    pub fn finish_initialize(&self) -> Result<(), DapperError> {
        self.transition(LifecycleState::Initializing, LifecycleState::Ready)
    }

    /// Acquires `BUSY` from `READY` for the duration of one operation. The
    /// returned guard transitions back to `READY` on drop, or to `ERROR` if
    /// [`OperationGuard::mark_failed`] was called first.
    pub fn operation_context<'a>(&'a self, name: &str) -> Result<OperationGuard<'a>, DapperError> {
        self.transition(LifecycleState::Ready, LifecycleState::Busy)?;
        Ok(OperationGuard { lifecycle: self, name: name.to_string(), failed: AtomicBool::new(false) })
    }

    /// Recovers from `ERROR` back to `READY`, e.g. after a failed operation
    /// has been retried successfully. The only other way out of `ERROR` is
    /// termination.
    pub fn recover(&self) -> Result<(), DapperError> {
        self.transition(LifecycleState::Error, LifecycleState::Ready)
    }

    /// Moves to `TERMINATING` from any state except `TERMINATED` itself.
    pub fn begin_terminate(&self) -> Result<(), DapperError> {
        let mut guard = self.state.lock().expect("lifecycle mutex poisoned");
        if *guard == LifecycleState::Terminated {
            return Err(DapperError::LifecycleViolation {
                expected: "any state but TERMINATED".to_string(),
                actual: guard.name().to_string(),
            });
        }
        *guard = LifecycleState::Terminating;
        Ok(())
    }

    /// Runs every registered cleanup hook in reverse order, then moves to
    /// `TERMINATED`. Idempotent: calling this more than once only runs the
    /// hooks once, since they're drained.
    pub fn finish_terminate(&self) {
        let hooks: Vec<CleanupHook> = {
            let mut cleanup = self.cleanup.lock().expect("lifecycle mutex poisoned");
            std::mem::take(&mut *cleanup)
        };
        for hook in hooks.into_iter().rev() {
            hook();
        }
        *self.state.lock().expect("lifecycle mutex poisoned") = LifecycleState::Terminated;
    }

    fn transition(&self, expected: LifecycleState, next: LifecycleState) -> Result<(), DapperError> {
        let mut guard = self.state.lock().expect("lifecycle mutex poisoned");
        if *guard != expected {
            return Err(DapperError::LifecycleViolation {
                expected: expected.name().to_string(),
                actual: guard.name().to_string(),
            });
        }
        *guard = next;
        Ok(())
    }

    fn end_operation(&self, failed: bool) {
        let mut guard = self.state.lock().expect("lifecycle mutex poisoned");
        // A concurrent `begin_terminate` may have already moved us past BUSY;
        // only resolve the operation if we're still the ones holding it.
        if *guard == LifecycleState::Busy {
            *guard = if failed { LifecycleState::Error } else { LifecycleState::Ready };
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for one in-flight operation. Dropping it releases `BUSY`.
pub struct OperationGuard<'a> {
    lifecycle: &'a Lifecycle,
    name: String,
    failed: AtomicBool,
}

impl OperationGuard<'_> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Marks this operation as having failed, so the guard's drop leaves the
    /// lifecycle in `ERROR` instead of `READY`.
    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.lifecycle.end_operation(self.failed.load(Ordering::SeqCst));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_ready() {
        let lifecycle = Lifecycle::new();
        lifecycle.begin_initialize().unwrap();
        lifecycle.finish_initialize().unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Ready);
    }

    #[test]
    fn operation_context_round_trips_to_ready() {
        let lifecycle = Lifecycle::new();
        lifecycle.begin_initialize().unwrap();
        lifecycle.finish_initialize().unwrap();

        {
            let _guard = lifecycle.operation_context("next").unwrap();
            assert_eq!(lifecycle.state(), LifecycleState::Busy);
        }
        assert_eq!(lifecycle.state(), LifecycleState::Ready);
    }

    #[test]
    fn failed_operation_leaves_error_state() {
        let lifecycle = Lifecycle::new();
        lifecycle.begin_initialize().unwrap();
        lifecycle.finish_initialize().unwrap();

        {
            let guard = lifecycle.operation_context("evaluate").unwrap();
            guard.mark_failed();
        }
        assert_eq!(lifecycle.state(), LifecycleState::Error);
    }

    #[test]
    fn recover_returns_to_ready_from_error() {
        let lifecycle = Lifecycle::new();
        lifecycle.begin_initialize().unwrap();
        lifecycle.finish_initialize().unwrap();

        {
            let guard = lifecycle.operation_context("evaluate").unwrap();
            guard.mark_failed();
        }
        assert_eq!(lifecycle.state(), LifecycleState::Error);

        lifecycle.recover().unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Ready);
    }

    #[test]
    fn recover_rejected_outside_error() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.recover().is_err());
    }

    #[test]
    fn operation_context_rejected_outside_ready() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.operation_context("next").is_err());
    }

    #[test]
    fn terminate_runs_cleanup_in_reverse_order() {
        let lifecycle = Lifecycle::new();
        let order = std::sync::Arc::new(Mutex::new(Vec::new()));

        let o1 = order.clone();
        lifecycle.register_cleanup(Box::new(move || o1.lock().unwrap().push(1)));
        let o2 = order.clone();
        lifecycle.register_cleanup(Box::new(move || o2.lock().unwrap().push(2)));

        lifecycle.begin_terminate().unwrap();
        lifecycle.finish_terminate();

        assert_eq!(*order.lock().unwrap(), vec![2, 1]);
        assert_eq!(lifecycle.state(), LifecycleState::Terminated);
    }

    #[test]
    fn terminate_reachable_from_any_state() {
        let lifecycle = Lifecycle::new();
        lifecycle.begin_terminate().unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Terminating);
    }

    #[test]
    fn terminate_from_terminated_is_rejected() {
        let lifecycle = Lifecycle::new();
        lifecycle.begin_terminate().unwrap();
        lifecycle.finish_terminate();
        assert!(lifecycle.begin_terminate().is_err());
    }
}
