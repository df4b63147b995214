//! Session State (§4.8): the single mutable aggregate owned by the event
//! loop. All mutation happens from loop-dispatched handlers; nothing here
//! takes its own lock beyond what the collections below need to be `Send`.

use dapper_breakpoint::{BreakpointStore, ExceptionFilterState, FunctionBreakpointStore};
use dapper_variables::{Value, VariableArena};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// One live debuggee thread, as reported by the backend.
#[derive(Debug, Clone)]
pub struct ThreadInfo {
    pub id: i64,
    pub name: String,
}

/// Registry of currently known threads, with add/remove tracked so the
/// session can tell the difference between "still the same thread set" and
/// a `thread` event actually changing membership.
#[derive(Debug, Default)]
pub struct ThreadRegistry {
    threads: HashMap<i64, ThreadInfo>,
}

impl ThreadRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this is a newly seen thread id.
    pub fn add(&mut self, thread: ThreadInfo) -> bool {
        self.threads.insert(thread.id, thread).is_none()
    }

    /// Returns `true` if the thread was present and removed.
    pub fn remove(&mut self, thread_id: i64) -> bool {
        self.threads.remove(&thread_id).is_some()
    }

    #[must_use]
    pub fn all(&self) -> Vec<ThreadInfo> {
        let mut threads: Vec<ThreadInfo> = self.threads.values().cloned().collect();
        threads.sort_by_key(|t| t.id);
        threads
    }

    #[must_use]
    pub fn contains(&self, thread_id: i64) -> bool {
        self.threads.contains_key(&thread_id)
    }
}

/// Top-level mutable state for one debug session.
///
/// Variable references are invalidated in bulk on every resume (`continue`,
/// `next`, `stepIn`, `stepOut`); the DAP spec requires clients to treat any
/// `variablesReference` from before a resume as stale, so
/// [`Self::invalidate_on_resume`] must run before the corresponding
/// `stopped` event (if any) is observed by a handler.
pub struct SessionState {
    pub variables: VariableArena<Value>,
    pub threads: ThreadRegistry,
    pub breakpoints: BreakpointStore,
    pub function_breakpoints: FunctionBreakpointStore,
    pub exception_filters: ExceptionFilterState,
    pub configuration_done: AtomicBool,
    stopped: AtomicBool,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            variables: VariableArena::new(),
            threads: ThreadRegistry::new(),
            breakpoints: BreakpointStore::new(),
            function_breakpoints: FunctionBreakpointStore::new(),
            exception_filters: ExceptionFilterState::new(),
            configuration_done: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// `configurationDone` is idempotent: repeated calls have no additional
    /// effect. Returns whether this call is the one that actually flipped
    /// the flag (the request handler uses this to decide whether to signal
    /// start-of-execution).
    pub fn mark_configuration_done(&self) -> bool {
        !self.configuration_done.swap(true, Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Must be called before any handler observes the corresponding
    /// `stopped`/`continued` event, so that the stopped flag and any
    /// variable-reference invalidation are never visible out of order.
    pub fn mark_stopped(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Marks the session running and invalidates every previously issued
    /// `variablesReference` by clearing the arena — old handles become
    /// stale rather than silently returning wrong data.
    pub fn invalidate_on_resume(&mut self) {
        self.stopped.store(false, Ordering::SeqCst);
        self.variables.clear();
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
