//! Error taxonomy for the Dapper engine.
//!
//! Each variant names the recovery behavior a caller should take, not just
//! the failure. [`DapperError::recovery`] documents that mapping in code so
//! the session loop and the request handler agree on it in one place.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DapperError {
    /// Malformed or semantically invalid DAP request (bad JSON shape, a
    /// required field missing). The client gets an error response; the
    /// session is otherwise unaffected.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A request required a capability the current backend/session doesn't
    /// have (e.g. `setDataBreakpoints` without `supportsDataBreakpoints`).
    #[error("capability violation: {0}")]
    CapabilityViolation(String),

    /// A request's preconditions weren't met (e.g. `next` while not stopped).
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A backend operation exceeded its deadline. One recovery attempt is
    /// made via `Lifecycle::recover`; a second timeout terminates the session.
    #[error("backend operation '{operation}' timed out after {elapsed_ms}ms")]
    BackendTimeout { operation: String, elapsed_ms: u64 },

    /// The backend itself reported a failure for an otherwise well-formed
    /// operation (e.g. the debuggee raised during evaluation).
    #[error("backend error: {0}")]
    Backend(String),

    /// A framing violation on either the client-facing or IPC transport.
    #[error("framing error: {0}")]
    Framing(String),

    /// A transport-level I/O failure (connect/accept/read/write).
    #[error("transport error: {0}")]
    Transport(String),

    /// An operation was attempted from a lifecycle state that disallows it.
    #[error("lifecycle violation: expected {expected}, was in {actual}")]
    LifecycleViolation { expected: String, actual: String },

    /// `dapper/hotReload` failed; see the error message for which of the
    /// seven steps it failed at.
    #[error("hot reload error: {0}")]
    HotReload(String),

    /// The session is already tearing down; further requests are rejected
    /// immediately rather than queued.
    #[error("session is shutting down")]
    SessionShuttingDown,
}

impl DapperError {
    /// Short, stable identifier used in `dapper/hotReloadResult` warnings and
    /// log fields; not part of the wire protocol's `message` text.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            DapperError::Protocol(_) => "protocolError",
            DapperError::CapabilityViolation(_) => "capabilityViolation",
            DapperError::PreconditionFailed(_) => "preconditionFailed",
            DapperError::BackendTimeout { .. } => "backendTimeout",
            DapperError::Backend(_) => "backendError",
            DapperError::Framing(_) => "framingError",
            DapperError::Transport(_) => "transportError",
            DapperError::LifecycleViolation { .. } => "lifecycleViolation",
            DapperError::HotReload(_) => "hotReloadError",
            DapperError::SessionShuttingDown => "sessionShuttingDown",
        }
    }

    /// Whether the session's lifecycle should transition to `ERROR` after
    /// this failure (as opposed to just failing the one request).
    #[must_use]
    pub fn enters_error_state(&self) -> bool {
        matches!(self, DapperError::BackendTimeout { .. } | DapperError::Backend(_))
    }
}

pub type Result<T> = std::result::Result<T, DapperError>;
