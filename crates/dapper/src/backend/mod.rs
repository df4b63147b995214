//! Polymorphic backend: the debuggee-facing half of the engine.
//!
//! Two variants share one contract (§4.6): an [`external::ExternalLauncher`]
//! that proxies commands over IPC to a separate launcher process, and an
//! [`in_process::InProcessBackend`] that executes them synchronously on a
//! cooperative worker. The session and request handler only ever see
//! [`Backend`] — the variant is chosen once, at `launch`/`attach`, and never
//! swapped mid-session.

pub mod external;
pub mod in_process;

use crate::error::DapperError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Every operation a backend must support, independent of how it executes
/// commands underneath. Arguments and return bodies are untyped JSON at
/// this layer — the request handler is responsible for the DAP-typed
/// argument/body shapes; the backend only needs to forward them.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn initialize(&self) -> Result<Value, DapperError>;
    async fn launch(&self, config: Value) -> Result<Value, DapperError>;
    async fn attach(&self, config: Value) -> Result<Value, DapperError>;

    async fn set_breakpoints(&self, path: &str, breakpoints: Value) -> Result<Value, DapperError>;
    async fn set_function_breakpoints(&self, breakpoints: Value) -> Result<Value, DapperError>;
    async fn set_exception_breakpoints(&self, filters: Value) -> Result<Value, DapperError>;
    async fn set_data_breakpoints(&self, breakpoints: Value) -> Result<Value, DapperError>;
    async fn data_breakpoint_info(&self, target: Value) -> Result<Value, DapperError>;

    async fn threads(&self) -> Result<Value, DapperError>;
    async fn stack_trace(&self, args: Value) -> Result<Value, DapperError>;
    async fn scopes(&self, frame_id: i64) -> Result<Value, DapperError>;
    async fn variables(&self, args: Value) -> Result<Value, DapperError>;

    async fn evaluate(&self, args: Value) -> Result<Value, DapperError>;
    async fn set_expression(&self, args: Value) -> Result<Value, DapperError>;

    async fn resume(&self, kind: ResumeKind, thread_id: i64) -> Result<Value, DapperError>;

    async fn disconnect(&self, restart: bool) -> Result<(), DapperError>;
    async fn terminate(&self) -> Result<(), DapperError>;

    /// `Ok(None)` means the backend doesn't implement hot reload at all;
    /// callers should have already checked `supportsHotReload` before
    /// calling this, so that case should be rare in practice.
    async fn hot_reload(&self, args: Value) -> Result<Option<Value>, DapperError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeKind {
    Continue,
    Next,
    StepIn,
    StepOut,
    Pause,
}

/// Default per-operation deadline; most commands are local IPC round-trips
/// and should resolve in well under this.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs `fut` under [`DEFAULT_OPERATION_TIMEOUT`], mapping expiry to
/// [`DapperError::BackendTimeout`] as §4.6 requires. Delegates to
/// [`crate::scheduler::Scheduler::with_timeout`] rather than calling
/// `tokio::time::timeout` itself, so every per-operation deadline in the
/// engine goes through the same accounting.
pub async fn with_operation_timeout<F, T>(operation: &str, fut: F) -> Result<T, DapperError>
where
    F: std::future::Future<Output = Result<T, DapperError>>,
{
    crate::scheduler::Scheduler::with_timeout(operation, DEFAULT_OPERATION_TIMEOUT, fut).await?
}

/// Which backend variant a session was created with. Chosen once at
/// `launch`/`attach` and immutable for the session's lifetime.
pub enum BackendHandle {
    ExternalLauncher(external::ExternalLauncher),
    InProcess(in_process::InProcessBackend),
}

#[async_trait]
impl Backend for BackendHandle {
    async fn initialize(&self) -> Result<Value, DapperError> {
        match self {
            BackendHandle::ExternalLauncher(b) => b.initialize().await,
            BackendHandle::InProcess(b) => b.initialize().await,
        }
    }

    async fn launch(&self, config: Value) -> Result<Value, DapperError> {
        match self {
            BackendHandle::ExternalLauncher(b) => b.launch(config).await,
            BackendHandle::InProcess(b) => b.launch(config).await,
        }
    }

    async fn attach(&self, config: Value) -> Result<Value, DapperError> {
        match self {
            BackendHandle::ExternalLauncher(b) => b.attach(config).await,
            BackendHandle::InProcess(b) => b.attach(config).await,
        }
    }

    async fn set_breakpoints(&self, path: &str, breakpoints: Value) -> Result<Value, DapperError> {
        match self {
            BackendHandle::ExternalLauncher(b) => b.set_breakpoints(path, breakpoints).await,
            BackendHandle::InProcess(b) => b.set_breakpoints(path, breakpoints).await,
        }
    }

    async fn set_function_breakpoints(&self, breakpoints: Value) -> Result<Value, DapperError> {
        match self {
            BackendHandle::ExternalLauncher(b) => b.set_function_breakpoints(breakpoints).await,
            BackendHandle::InProcess(b) => b.set_function_breakpoints(breakpoints).await,
        }
    }

    async fn set_exception_breakpoints(&self, filters: Value) -> Result<Value, DapperError> {
        match self {
            BackendHandle::ExternalLauncher(b) => b.set_exception_breakpoints(filters).await,
            BackendHandle::InProcess(b) => b.set_exception_breakpoints(filters).await,
        }
    }

    async fn set_data_breakpoints(&self, breakpoints: Value) -> Result<Value, DapperError> {
        match self {
            BackendHandle::ExternalLauncher(b) => b.set_data_breakpoints(breakpoints).await,
            BackendHandle::InProcess(b) => b.set_data_breakpoints(breakpoints).await,
        }
    }

    async fn data_breakpoint_info(&self, target: Value) -> Result<Value, DapperError> {
        match self {
            BackendHandle::ExternalLauncher(b) => b.data_breakpoint_info(target).await,
            BackendHandle::InProcess(b) => b.data_breakpoint_info(target).await,
        }
    }

    async fn threads(&self) -> Result<Value, DapperError> {
        match self {
            BackendHandle::ExternalLauncher(b) => b.threads().await,
            BackendHandle::InProcess(b) => b.threads().await,
        }
    }

    async fn stack_trace(&self, args: Value) -> Result<Value, DapperError> {
        match self {
            BackendHandle::ExternalLauncher(b) => b.stack_trace(args).await,
            BackendHandle::InProcess(b) => b.stack_trace(args).await,
        }
    }

    async fn scopes(&self, frame_id: i64) -> Result<Value, DapperError> {
        match self {
            BackendHandle::ExternalLauncher(b) => b.scopes(frame_id).await,
            BackendHandle::InProcess(b) => b.scopes(frame_id).await,
        }
    }

    async fn variables(&self, args: Value) -> Result<Value, DapperError> {
        match self {
            BackendHandle::ExternalLauncher(b) => b.variables(args).await,
            BackendHandle::InProcess(b) => b.variables(args).await,
        }
    }

    async fn evaluate(&self, args: Value) -> Result<Value, DapperError> {
        match self {
            BackendHandle::ExternalLauncher(b) => b.evaluate(args).await,
            BackendHandle::InProcess(b) => b.evaluate(args).await,
        }
    }

    async fn set_expression(&self, args: Value) -> Result<Value, DapperError> {
        match self {
            BackendHandle::ExternalLauncher(b) => b.set_expression(args).await,
            BackendHandle::InProcess(b) => b.set_expression(args).await,
        }
    }

    async fn resume(&self, kind: ResumeKind, thread_id: i64) -> Result<Value, DapperError> {
        match self {
            BackendHandle::ExternalLauncher(b) => b.resume(kind, thread_id).await,
            BackendHandle::InProcess(b) => b.resume(kind, thread_id).await,
        }
    }

    async fn disconnect(&self, restart: bool) -> Result<(), DapperError> {
        match self {
            BackendHandle::ExternalLauncher(b) => b.disconnect(restart).await,
            BackendHandle::InProcess(b) => b.disconnect(restart).await,
        }
    }

    async fn terminate(&self) -> Result<(), DapperError> {
        match self {
            BackendHandle::ExternalLauncher(b) => b.terminate().await,
            BackendHandle::InProcess(b) => b.terminate().await,
        }
    }

    async fn hot_reload(&self, args: Value) -> Result<Option<Value>, DapperError> {
        match self {
            BackendHandle::ExternalLauncher(b) => b.hot_reload(args).await,
            BackendHandle::InProcess(b) => b.hot_reload(args).await,
        }
    }
}
