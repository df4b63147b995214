//! In-process backend: executes commands synchronously against an embedded
//! debuggee, without a separate launcher process or IPC transport.
//!
//! The actual execution semantics (how to set a breakpoint, read a frame,
//! evaluate an expression) are owned by the embedding application, not by
//! this crate — [`InProcessExecutor`] is the seam it implements. This
//! backend only adds the cooperative-worker serialization §4.6 requires:
//! even though commands arrive concurrently from the request handler, only
//! one executes against the embedded debuggee at a time.

use super::{Backend, ResumeKind};
use crate::error::DapperError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The embedding application's hooks into its own debuggee. Every method
/// mirrors [`Backend`] one-to-one; the difference is that implementors run
/// in the same process and may assume exclusive access while a call is
/// in flight (this backend serializes calls for them).
#[async_trait]
pub trait InProcessExecutor: Send + Sync {
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
    async fn hot_reload(&self, args: Value) -> Result<Option<Value>, DapperError>;
}

pub struct InProcessBackend {
    executor: Arc<dyn InProcessExecutor>,
    /// Held for the duration of each call so commands never interleave
    /// against the embedded debuggee, even though several may be in flight
    /// from the request handler's point of view.
    worker_lock: Mutex<()>,
}

impl InProcessBackend {
    #[must_use]
    pub fn new(executor: Arc<dyn InProcessExecutor>) -> Self {
        Self { executor, worker_lock: Mutex::new(()) }
    }

    async fn serialized<F, T>(&self, operation: &str, fut: F) -> Result<T, DapperError>
    where
        F: std::future::Future<Output = Result<T, DapperError>>,
    {
        let _permit = self.worker_lock.lock().await;
        super::with_operation_timeout(operation, fut).await
    }
}

#[async_trait]
impl Backend for InProcessBackend {
    async fn initialize(&self) -> Result<Value, DapperError> {
        self.serialized("initialize", self.executor.initialize()).await
    }

    async fn launch(&self, config: Value) -> Result<Value, DapperError> {
        self.serialized("launch", self.executor.launch(config)).await
    }

    async fn attach(&self, config: Value) -> Result<Value, DapperError> {
        self.serialized("attach", self.executor.attach(config)).await
    }

    async fn set_breakpoints(&self, path: &str, breakpoints: Value) -> Result<Value, DapperError> {
        self.serialized("setBreakpoints", self.executor.set_breakpoints(path, breakpoints)).await
    }

    async fn set_function_breakpoints(&self, breakpoints: Value) -> Result<Value, DapperError> {
        self.serialized("setFunctionBreakpoints", self.executor.set_function_breakpoints(breakpoints)).await
    }

    async fn set_exception_breakpoints(&self, filters: Value) -> Result<Value, DapperError> {
        self.serialized("setExceptionBreakpoints", self.executor.set_exception_breakpoints(filters)).await
    }

    async fn set_data_breakpoints(&self, breakpoints: Value) -> Result<Value, DapperError> {
        self.serialized("setDataBreakpoints", self.executor.set_data_breakpoints(breakpoints)).await
    }

    async fn data_breakpoint_info(&self, target: Value) -> Result<Value, DapperError> {
        self.serialized("dataBreakpointInfo", self.executor.data_breakpoint_info(target)).await
    }

    async fn threads(&self) -> Result<Value, DapperError> {
        self.serialized("threads", self.executor.threads()).await
    }

    async fn stack_trace(&self, args: Value) -> Result<Value, DapperError> {
        self.serialized("stackTrace", self.executor.stack_trace(args)).await
    }

    async fn scopes(&self, frame_id: i64) -> Result<Value, DapperError> {
        self.serialized("scopes", self.executor.scopes(frame_id)).await
    }

    async fn variables(&self, args: Value) -> Result<Value, DapperError> {
        self.serialized("variables", self.executor.variables(args)).await
    }

    async fn evaluate(&self, args: Value) -> Result<Value, DapperError> {
        self.serialized("evaluate", self.executor.evaluate(args)).await
    }

    async fn set_expression(&self, args: Value) -> Result<Value, DapperError> {
        self.serialized("setExpression", self.executor.set_expression(args)).await
    }

    async fn resume(&self, kind: ResumeKind, thread_id: i64) -> Result<Value, DapperError> {
        self.serialized("resume", self.executor.resume(kind, thread_id)).await
    }

    async fn disconnect(&self, restart: bool) -> Result<(), DapperError> {
        self.serialized("disconnect", self.executor.disconnect(restart)).await
    }

    async fn terminate(&self) -> Result<(), DapperError> {
        self.serialized("terminate", self.executor.terminate()).await
    }

    async fn hot_reload(&self, args: Value) -> Result<Option<Value>, DapperError> {
        self.serialized("hotReload", self.executor.hot_reload(args)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubExecutor;

    #[async_trait]
    impl InProcessExecutor for StubExecutor {
        async fn initialize(&self) -> Result<Value, DapperError> {
            Ok(serde_json::json!({"supportsConfigurationDoneRequest": true}))
        }
        async fn launch(&self, _config: Value) -> Result<Value, DapperError> {
            Ok(Value::Null)
        }
        async fn attach(&self, _config: Value) -> Result<Value, DapperError> {
            Ok(Value::Null)
        }
        async fn set_breakpoints(&self, _path: &str, _breakpoints: Value) -> Result<Value, DapperError> {
            Ok(serde_json::json!({"breakpoints": []}))
        }
        async fn set_function_breakpoints(&self, _breakpoints: Value) -> Result<Value, DapperError> {
            Ok(Value::Null)
        }
        async fn set_exception_breakpoints(&self, _filters: Value) -> Result<Value, DapperError> {
            Ok(Value::Null)
        }
        async fn set_data_breakpoints(&self, _breakpoints: Value) -> Result<Value, DapperError> {
            Ok(Value::Null)
        }
        async fn data_breakpoint_info(&self, _target: Value) -> Result<Value, DapperError> {
            Ok(Value::Null)
        }
        async fn threads(&self) -> Result<Value, DapperError> {
            Ok(serde_json::json!({"threads": [{"id": 1, "name": "main"}]}))
        }
        async fn stack_trace(&self, _args: Value) -> Result<Value, DapperError> {
            Ok(Value::Null)
        }
        async fn scopes(&self, _frame_id: i64) -> Result<Value, DapperError> {
            Ok(Value::Null)
        }
        async fn variables(&self, _args: Value) -> Result<Value, DapperError> {
            Ok(Value::Null)
        }
        async fn evaluate(&self, _args: Value) -> Result<Value, DapperError> {
            Ok(Value::Null)
        }
        async fn set_expression(&self, _args: Value) -> Result<Value, DapperError> {
            Ok(Value::Null)
        }
        async fn resume(&self, _kind: ResumeKind, _thread_id: i64) -> Result<Value, DapperError> {
            Ok(Value::Null)
        }
        async fn disconnect(&self, _restart: bool) -> Result<(), DapperError> {
            Ok(())
        }
        async fn terminate(&self) -> Result<(), DapperError> {
            Ok(())
        }
        async fn hot_reload(&self, _args: Value) -> Result<Option<Value>, DapperError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn delegates_to_executor() {
        let backend = InProcessBackend::new(Arc::new(StubExecutor));
        let threads = backend.threads().await.unwrap();
        assert_eq!(threads["threads"][0]["name"], "main");
    }

    #[tokio::test]
    async fn serializes_concurrent_calls() {
        let backend = Arc::new(InProcessBackend::new(Arc::new(StubExecutor)));
        let b1 = backend.clone();
        let b2 = backend.clone();
        let (r1, r2) = tokio::join!(b1.initialize(), b2.initialize());
        assert!(r1.is_ok());
        assert!(r2.is_ok());
    }
}
