//! External-launcher backend: a separate debuggee process driven over the
//! binary IPC transport.
//!
//! The adapter spawns the launcher, binds an IPC listener and waits for the
//! launcher to connect back, then issues commands as JSON
//! `{id, command, arguments}` envelopes and matches responses by `id`. The
//! launcher's stdout/stderr are proxied into `output` events rather than
//! inherited directly, mirroring the bidirectional-proxy shape of a classic
//! subprocess debug bridge but framed as DAP `output` events instead of raw
//! passthrough.

use super::{Backend, ResumeKind};
use crate::error::DapperError;
use crate::framing::ipc::MessageKind;
use crate::ipc::{IpcManager, IpcMessage};
use crate::protocol::{Event, Response};
use crate::router::Router;
use crate::transport::{Connection, Endpoint, Listener};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};

#[derive(Debug, Clone, Serialize)]
struct CommandEnvelope<'a> {
    id: i64,
    command: &'a str,
    arguments: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseEnvelope {
    id: i64,
    success: bool,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

pub struct ExternalLauncher {
    child: Mutex<Option<Child>>,
    ipc: IpcManager,
    router: Arc<Router>,
    next_id: AtomicI64,
    demux_task: tokio::task::JoinHandle<()>,
}

impl ExternalLauncher {
    /// Spawns `program` with `args`/`env`/`cwd`, passing it `endpoint` (via
    /// the `DAPPER_IPC_ENDPOINT` environment variable) to connect back on,
    /// and accepts that connection within `accept_timeout`. Every event the
    /// launcher emits (`stopped`, `output`, `terminated`, ...), as well as
    /// every response to a command issued through [`Self::call`], is routed
    /// through the shared `router` rather than tracked separately here.
    pub async fn spawn(
        program: &str,
        args: &[String],
        env: &HashMap<String, String>,
        cwd: Option<&std::path::Path>,
        endpoint: &Endpoint,
        accept_timeout: Duration,
        router: Arc<Router>,
    ) -> Result<Self, DapperError> {
        let listener = Listener::bind(endpoint).await?;
        let bound = listener.local_endpoint().unwrap_or_else(|_| endpoint.clone_for_child());

        let mut command = Command::new(program);
        command
            .args(args)
            .envs(env)
            .env("DAPPER_IPC_ENDPOINT", bound.child_env_value())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| DapperError::Transport(format!("failed to spawn launcher '{program}': {e}")))?;

        spawn_output_proxy(child.stdout.take(), "stdout", router.clone());
        spawn_output_proxy(child.stderr.take(), "stderr", router.clone());

        let connection = tokio::time::timeout(accept_timeout, listener.accept())
            .await
            .map_err(|_| DapperError::Transport("launcher did not connect back in time".into()))??;

        Ok(Self::from_connection(child, connection, router))
    }

    fn from_connection(child: Child, connection: Connection, router: Arc<Router>) -> Self {
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
        let ipc = IpcManager::spawn(connection, inbound_tx);

        let demux_router = router.clone();
        let demux_task = tokio::spawn(async move {
            while let Some(IpcMessage { kind, payload }) = inbound_rx.recv().await {
                match kind {
                    MessageKind::Response => {
                        let Ok(envelope) = serde_json::from_slice::<ResponseEnvelope>(&payload) else {
                            continue;
                        };
                        let response = Response {
                            seq: 0,
                            msg_type: "response".to_string(),
                            request_seq: envelope.id,
                            success: envelope.success,
                            command: String::new(),
                            message: envelope.message,
                            body: envelope.body,
                        };
                        demux_router.route_response(response).await;
                    }
                    MessageKind::Event => {
                        let Ok(value) = serde_json::from_slice::<Value>(&payload) else { continue };
                        let name = value
                            .get("event")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown")
                            .to_string();
                        let body = value.get("body").cloned();
                        demux_router
                            .route_event(Event { seq: 0, msg_type: "event".to_string(), event: name, body })
                            .await;
                    }
                    MessageKind::Command => {
                        // The launcher never initiates commands toward the adapter.
                    }
                }
            }
        });

        Self { child: Mutex::new(Some(child)), ipc, router, next_id: AtomicI64::new(1), demux_task }
    }

    async fn call(&self, command: &str, arguments: Value) -> Result<Value, DapperError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let rx = self.router.await_response(id).await;

        let envelope = CommandEnvelope { id, command, arguments };
        let payload = serde_json::to_vec(&envelope)
            .map_err(|e| DapperError::Protocol(format!("failed to encode backend command: {e}")))?;

        if let Err(e) = self.ipc.send(MessageKind::Command, &payload).await {
            self.router.cancel_response(id).await;
            return Err(e);
        }

        let response = super::with_operation_timeout(command, async {
            rx.await.map_err(|_| DapperError::Backend("launcher connection closed mid-command".into()))
        })
        .await?;

        if response.success {
            Ok(response.body.unwrap_or(Value::Null))
        } else {
            Err(DapperError::Backend(response.message.unwrap_or_else(|| "backend command failed".into())))
        }
    }
}

fn spawn_output_proxy<R>(pipe: Option<R>, category: &'static str, router: Arc<Router>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let Some(pipe) = pipe else { return };
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let event = Event {
                seq: 0,
                msg_type: "event".to_string(),
                event: "output".to_string(),
                body: Some(serde_json::json!({ "category": category, "output": format!("{line}\n") })),
            };
            router.route_event(event).await;
        }
    });
}

impl Drop for ExternalLauncher {
    fn drop(&mut self) {
        self.demux_task.abort();
        if let Ok(mut guard) = self.child.try_lock() {
            if let Some(child) = guard.as_mut() {
                let _ = child.start_kill();
            }
        }
    }
}

#[async_trait]
impl Backend for ExternalLauncher {
    async fn initialize(&self) -> Result<Value, DapperError> {
        self.call("initialize", Value::Null).await
    }

    async fn launch(&self, config: Value) -> Result<Value, DapperError> {
        self.call("launch", config).await
    }

    async fn attach(&self, config: Value) -> Result<Value, DapperError> {
        self.call("attach", config).await
    }

    async fn set_breakpoints(&self, path: &str, breakpoints: Value) -> Result<Value, DapperError> {
        self.call("setBreakpoints", serde_json::json!({ "path": path, "breakpoints": breakpoints })).await
    }

    async fn set_function_breakpoints(&self, breakpoints: Value) -> Result<Value, DapperError> {
        self.call("setFunctionBreakpoints", breakpoints).await
    }

    async fn set_exception_breakpoints(&self, filters: Value) -> Result<Value, DapperError> {
        self.call("setExceptionBreakpoints", filters).await
    }

    async fn set_data_breakpoints(&self, breakpoints: Value) -> Result<Value, DapperError> {
        self.call("setDataBreakpoints", breakpoints).await
    }

    async fn data_breakpoint_info(&self, target: Value) -> Result<Value, DapperError> {
        self.call("dataBreakpointInfo", target).await
    }

    async fn threads(&self) -> Result<Value, DapperError> {
        self.call("threads", Value::Null).await
    }

    async fn stack_trace(&self, args: Value) -> Result<Value, DapperError> {
        self.call("stackTrace", args).await
    }

    async fn scopes(&self, frame_id: i64) -> Result<Value, DapperError> {
        self.call("scopes", serde_json::json!({ "frameId": frame_id })).await
    }

    async fn variables(&self, args: Value) -> Result<Value, DapperError> {
        self.call("variables", args).await
    }

    async fn evaluate(&self, args: Value) -> Result<Value, DapperError> {
        self.call("evaluate", args).await
    }

    async fn set_expression(&self, args: Value) -> Result<Value, DapperError> {
        self.call("setExpression", args).await
    }

    async fn resume(&self, kind: ResumeKind, thread_id: i64) -> Result<Value, DapperError> {
        let command = match kind {
            ResumeKind::Continue => "continue",
            ResumeKind::Next => "next",
            ResumeKind::StepIn => "stepIn",
            ResumeKind::StepOut => "stepOut",
            ResumeKind::Pause => "pause",
        };
        self.call(command, serde_json::json!({ "threadId": thread_id })).await
    }

    async fn disconnect(&self, restart: bool) -> Result<(), DapperError> {
        self.call("disconnect", serde_json::json!({ "restart": restart })).await.map(|_| ())
    }

    async fn terminate(&self) -> Result<(), DapperError> {
        let result = self.call("terminate", Value::Null).await.map(|_| ());
        self.ipc.close().await;
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.start_kill();
        }
        result
    }

    async fn hot_reload(&self, args: Value) -> Result<Option<Value>, DapperError> {
        self.call("dapper/hotReload", args).await.map(Some)
    }
}

impl Endpoint {
    /// Best-effort fallback for transports whose bound address can't be
    /// re-derived from the OS (e.g. a Unix socket is already fully resolved
    /// pre-bind, so this just clones it).
    fn clone_for_child(&self) -> Endpoint {
        self.clone()
    }

    /// Serializes this endpoint into a single string a child process can
    /// parse back out of its environment.
    fn child_env_value(&self) -> String {
        match self {
            Endpoint::Tcp { host, port } => format!("tcp:{host}:{port}"),
            #[cfg(unix)]
            Endpoint::UnixSocket { path } => format!("unix:{}", path.display()),
            #[cfg(windows)]
            Endpoint::NamedPipe { name } => format!("pipe:{name}"),
        }
    }
}
