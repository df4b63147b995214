//! Request Handler (§4.5): table-driven dispatch from DAP `command` to a
//! handler that validates arguments/capabilities/preconditions and produces
//! a response plus zero or more events.
//!
//! Each handler method takes the raw `arguments` value, so argument-shape
//! errors surface as [`DapperError::Protocol`] uniformly rather than each
//! handler hand-rolling its own "missing field" message.

use crate::backend::external::ExternalLauncher;
use crate::backend::in_process::{InProcessBackend, InProcessExecutor};
use crate::backend::{Backend, BackendHandle, ResumeKind};
use crate::config::{BackendChoice, LaunchTarget, ResolvedLaunchConfig};
use crate::error::DapperError;
use crate::lifecycle::Lifecycle;
use crate::logpoint;
use crate::platform;
use crate::protocol::*;
use crate::router::Router;
use crate::session::{SessionState, ThreadInfo};
use crate::transport::Endpoint;
use dapper_breakpoint::{BreakpointSpec, FunctionBreakpointSpec};
use dapper_eval::{EvaluationContext, EvaluationGuard};
use dapper_stack::{FrameClassifier, PathFrameClassifier, StackFramePresentationHint};
use dapper_variables::{DefaultVariableRenderer, RenderedVariable, Value as VarValue, VariableRenderer};
use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, OnceCell};

const LAUNCHER_ACCEPT_TIMEOUT: Duration = Duration::from_secs(10);

/// A response plus any events the handler chose to emit alongside it.
/// Ordering between the two is the caller's responsibility; DAP only
/// requires that a request's own response and its associated events don't
/// interleave within themselves.
pub struct HandlerOutcome {
    pub response: Response,
    pub events: Vec<Event>,
}

pub struct RequestHandler {
    pub lifecycle: Lifecycle,
    pub session: Arc<Mutex<SessionState>>,
    pub backend: Mutex<Option<Arc<BackendHandle>>>,
    pub capabilities: Mutex<Capabilities>,
    /// Hook for embedding applications that want `launch`/`attach` with
    /// `inProcess: true` to run against their own debuggee. Left unset, such
    /// requests fail with [`DapperError::Protocol`].
    in_process_executor: Mutex<Option<Arc<dyn InProcessExecutor>>>,
    /// Directory external-launcher IPC sockets are bound under when no
    /// explicit `ipcHost`/`ipcPath` override is supplied.
    ipc_state_dir: PathBuf,
    eval_guard: EvaluationGuard,
    renderer: DefaultVariableRenderer,
    /// User/library/runtime path classification, rebuilt from the resolved
    /// launch config so `stackTrace`'s `justMyCode` filtering has something
    /// to filter against.
    frame_classifier: Mutex<PathFrameClassifier>,
    just_my_code: Mutex<bool>,
    /// Classifies every message a live launcher sends back: command
    /// responses by `request_seq`, events by name. Shared with whichever
    /// [`ExternalLauncher`] the session is currently using.
    router: Arc<Router>,
    event_tx: mpsc::UnboundedSender<Event>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
    event_handlers_registered: OnceCell<()>,
}

impl RequestHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::with_ipc_state_dir(std::env::temp_dir())
    }

    #[must_use]
    pub fn with_ipc_state_dir(ipc_state_dir: PathBuf) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            lifecycle: Lifecycle::new(),
            session: Arc::new(Mutex::new(SessionState::new())),
            backend: Mutex::new(None),
            capabilities: Mutex::new(default_capabilities()),
            in_process_executor: Mutex::new(None),
            ipc_state_dir,
            eval_guard: EvaluationGuard::new(),
            renderer: DefaultVariableRenderer::new(),
            frame_classifier: Mutex::new(PathFrameClassifier::new()),
            just_my_code: Mutex::new(true),
            router: Arc::new(Router::new()),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
            event_handlers_registered: OnceCell::new(),
        }
    }

    /// Registers the embedding application's in-process execution hooks.
    /// Must be called before a `launch`/`attach` with `inProcess: true`.
    pub async fn set_in_process_executor(&self, executor: Arc<dyn InProcessExecutor>) {
        *self.in_process_executor.lock().await = Some(executor);
    }

    /// Takes ownership of the stream of events forwarded from the live
    /// backend (`stopped`, `output`, `terminated`, ...), for the session
    /// runner to write out to the client. Can only be taken once.
    pub async fn take_event_stream(&self) -> Option<mpsc::UnboundedReceiver<Event>> {
        self.event_rx.lock().await.take()
    }

    /// Registers the persistent router handlers that fold launcher events
    /// into session state and forward them to the client, the first time a
    /// launch actually needs them. Idempotent.
    async fn ensure_event_handlers_registered(&self) {
        let router = self.router.clone();
        let session = self.session.clone();
        let event_tx = self.event_tx.clone();

        self.event_handlers_registered
            .get_or_init(|| async move {
                let stopped_session = session.clone();
                let stopped_tx = event_tx.clone();
                router
                    .on_event("stopped", move |event| {
                        let session = stopped_session.clone();
                        let tx = stopped_tx.clone();
                        let event = event.clone();
                        tokio::spawn(async move {
                            session.lock().await.mark_stopped();
                            let _ = tx.send(event);
                        });
                    })
                    .await;

                let continued_session = session.clone();
                let continued_tx = event_tx.clone();
                router
                    .on_event("continued", move |event| {
                        let session = continued_session.clone();
                        let tx = continued_tx.clone();
                        let event = event.clone();
                        tokio::spawn(async move {
                            session.lock().await.invalidate_on_resume();
                            let _ = tx.send(event);
                        });
                    })
                    .await;

                for name in ["output", "terminated", "exited", "initialized"] {
                    let tx = event_tx.clone();
                    router
                        .on_event(name, move |event| {
                            let _ = tx.send(event.clone());
                        })
                        .await;
                }
            })
            .await;
    }

    pub async fn dispatch(&self, request: Request) -> HandlerOutcome {
        let result = match request.command.as_str() {
            // These three manage lifecycle transitions themselves and don't
            // fit the READY-only `operation_context` gate.
            "initialize" | "disconnect" | "terminate" => self.route(&request).await,
            _ => self.route_within_operation(&request).await,
        };
        match result {
            Ok((body, events)) => HandlerOutcome { response: success(&request, body), events },
            Err(err) => HandlerOutcome { response: failure(&request, &err), events: Vec::new() },
        }
    }

    /// Runs `request` under a `BUSY` [`OperationGuard`], moving the lifecycle
    /// to `ERROR` on errors the §7 taxonomy marks as session-affecting. One
    /// recovery attempt is made by retrying the request once outside the
    /// guard: success calls [`Lifecycle::recover`] back to `READY`, a second
    /// failure tears the backend down and terminates the session.
    async fn route_within_operation(
        &self,
        request: &Request,
    ) -> Result<(Option<Json>, Vec<Event>), DapperError> {
        let guard = self.lifecycle.operation_context(&request.command)?;
        let result = self.route(request).await;

        let needs_recovery = matches!(&result, Err(err) if err.enters_error_state());
        if !needs_recovery {
            return result;
        }
        guard.mark_failed();
        drop(guard);

        match self.route(request).await {
            Ok(ok) => {
                self.lifecycle.recover()?;
                Ok(ok)
            }
            Err(retry_err) => {
                if let Some(backend) = self.backend.lock().await.take() {
                    let _ = backend.terminate().await;
                }
                if self.lifecycle.begin_terminate().is_ok() {
                    self.lifecycle.finish_terminate();
                }
                Err(retry_err)
            }
        }
    }

    async fn route(&self, request: &Request) -> Result<(Option<Json>, Vec<Event>), DapperError> {
        match request.command.as_str() {
            "initialize" => self.handle_initialize(request).await,
            "launch" => self.handle_launch(request).await,
            "attach" => self.handle_attach(request).await,
            "configurationDone" => self.handle_configuration_done().await,
            "setBreakpoints" => self.handle_set_breakpoints(request).await,
            "setFunctionBreakpoints" => self.handle_set_function_breakpoints(request).await,
            "setExceptionBreakpoints" => self.handle_set_exception_breakpoints(request).await,
            "setDataBreakpoints" => self.handle_set_data_breakpoints(request).await,
            "dataBreakpointInfo" => self.handle_data_breakpoint_info(request).await,
            "threads" => self.handle_threads().await,
            "stackTrace" => self.handle_stack_trace(request).await,
            "scopes" => self.handle_scopes(request).await,
            "variables" => self.handle_variables(request).await,
            "evaluate" => self.handle_evaluate(request).await,
            "setExpression" => self.handle_set_expression(request).await,
            "continue" => self.handle_resume(request, ResumeKind::Continue).await,
            "next" => self.handle_resume(request, ResumeKind::Next).await,
            "stepIn" => self.handle_resume(request, ResumeKind::StepIn).await,
            "stepOut" => self.handle_resume(request, ResumeKind::StepOut).await,
            "pause" => self.handle_resume(request, ResumeKind::Pause).await,
            "disconnect" => self.handle_disconnect(request).await,
            "terminate" => self.handle_terminate(request).await,
            "dapper/hotReload" => self.handle_hot_reload(request).await,
            other => Err(DapperError::Protocol(format!("unknown command '{other}'"))),
        }
    }

    async fn handle_initialize(&self, request: &Request) -> Result<(Option<Json>, Vec<Event>), DapperError> {
        let _args: InitializeRequestArguments = parse_args(request)?;
        self.lifecycle.begin_initialize()?;
        self.lifecycle.finish_initialize()?;

        let caps = self.capabilities.lock().await.clone();
        let initialized = Event { seq: 0, msg_type: "event".to_string(), event: "initialized".to_string(), body: None };
        Ok((Some(serde_json::to_value(caps).map_err(protocol_err)?), vec![initialized]))
    }

    async fn handle_launch(&self, request: &Request) -> Result<(Option<Json>, Vec<Event>), DapperError> {
        let args: LaunchRequestArguments = parse_args(request)?;
        let resolved = crate::config::resolve_launch(args)?;

        *self.just_my_code.lock().await = resolved.just_my_code;
        {
            let mut classifier = PathFrameClassifier::new();
            for path in &resolved.module_search_paths {
                classifier = classifier.with_user_path(path.clone());
            }
            if let Some(venv) = &resolved.venv_path {
                classifier = classifier.with_library_path(venv.to_string_lossy().to_string());
            }
            *self.frame_classifier.lock().await = classifier;
        }

        let backend = self.build_launch_backend(&resolved).await?;

        backend.initialize().await?;
        backend
            .launch(serde_json::json!({ "args": resolved.args, "stopOnEntry": resolved.stop_on_entry }))
            .await?;

        *self.backend.lock().await = Some(backend);
        Ok((None, Vec::new()))
    }

    async fn handle_attach(&self, request: &Request) -> Result<(Option<Json>, Vec<Event>), DapperError> {
        let args: AttachRequestArguments = parse_args(request)?;
        let resolved = crate::config::resolve_attach(args)?;

        let backend: Arc<BackendHandle> = match resolved.backend {
            BackendChoice::InProcess => self.in_process_backend().await?,
            BackendChoice::ExternalLauncher => {
                return Err(DapperError::Protocol(
                    "attach to an external launcher requires an already-running launcher; \
                     pass ipcHost/ipcPort or ipcPath to connect to one"
                        .to_string(),
                ));
            }
        };

        backend.initialize().await?;
        backend.attach(Json::Null).await?;

        *self.backend.lock().await = Some(backend);
        Ok((None, Vec::new()))
    }

    async fn in_process_backend(&self) -> Result<Arc<BackendHandle>, DapperError> {
        let executor = self
            .in_process_executor
            .lock()
            .await
            .clone()
            .ok_or_else(|| DapperError::Protocol("no in-process executor registered".to_string()))?;
        Ok(Arc::new(BackendHandle::InProcess(InProcessBackend::new(executor))))
    }

    /// Builds the backend for a `launch` request. `inProcess: true` defers to
    /// the embedder's [`InProcessExecutor`]; otherwise this spawns the
    /// resolved program directly and waits for it to connect back over IPC —
    /// the adapter and the launcher are the same process in this engine,
    /// distinguished only by which end of the IPC connection they hold. Every
    /// event the launcher emits afterward is classified and forwarded through
    /// the shared [`Router`].
    async fn build_launch_backend(
        &self,
        resolved: &ResolvedLaunchConfig,
    ) -> Result<Arc<BackendHandle>, DapperError> {
        match resolved.backend {
            BackendChoice::InProcess => self.in_process_backend().await,
            BackendChoice::ExternalLauncher => {
                let program = match &resolved.target {
                    LaunchTarget::Program(path) => path.clone(),
                    LaunchTarget::Module(name) => {
                        return Err(DapperError::Protocol(format!(
                            "launching by module name ('{name}') requires a language-specific launcher; \
                             resolve it to a program path before calling launch"
                        )));
                    }
                };
                let resolved_program = platform::resolve_executable(&program)
                    .ok_or_else(|| DapperError::Protocol(format!("program '{program}' not found")))?;

                let endpoint = resolved
                    .ipc_endpoint_hint
                    .clone()
                    .unwrap_or_else(|| Endpoint::auto(&self.ipc_state_dir, &launch_session_tag()));

                self.ensure_event_handlers_registered().await;
                let launcher = ExternalLauncher::spawn(
                    resolved_program.to_string_lossy().as_ref(),
                    &resolved.args,
                    &resolved.env,
                    resolved.cwd.as_deref(),
                    &endpoint,
                    LAUNCHER_ACCEPT_TIMEOUT,
                    self.router.clone(),
                )
                .await?;
                Ok(Arc::new(BackendHandle::ExternalLauncher(launcher)))
            }
        }
    }

    async fn handle_configuration_done(&self) -> Result<(Option<Json>, Vec<Event>), DapperError> {
        self.session.lock().await.mark_configuration_done();
        Ok((None, Vec::new()))
    }

    async fn handle_set_breakpoints(
        &self,
        request: &Request,
    ) -> Result<(Option<Json>, Vec<Event>), DapperError> {
        let args: SetBreakpointsArguments = parse_args(request)?;
        let path = args.source.path.clone().ok_or_else(|| DapperError::Protocol("source.path is required".into()))?;

        let specs: Vec<BreakpointSpec> = args
            .breakpoints
            .unwrap_or_default()
            .into_iter()
            .map(|bp| BreakpointSpec {
                line: bp.line,
                column: bp.column,
                condition: bp.condition,
                hit_condition: bp.hit_condition,
                log_message: bp.log_message,
            })
            .collect();

        let records = {
            let mut session = self.session.lock().await;
            session
                .breakpoints
                .set_breakpoints(&path, specs)
                .map_err(|e| DapperError::Protocol(e.to_string()))?
        };

        let backend = self.current_backend().await?;
        let backend_result = backend
            .set_breakpoints(&path, serde_json::to_value(&records).map_err(protocol_err)?)
            .await?;

        let verifications: Vec<BreakpointVerification> =
            serde_json::from_value(backend_result).unwrap_or_default();
        {
            let mut session = self.session.lock().await;
            for v in &verifications {
                let _ = session.breakpoints.apply_verification(&path, v.id, v.verified, v.adjusted_line, v.message.clone());
            }
        }

        let session = self.session.lock().await;
        let breakpoints: Vec<Breakpoint> = session
            .breakpoints
            .for_source(&path)
            .iter()
            .map(|r| Breakpoint {
                id: r.id,
                verified: r.verified,
                line: Some(r.effective_line()),
                column: r.spec.column,
                source: Some(args.source.clone()),
                message: r.message.clone(),
            })
            .collect();

        let body = SetBreakpointsResponseBody { breakpoints };
        Ok((Some(serde_json::to_value(body).map_err(protocol_err)?), Vec::new()))
    }

    async fn handle_set_function_breakpoints(
        &self,
        request: &Request,
    ) -> Result<(Option<Json>, Vec<Event>), DapperError> {
        let args: SetFunctionBreakpointsArguments = parse_args(request)?;
        let specs: Vec<FunctionBreakpointSpec> = args
            .breakpoints
            .into_iter()
            .map(|bp| FunctionBreakpointSpec { name: bp.name, condition: bp.condition, hit_condition: bp.hit_condition })
            .collect();

        let records = {
            let mut session = self.session.lock().await;
            session.function_breakpoints.set_breakpoints(specs)
        };

        let backend = self.current_backend().await?;
        backend.set_function_breakpoints(serde_json::to_value(&records).map_err(protocol_err)?).await?;

        let breakpoints: Vec<Breakpoint> = records
            .into_iter()
            .map(|r| Breakpoint { id: r.id, verified: r.verified, line: None, column: None, source: None, message: r.message })
            .collect();
        let body = SetBreakpointsResponseBody { breakpoints };
        Ok((Some(serde_json::to_value(body).map_err(protocol_err)?), Vec::new()))
    }

    async fn handle_set_exception_breakpoints(
        &self,
        request: &Request,
    ) -> Result<(Option<Json>, Vec<Event>), DapperError> {
        let args: SetExceptionBreakpointsArguments = parse_args(request)?;
        {
            let mut session = self.session.lock().await;
            session.exception_filters.set_filters(args.filters.clone());
        }
        let backend = self.current_backend().await?;
        backend.set_exception_breakpoints(serde_json::to_value(&args.filters).map_err(protocol_err)?).await?;
        Ok((None, Vec::new()))
    }

    async fn handle_set_data_breakpoints(
        &self,
        request: &Request,
    ) -> Result<(Option<Json>, Vec<Event>), DapperError> {
        let args: SetDataBreakpointsArguments = parse_args(request)?;
        if !self.capabilities.lock().await.supports_data_breakpoints.unwrap_or(false) {
            return Err(DapperError::CapabilityViolation("setDataBreakpoints requires supportsDataBreakpoints".into()));
        }
        let backend = self.current_backend().await?;
        let result = backend.set_data_breakpoints(serde_json::to_value(&args.breakpoints).map_err(protocol_err)?).await?;
        Ok((Some(result), Vec::new()))
    }

    async fn handle_data_breakpoint_info(
        &self,
        request: &Request,
    ) -> Result<(Option<Json>, Vec<Event>), DapperError> {
        let args: DataBreakpointInfoArguments = parse_args(request)?;
        let backend = self.current_backend().await?;
        let result = backend.data_breakpoint_info(serde_json::to_value(&args).map_err(protocol_err)?).await?;
        Ok((Some(result), Vec::new()))
    }

    async fn handle_threads(&self) -> Result<(Option<Json>, Vec<Event>), DapperError> {
        let backend = self.current_backend().await?;
        let raw = backend.threads().await?;
        let threads: Vec<ThreadInfo> = serde_json::from_value::<Vec<RawThread>>(raw)
            .unwrap_or_default()
            .into_iter()
            .map(|t| ThreadInfo { id: t.id, name: t.name })
            .collect();

        {
            let mut session = self.session.lock().await;
            for t in &threads {
                session.threads.add(t.clone());
            }
        }

        let body = ThreadsResponseBody {
            threads: threads.into_iter().map(|t| Thread { id: t.id, name: t.name }).collect(),
        };
        Ok((Some(serde_json::to_value(body).map_err(protocol_err)?), Vec::new()))
    }

    async fn handle_stack_trace(&self, request: &Request) -> Result<(Option<Json>, Vec<Event>), DapperError> {
        self.require_stopped().await?;
        let args: StackTraceArguments = parse_args(request)?;
        let backend = self.current_backend().await?;
        let result = backend.stack_trace(serde_json::to_value(&args).map_err(protocol_err)?).await?;
        let raw: RawStackTrace = serde_json::from_value(result).map_err(protocol_err)?;

        let just_my_code = *self.just_my_code.lock().await;
        let classifier = self.frame_classifier.lock().await;
        let classified = classifier.classify_all(raw.stack_frames, !just_my_code);

        let body = StackTraceResponseBody {
            stack_frames: classified.into_iter().map(to_protocol_frame).collect(),
            total_frames: raw.total_frames,
        };
        Ok((Some(serde_json::to_value(body).map_err(protocol_err)?), Vec::new()))
    }

    async fn handle_scopes(&self, request: &Request) -> Result<(Option<Json>, Vec<Event>), DapperError> {
        self.require_stopped().await?;
        let args: ScopesArguments = parse_args(request)?;
        let backend = self.current_backend().await?;
        let raw = backend.scopes(args.frame_id).await?;
        let named: Vec<(String, VarValue)> = match serde_json::from_value::<VarValue>(raw).map_err(protocol_err)? {
            VarValue::Map(pairs) => pairs,
            other => vec![("Locals".to_string(), other)],
        };

        let mut session = self.session.lock().await;
        let scopes: Vec<Scope> = named
            .into_iter()
            .map(|(name, value)| {
                let expandable = value.is_expandable();
                let reference = if expandable { session.variables.insert(value) } else { 0 };
                Scope { name, presentation_hint: None, variables_reference: reference, expensive: false }
            })
            .collect();

        let body = ScopesResponseBody { scopes };
        Ok((Some(serde_json::to_value(body).map_err(protocol_err)?), Vec::new()))
    }

    async fn handle_variables(&self, request: &Request) -> Result<(Option<Json>, Vec<Event>), DapperError> {
        self.require_stopped().await?;
        let args: VariablesArguments = parse_args(request)?;

        let mut session = self.session.lock().await;
        let value = session
            .variables
            .get(args.variables_reference)
            .ok_or_else(|| DapperError::Protocol(format!("unknown variablesReference {}", args.variables_reference)))?
            .clone();
        drop(session);

        let start = args.start.unwrap_or(0).max(0) as usize;
        let count = if args.count.unwrap_or(0) > 0 { args.count.unwrap_or(0) as usize } else { usize::MAX };

        let mut session = self.session.lock().await;
        let rendered = self.render_children_allocating(&mut session, &value, start, count);

        let variables: Vec<ProtocolVariable> = rendered
            .into_iter()
            .map(|v| ProtocolVariable {
                name: v.name,
                value: v.value,
                type_: v.type_name,
                variables_reference: v.variables_reference,
                named_variables: v.named_variables,
                indexed_variables: v.indexed_variables,
                memory_reference: v.memory_reference,
            })
            .collect();

        let body = VariablesResponseBody { variables };
        Ok((Some(serde_json::to_value(body).map_err(protocol_err)?), Vec::new()))
    }

    /// Renders `value`'s children, allocating a fresh arena reference for
    /// any child that is itself expandable, so subsequent `variables`
    /// requests can page into it.
    fn render_children_allocating(
        &self,
        session: &mut SessionState,
        value: &VarValue,
        start: usize,
        count: usize,
    ) -> Vec<RenderedVariable> {
        let named_children: Vec<(String, VarValue)> = match value {
            VarValue::List(elements) => {
                elements.iter().enumerate().map(|(i, v)| (format!("[{i}]"), v.clone())).collect()
            }
            VarValue::Map(pairs) => pairs.clone(),
            VarValue::Ref(inner) => vec![("*".to_string(), (**inner).clone())],
            VarValue::Object { value: inner, .. } => match inner.as_ref() {
                VarValue::Map(pairs) => pairs.clone(),
                other => vec![("*".to_string(), other.clone())],
            },
            _ => Vec::new(),
        };

        named_children
            .into_iter()
            .skip(start)
            .take(count)
            .map(|(name, child)| {
                if child.is_expandable() {
                    let reference = session.variables.insert(child.clone());
                    self.renderer.render_with_reference(&name, &child, reference)
                } else {
                    self.renderer.render(&name, &child)
                }
            })
            .collect()
    }

    async fn handle_evaluate(&self, request: &Request) -> Result<(Option<Json>, Vec<Event>), DapperError> {
        let args: EvaluateArguments = parse_args(request)?;
        let context = parse_evaluation_context(args.context.as_deref());
        self.eval_guard
            .validate(&args.expression, context, args.allow_side_effects.unwrap_or(false))
            .map_err(|e| DapperError::PreconditionFailed(e.to_string()))?;

        let backend = self.current_backend().await?;
        let raw = backend.evaluate(serde_json::to_value(&args).map_err(protocol_err)?).await?;
        let value: VarValue = serde_json::from_value(raw).map_err(protocol_err)?;

        let mut session = self.session.lock().await;
        let reference = if value.is_expandable() { session.variables.insert(value.clone()) } else { 0 };
        let rendered = self.renderer.render_with_reference("", &value, reference);

        let body = EvaluateResponseBody {
            result: rendered.value,
            type_: rendered.type_name,
            variables_reference: rendered.variables_reference,
        };
        Ok((Some(serde_json::to_value(body).map_err(protocol_err)?), Vec::new()))
    }

    async fn handle_set_expression(&self, request: &Request) -> Result<(Option<Json>, Vec<Event>), DapperError> {
        if !self.capabilities.lock().await.supports_set_expression.unwrap_or(false) {
            return Err(DapperError::CapabilityViolation("setExpression requires supportsSetExpression".into()));
        }
        let args: SetExpressionArguments = parse_args(request)?;
        self.eval_guard
            .validate(&args.expression, EvaluationContext::Watch, true)
            .map_err(|e| DapperError::PreconditionFailed(e.to_string()))?;

        let backend = self.current_backend().await?;
        let raw = backend.set_expression(serde_json::to_value(&args).map_err(protocol_err)?).await?;
        let value: VarValue = serde_json::from_value(raw).map_err(protocol_err)?;

        let mut session = self.session.lock().await;
        let reference = if value.is_expandable() { Some(session.variables.insert(value.clone())) } else { None };
        let rendered = match reference {
            Some(r) => self.renderer.render_with_reference("", &value, r),
            None => self.renderer.render("", &value),
        };

        let body = SetExpressionResponseBody {
            value: rendered.value,
            type_: rendered.type_name,
            variables_reference: reference,
        };
        Ok((Some(serde_json::to_value(body).map_err(protocol_err)?), Vec::new()))
    }

    async fn handle_resume(
        &self,
        request: &Request,
        kind: ResumeKind,
    ) -> Result<(Option<Json>, Vec<Event>), DapperError> {
        self.require_stopped().await?;
        let thread_id = extract_thread_id(request)?;
        let backend = self.current_backend().await?;
        backend.resume(kind, thread_id).await?;

        {
            let mut session = self.session.lock().await;
            session.invalidate_on_resume();
        }

        let body = if kind == ResumeKind::Continue {
            Some(serde_json::to_value(ContinueResponseBody { all_threads_continued: true }).map_err(protocol_err)?)
        } else {
            None
        };
        Ok((body, Vec::new()))
    }

    async fn handle_disconnect(&self, request: &Request) -> Result<(Option<Json>, Vec<Event>), DapperError> {
        let args: DisconnectArguments = parse_args(request).unwrap_or(DisconnectArguments { restart: None, terminate_debuggee: None });
        self.lifecycle.begin_terminate()?;
        if let Some(backend) = self.backend.lock().await.take() {
            let _ = backend.disconnect(args.restart.unwrap_or(false)).await;
        }
        self.lifecycle.finish_terminate();
        Ok((None, Vec::new()))
    }

    async fn handle_terminate(&self, request: &Request) -> Result<(Option<Json>, Vec<Event>), DapperError> {
        let _args: TerminateArguments = parse_args(request).unwrap_or(TerminateArguments { restart: None });
        self.lifecycle.begin_terminate()?;
        if let Some(backend) = self.backend.lock().await.take() {
            let _ = backend.terminate().await;
        }
        self.lifecycle.finish_terminate();
        Ok((None, Vec::new()))
    }

    async fn handle_hot_reload(&self, request: &Request) -> Result<(Option<Json>, Vec<Event>), DapperError> {
        if !self.capabilities.lock().await.supports_hot_reload.unwrap_or(false) {
            return Err(DapperError::CapabilityViolation("dapper/hotReload requires supportsHotReload".into()));
        }
        self.require_stopped().await?;
        let args: HotReloadArguments = parse_args(request)?;
        let backend = self.current_backend().await?;
        let mut session = self.session.lock().await;
        let body = crate::hot_reload::perform(&mut session, backend.as_ref(), &args.path).await?;
        drop(session);

        let loaded_source = Event {
            seq: 0,
            msg_type: "event".to_string(),
            event: "loadedSource".to_string(),
            body: Some(serde_json::json!({ "reason": "changed", "source": { "path": args.path } })),
        };
        let result_event = Event {
            seq: 0,
            msg_type: "event".to_string(),
            event: "dapper/hotReloadResult".to_string(),
            body: Some(serde_json::to_value(&body).map_err(protocol_err)?),
        };

        Ok((Some(serde_json::to_value(body).map_err(protocol_err)?), vec![loaded_source, result_event]))
    }

    async fn current_backend(&self) -> Result<Arc<BackendHandle>, DapperError> {
        self.backend
            .lock()
            .await
            .clone()
            .ok_or_else(|| DapperError::PreconditionFailed("no backend attached; launch or attach first".into()))
    }

    async fn require_stopped(&self) -> Result<(), DapperError> {
        if self.session.lock().await.is_stopped() {
            Ok(())
        } else {
            Err(DapperError::PreconditionFailed("session is not stopped".into()))
        }
    }
}

impl Default for RequestHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// A short tag unique enough to avoid colliding with another concurrent
/// session's IPC socket/pipe name on the same host.
fn launch_session_tag() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    format!("{}-{}", std::process::id(), COUNTER.fetch_add(1, Ordering::SeqCst))
}

fn default_capabilities() -> Capabilities {
    Capabilities {
        supports_configuration_done_request: Some(true),
        supports_evaluate_for_hovers: Some(true),
        supports_conditional_breakpoints: Some(true),
        supports_hit_conditional_breakpoints: Some(true),
        supports_log_points: Some(true),
        supports_exception_options: Some(false),
        supports_exception_filter_options: Some(true),
        supports_terminate_request: Some(true),
        supports_function_breakpoints: Some(true),
        supports_set_variable: Some(false),
        supports_set_expression: Some(true),
        supports_value_formatting_options: Some(false),
        support_terminate_debuggee: Some(true),
        supports_step_back: Some(false),
        supports_data_breakpoints: Some(true),
        supports_restart: Some(false),
        supports_hot_reload: Some(true),
        exception_breakpoint_filters: Some(vec![
            ExceptionBreakpointFilter { filter: "raised".to_string(), label: "Raised Exceptions".to_string(), default: Some(false) },
            ExceptionBreakpointFilter { filter: "uncaught".to_string(), label: "Uncaught Exceptions".to_string(), default: Some(true) },
        ]),
    }
}

fn parse_evaluation_context(raw: Option<&str>) -> EvaluationContext {
    match raw {
        Some("repl") => EvaluationContext::Repl,
        Some("clipboard") => EvaluationContext::Clipboard,
        Some("watch") => EvaluationContext::Watch,
        _ => EvaluationContext::Hover,
    }
}

fn parse_args<T: DeserializeOwned>(request: &Request) -> Result<T, DapperError> {
    let value = request.arguments.clone().unwrap_or(Json::Null);
    serde_json::from_value(value).map_err(|e| DapperError::Protocol(format!("invalid arguments for '{}': {e}", request.command)))
}

fn extract_thread_id(request: &Request) -> Result<i64, DapperError> {
    request
        .arguments
        .as_ref()
        .and_then(|v| v.get("threadId"))
        .and_then(Json::as_i64)
        .ok_or_else(|| DapperError::Protocol("threadId is required".into()))
}

fn protocol_err(e: serde_json::Error) -> DapperError {
    DapperError::Protocol(e.to_string())
}

fn success(request: &Request, body: Option<Json>) -> Response {
    Response {
        seq: 0,
        msg_type: "response".to_string(),
        request_seq: request.seq,
        success: true,
        command: request.command.clone(),
        message: None,
        body,
    }
}

fn failure(request: &Request, err: &DapperError) -> Response {
    Response {
        seq: 0,
        msg_type: "response".to_string(),
        request_seq: request.seq,
        success: false,
        command: request.command.clone(),
        message: Some(err.to_string()),
        body: None,
    }
}

#[derive(Debug, Default, serde::Deserialize)]
struct BreakpointVerification {
    id: i64,
    verified: bool,
    #[serde(default)]
    adjusted_line: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct RawThread {
    id: i64,
    name: String,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStackTrace {
    stack_frames: Vec<dapper_stack::StackFrame>,
    #[serde(default)]
    total_frames: Option<i64>,
}

fn to_protocol_source(source: dapper_stack::Source) -> Source {
    Source {
        path: source.path,
        name: source.name,
        source_reference: source.source_reference,
        origin: source.origin,
        presentation_hint: source.presentation_hint.map(|h| format!("{h:?}").to_lowercase()),
    }
}

fn to_protocol_frame(frame: dapper_stack::StackFrame) -> ProtocolStackFrame {
    ProtocolStackFrame {
        id: frame.id,
        name: frame.name,
        source: frame.source.map(to_protocol_source),
        line: frame.line,
        column: frame.column,
        end_line: frame.end_line,
        end_column: frame.end_column,
        presentation_hint: frame.presentation_hint.map(|h| match h {
            StackFramePresentationHint::Normal => "normal".to_string(),
            StackFramePresentationHint::Label => "label".to_string(),
            StackFramePresentationHint::Subtle => "subtle".to_string(),
        }),
        can_restart: frame.can_restart,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(seq: i64, command: &str, args: Option<Json>) -> Request {
        Request { seq, msg_type: "request".to_string(), command: command.to_string(), arguments: args }
    }

    #[tokio::test]
    async fn unknown_command_is_a_protocol_error() {
        let handler = RequestHandler::new();
        let outcome = handler.dispatch(request(1, "bogus", None)).await;
        assert!(!outcome.response.success);
        assert_eq!(outcome.response.message.unwrap(), "protocol error: unknown command 'bogus'");
    }

    #[tokio::test]
    async fn initialize_emits_initialized_event_and_returns_capabilities() {
        let handler = RequestHandler::new();
        let args = serde_json::json!({"adapterId": "dapper"});
        let outcome = handler.dispatch(request(1, "initialize", Some(args))).await;

        assert!(outcome.response.success);
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].event, "initialized");
        assert_eq!(handler.lifecycle.state(), crate::lifecycle::LifecycleState::Ready);
    }

    #[tokio::test]
    async fn configuration_done_is_idempotent_through_dispatch() {
        let handler = RequestHandler::new();
        let first = handler.dispatch(request(1, "configurationDone", None)).await;
        let second = handler.dispatch(request(2, "configurationDone", None)).await;
        assert!(first.response.success);
        assert!(second.response.success);
    }

    #[tokio::test]
    async fn stack_trace_without_backend_is_precondition_failed() {
        let handler = RequestHandler::new();
        handler.session.lock().await.mark_stopped();
        let args = serde_json::json!({"threadId": 1});
        let outcome = handler.dispatch(request(1, "stackTrace", Some(args))).await;
        assert!(!outcome.response.success);
        assert!(outcome.response.message.unwrap().contains("no backend attached"));
    }

    #[tokio::test]
    async fn resume_while_not_stopped_is_precondition_failed() {
        let handler = RequestHandler::new();
        let args = serde_json::json!({"threadId": 1});
        let outcome = handler.dispatch(request(1, "next", Some(args))).await;
        assert!(!outcome.response.success);
        assert!(outcome.response.message.unwrap().contains("not stopped"));
    }

    #[tokio::test]
    async fn set_data_breakpoints_respects_capability_gate() {
        let handler = RequestHandler::new();
        handler.capabilities.lock().await.supports_data_breakpoints = Some(false);
        let args = serde_json::json!({"breakpoints": []});
        let outcome = handler.dispatch(request(1, "setDataBreakpoints", Some(args))).await;
        assert!(!outcome.response.success);
        assert!(outcome.response.message.unwrap().contains("capability violation"));
    }

    #[test]
    fn log_message_holes_still_parse_through_logpoint_module() {
        let parts = logpoint::parse("x = {x}");
        assert_eq!(parts.len(), 2);
    }

    struct FlakyExecutor {
        calls: std::sync::atomic::AtomicUsize,
        fail_times: usize,
    }

    #[async_trait::async_trait]
    impl crate::backend::in_process::InProcessExecutor for FlakyExecutor {
        async fn initialize(&self) -> Result<Json, DapperError> {
            Ok(Json::Null)
        }
        async fn launch(&self, _config: Json) -> Result<Json, DapperError> {
            Ok(Json::Null)
        }
        async fn attach(&self, _config: Json) -> Result<Json, DapperError> {
            Ok(Json::Null)
        }
        async fn set_breakpoints(&self, _path: &str, _breakpoints: Json) -> Result<Json, DapperError> {
            Ok(Json::Null)
        }
        async fn set_function_breakpoints(&self, _breakpoints: Json) -> Result<Json, DapperError> {
            Ok(Json::Null)
        }
        async fn set_exception_breakpoints(&self, _filters: Json) -> Result<Json, DapperError> {
            Ok(Json::Null)
        }
        async fn set_data_breakpoints(&self, _breakpoints: Json) -> Result<Json, DapperError> {
            Ok(Json::Null)
        }
        async fn data_breakpoint_info(&self, _target: Json) -> Result<Json, DapperError> {
            Ok(Json::Null)
        }
        async fn threads(&self) -> Result<Json, DapperError> {
            let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n < self.fail_times {
                Err(DapperError::Backend("debuggee unreachable".to_string()))
            } else {
                Ok(serde_json::json!({"threads": []}))
            }
        }
        async fn stack_trace(&self, _args: Json) -> Result<Json, DapperError> {
            Ok(Json::Null)
        }
        async fn scopes(&self, _frame_id: i64) -> Result<Json, DapperError> {
            Ok(Json::Null)
        }
        async fn variables(&self, _args: Json) -> Result<Json, DapperError> {
            Ok(Json::Null)
        }
        async fn evaluate(&self, _args: Json) -> Result<Json, DapperError> {
            Ok(Json::Null)
        }
        async fn set_expression(&self, _args: Json) -> Result<Json, DapperError> {
            Ok(Json::Null)
        }
        async fn resume(&self, _kind: ResumeKind, _thread_id: i64) -> Result<Json, DapperError> {
            Ok(Json::Null)
        }
        async fn disconnect(&self, _restart: bool) -> Result<(), DapperError> {
            Ok(())
        }
        async fn terminate(&self) -> Result<(), DapperError> {
            Ok(())
        }
        async fn hot_reload(&self, _args: Json) -> Result<Option<Json>, DapperError> {
            Ok(None)
        }
    }

    async fn handler_with_flaky_backend(fail_times: usize) -> RequestHandler {
        let handler = RequestHandler::new();
        let executor = FlakyExecutor { calls: std::sync::atomic::AtomicUsize::new(0), fail_times };
        *handler.backend.lock().await =
            Some(Arc::new(BackendHandle::InProcess(InProcessBackend::new(Arc::new(executor)))));
        handler.lifecycle.begin_initialize().unwrap();
        handler.lifecycle.finish_initialize().unwrap();
        handler
    }

    #[tokio::test]
    async fn backend_error_recovers_to_ready_after_one_successful_retry() {
        let handler = handler_with_flaky_backend(1).await;
        let outcome = handler.dispatch(request(1, "threads", None)).await;
        assert!(outcome.response.success);
        assert_eq!(handler.lifecycle.state(), crate::lifecycle::LifecycleState::Ready);
    }

    #[tokio::test]
    async fn backend_error_terminates_session_when_retry_also_fails() {
        let handler = handler_with_flaky_backend(usize::MAX).await;
        let outcome = handler.dispatch(request(1, "threads", None)).await;
        assert!(!outcome.response.success);
        assert_eq!(handler.lifecycle.state(), crate::lifecycle::LifecycleState::Terminated);
    }
}
