//! Session Orchestrator: the DAP request loop and the session state machine.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use onec_config::{AdapterConfig, SessionConfig};
use onec_rdbg::{
    AttachDebugUiResult, DebugServerClient, DebugServerConnector, DebugUi, DebuggerOptions,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
    task::{JoinHandle, JoinSet},
};
use tokio_util::sync::CancellationToken;

use crate::config::{parse_target_types, LaunchConfig};
use crate::dap::codec::{sanitize_json_error_message, DapError, DapReader, DapWriter};
use crate::dap::messages::Request;
use crate::dap::types::{
    AttachDebugTargetArguments, Capabilities, EvaluateArguments, ExceptionBreakpointsFilter,
    InitializeArguments, ScopesArguments, SetAutoAttachTargetTypesArguments,
    SetBreakpointsArguments, SetExceptionBreakpointsArguments, StackTraceArguments,
    StepArguments, VariablesArguments,
};
use crate::error::{DebugError, DebugResult, HandshakeFailure};
use crate::events::EventSink;
use crate::execution::{step_action, ExecutionControl};
use crate::inspect::Inspector;
use crate::launcher::ProcessLauncher;
use crate::metadata::MetadataProvider;
use crate::poller::{self, SessionEvent, SessionEventHandler};
use crate::session::{cancellable, check_cancel, Session};
use crate::targets::TargetRegistry;

/// External services a session depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub connector: Arc<dyn DebugServerConnector>,
    pub metadata: Arc<dyn MetadataProvider>,
    /// Without a launcher, starting a local debug server and the debuggee is
    /// left to the user.
    pub launcher: Option<Arc<dyn ProcessLauncher>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Attaching,
    Configuring,
    Running,
    Disconnecting,
    Terminated,
}

/// Runs the adapter over stdio with tracing set up from `config`.
pub async fn run_stdio(collaborators: Collaborators, config: AdapterConfig) -> anyhow::Result<()> {
    onec_config::init_tracing(&config.logging);
    run_with_config(
        tokio::io::stdin(),
        tokio::io::stdout(),
        collaborators,
        config.session,
    )
    .await
    .map_err(anyhow::Error::from)
}

pub async fn run<R, W>(reader: R, writer: W, collaborators: Collaborators) -> Result<(), DapError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    run_with_config(reader, writer, collaborators, SessionConfig::default()).await
}

/// Serves one debug session until `disconnect` or EOF on `reader`.
///
/// `initialize` and `disconnect` are handled inline; every other request runs
/// on its own task so a request waiting for the debug server never blocks the
/// ones behind it.
pub async fn run_with_config<R, W>(
    reader: R,
    writer: W,
    collaborators: Collaborators,
    settings: SessionConfig,
) -> Result<(), DapError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();
    let writer_task = tokio::spawn(async move {
        let mut writer = DapWriter::new(writer);
        while let Some(msg) = out_rx.recv().await {
            if let Err(err) = writer.write_value(&msg).await {
                tracing::warn!(error = %err, "failed to write DAP message");
                break;
            }
        }
    });

    let adapter = Arc::new(Adapter::new(collaborators, settings, EventSink::new(out_tx)));
    let mut reader = DapReader::new(reader);
    let mut tasks = JoinSet::new();

    let result = loop {
        while tasks.try_join_next().is_some() {}

        let request = match reader.read_request().await {
            Ok(Some(request)) => request,
            Ok(None) => break Ok(()),
            Err(DapError::Json(err)) => {
                tracing::warn!(error = %err, "ignoring malformed DAP message");
                continue;
            }
            Err(err) => break Err(err),
        };
        if !request.is_request() {
            continue;
        }
        tracing::debug!(command = %request.command, seq = request.seq, "DAP request");

        match request.command.as_str() {
            "initialize" => adapter.initialize(&request),
            "disconnect" => {
                adapter.disconnect(Some(&request)).await;
                break Ok(());
            }
            _ => {
                let adapter = adapter.clone();
                tasks.spawn(async move { adapter.handle(request).await });
            }
        }
    };

    adapter.disconnect(None).await;
    while tasks.join_next().await.is_some() {}
    drop(adapter);
    let _ = writer_task.await;
    result
}

/// The components that exist once the debugger UI is attached.
struct Engine {
    session: Arc<Session>,
    registry: Arc<TargetRegistry>,
    inspector: Arc<Inspector>,
    execution: ExecutionControl,
}

impl Engine {
    fn new(session: Arc<Session>, metadata: Arc<dyn MetadataProvider>, events: EventSink) -> Self {
        let registry = Arc::new(TargetRegistry::new(session.clone(), events.clone()));
        let inspector = Arc::new(Inspector::new(
            session.clone(),
            registry.clone(),
            metadata.clone(),
            events.clone(),
        ));
        let execution = ExecutionControl::new(
            session.clone(),
            registry.clone(),
            inspector.clone(),
            metadata,
            events,
        );
        Self {
            session,
            registry,
            inspector,
            execution,
        }
    }
}

#[async_trait]
impl SessionEventHandler for Engine {
    async fn handle(&self, event: SessionEvent) -> DebugResult<()> {
        match event {
            SessionEvent::TargetStarted(target) => {
                self.registry.on_target_started(target).await?;
            }
            SessionEvent::TargetQuit(target) => {
                for thread_id in self.registry.on_target_quit(&target).await? {
                    self.inspector.forget_thread(thread_id);
                }
            }
            SessionEvent::CallStackFormed(info) => {
                if self.registry.is_attached(&info.target_id.id) {
                    self.inspector.on_call_stack_formed(info)?;
                } else {
                    tracing::debug!(target_id = %info.target_id.id, "call stack of a detached target");
                }
            }
            SessionEvent::RuntimeError(info) => {
                if self.registry.is_attached(&info.target_id.id) {
                    self.inspector.on_runtime_error(info)?;
                } else {
                    tracing::debug!(target_id = %info.target_id.id, "runtime error of a detached target");
                }
            }
            SessionEvent::ExprEvaluated(result) => self.inspector.on_expr_evaluated(result),
        }
        Ok(())
    }
}

struct Adapter {
    collaborators: Collaborators,
    settings: SessionConfig,
    events: EventSink,
    token: CancellationToken,
    state: Mutex<SessionState>,
    lines_start_at1: AtomicBool,
    engine: Mutex<Option<Arc<Engine>>>,
    /// The debugger UI the server may know about. Whoever takes it detaches.
    attached_ui: Mutex<Option<(Arc<dyn DebugServerClient>, DebugUi)>>,
    poller: Mutex<Option<JoinHandle<()>>>,
    disconnected: AtomicBool,
}

impl Adapter {
    fn new(collaborators: Collaborators, settings: SessionConfig, events: EventSink) -> Self {
        Self {
            collaborators,
            settings,
            events,
            token: CancellationToken::new(),
            state: Mutex::new(SessionState::Uninitialized),
            lines_start_at1: AtomicBool::new(true),
            engine: Mutex::new(None),
            attached_ui: Mutex::new(None),
            poller: Mutex::new(None),
            disconnected: AtomicBool::new(false),
        }
    }

    fn engine(&self) -> DebugResult<Arc<Engine>> {
        self.engine.lock().clone().ok_or(DebugError::NotAttached)
    }

    fn transition(&self, from: SessionState, to: SessionState) -> DebugResult<()> {
        let mut state = self.state.lock();
        if *state != from {
            return Err(DebugError::InvalidRequest(format!(
                "session is {:?}, expected {from:?}",
                *state
            )));
        }
        *state = to;
        Ok(())
    }

    fn initialize(&self, request: &Request) {
        let args: InitializeArguments = match parse_args(request) {
            Ok(args) => args,
            Err(err) => {
                self.events.failure(request, err.to_string());
                return;
            }
        };
        if let Err(err) = self.transition(SessionState::Uninitialized, SessionState::Initialized) {
            self.events.failure(request, err.to_string());
            return;
        }

        let lines_start_at1 = args.lines_start_at1.unwrap_or(true);
        self.lines_start_at1.store(lines_start_at1, Ordering::SeqCst);
        tracing::debug!(client = ?args.client_id, lines_start_at1, "client initialized");
        self.events
            .success(request, serde_json::to_value(capabilities()).ok());
    }

    async fn handle(self: Arc<Self>, request: Request) {
        let command = request.command.as_str();
        let Some(context) = failure_context(command) else {
            self.events
                .failure(&request, format!("unsupported request {command}"));
            return;
        };

        match self.dispatch(&request).await {
            Ok(body) => {
                self.events.success(&request, body);
                if matches!(command, "launch" | "attach") {
                    self.events.event("initialized", None);
                }
            }
            Err(err) if err.is_cancelled() => self.events.failure(&request, "cancelled"),
            Err(err) => {
                if matches!(err, DebugError::Backend(_)) {
                    self.events.error_output(err.to_string());
                }
                tracing::debug!(command, error = %err, "request failed");
                self.events.failure(&request, format!("{context}: {err}"));
            }
        }
    }

    async fn dispatch(&self, request: &Request) -> DebugResult<Option<Value>> {
        match request.command.as_str() {
            "launch" => self.launch_or_attach(request, true).await,
            "attach" => self.launch_or_attach(request, false).await,
            "configurationDone" => {
                self.transition(SessionState::Configuring, SessionState::Running)?;
                Ok(None)
            }
            "setBreakpoints" => {
                let args: SetBreakpointsArguments = parse_args(request)?;
                let breakpoints = self
                    .engine()?
                    .execution
                    .set_breakpoints(&args.source, &args.breakpoints)
                    .await?;
                Ok(Some(json!({ "breakpoints": breakpoints })))
            }
            "setExceptionBreakpoints" => {
                let args: SetExceptionBreakpointsArguments = parse_args(request)?;
                let breakpoints = self.engine()?.execution.set_exception_filters(&args).await?;
                Ok(Some(json!({ "breakpoints": breakpoints })))
            }
            "threads" => {
                let threads = match self.engine() {
                    Ok(engine) => engine.registry.threads(),
                    Err(_) => Vec::new(),
                };
                Ok(Some(json!({ "threads": threads })))
            }
            "stackTrace" => {
                let args: StackTraceArguments = parse_args(request)?;
                let trace = self
                    .engine()?
                    .inspector
                    .stack_trace(args.thread_id, args.start_frame.unwrap_or(0), args.levels)
                    .await?;
                Ok(Some(json!({
                    "stackFrames": trace.frames,
                    "totalFrames": trace.total_frames,
                })))
            }
            "scopes" => {
                let args: ScopesArguments = parse_args(request)?;
                let scopes = self.engine()?.inspector.scopes(args.frame_id)?;
                Ok(Some(json!({ "scopes": scopes })))
            }
            "variables" => {
                let args: VariablesArguments = parse_args(request)?;
                let variables = self
                    .engine()?
                    .inspector
                    .variables(args.variables_reference)
                    .await?;
                Ok(Some(json!({ "variables": variables })))
            }
            "evaluate" => {
                let args: EvaluateArguments = parse_args(request)?;
                let frame_id = args.frame_id.ok_or_else(|| {
                    DebugError::InvalidRequest("evaluate.frameId is required".to_string())
                })?;
                let result = self
                    .engine()?
                    .inspector
                    .evaluate(&args.expression, frame_id)
                    .await?;
                Ok(serde_json::to_value(result).ok())
            }
            "continue" | "next" | "stepIn" | "stepOut" => {
                let command = request.command.as_str();
                let action = step_action(command).ok_or_else(|| {
                    DebugError::InvalidRequest(format!("unsupported request {command}"))
                })?;
                let args: StepArguments = parse_args(request)?;
                let all_threads_continued = self
                    .engine()?
                    .execution
                    .step(args.thread_id, action, args.single_thread.unwrap_or(false))
                    .await?;
                Ok((command == "continue")
                    .then(|| json!({ "allThreadsContinued": all_threads_continued })))
            }
            "DebugTargetsRequest" => {
                let items = self.engine()?.registry.unattached_targets().await?;
                Ok(Some(json!({ "items": items })))
            }
            "AttachDebugTargetRequest" => {
                let args: AttachDebugTargetArguments = parse_args(request)?;
                self.engine()?.registry.attach_by_id(&args.id).await?;
                Ok(None)
            }
            "SetAutoAttachTargetTypesRequest" => {
                let args: SetAutoAttachTargetTypesArguments = parse_args(request)?;
                let kinds = parse_target_types(&args.types)?;
                self.engine()?.registry.set_auto_attach_types(kinds).await?;
                Ok(None)
            }
            other => Err(DebugError::InvalidRequest(format!(
                "unsupported request {other}"
            ))),
        }
    }

    async fn launch_or_attach(&self, request: &Request, launch: bool) -> DebugResult<Option<Value>> {
        let config = LaunchConfig::from_value(request.arguments.clone().unwrap_or(Value::Null))?;
        self.transition(SessionState::Initialized, SessionState::Attaching)?;

        let outcome = self.start_session(config, launch).await;
        let mut state = self.state.lock();
        if *state == SessionState::Attaching {
            *state = match &outcome {
                Ok(()) => SessionState::Configuring,
                Err(_) => SessionState::Initialized,
            };
        }
        outcome.map(|()| None)
    }

    /// The attach handshake followed by bringing up the session components.
    async fn start_session(&self, config: LaunchConfig, launch: bool) -> DebugResult<()> {
        let auto_attach = config.auto_attach_kinds()?;
        let token = &self.token;

        if config.file_info_base {
            match &self.collaborators.launcher {
                Some(launcher) => launcher.start_debug_server(&config).await?,
                None => tracing::debug!("no process launcher, expecting a running debug server"),
            }
        }

        let endpoint = config.endpoint();
        tracing::debug!(host = %endpoint.host, port = endpoint.port, "connecting to debug server");
        let client = cancellable(token, self.collaborators.connector.connect(&endpoint))
            .await
            .map_err(as_unreachable)?;
        cancellable(token, client.test()).await.map_err(as_unreachable)?;

        let ui = DebugUi {
            id: uuid::Uuid::new_v4().to_string(),
            infobase_alias: config.info_base.clone(),
        };
        let options = DebuggerOptions {
            foreground_ability: true,
        };
        // Recorded before the request goes out: a disconnect racing the
        // attach must still detach.
        *self.attached_ui.lock() = Some((client.clone(), ui.clone()));
        check_cancel(token)?;
        let outcome = match cancellable(token, client.attach_debug_ui(&ui, options)).await {
            Ok(outcome) => outcome,
            Err(err) => {
                if !err.is_cancelled() {
                    self.attached_ui.lock().take();
                }
                return Err(err);
            }
        };
        if let Some(failure) = classify_attach(outcome) {
            self.attached_ui.lock().take();
            tracing::error!(?outcome, infobase = %config.info_base, "debug server rejected the debugger UI");
            return Err(failure.into());
        }
        tracing::debug!(ui = %ui.id, ?outcome, "debugger UI attached");
        let metadata = self.collaborators.metadata.init(&config).await;
        if let Err(err) = metadata.and_then(|()| check_cancel(token)) {
            self.detach_ui().await;
            return Err(err);
        }

        let session = Arc::new(Session {
            ui,
            client,
            token: token.clone(),
            settings: self.settings.clone(),
            lines_start_at1: self.lines_start_at1.load(Ordering::SeqCst),
        });
        let engine = Arc::new(Engine::new(
            session.clone(),
            self.collaborators.metadata.clone(),
            self.events.clone(),
        ));
        *self.engine.lock() = Some(engine.clone());

        let handle = poller::spawn(session.clone(), engine.clone(), self.events.clone());
        *self.poller.lock() = Some(handle);

        if let Err(err) = engine.registry.set_auto_attach_types(auto_attach).await {
            if err.is_cancelled() {
                return Err(err);
            }
            tracing::warn!(error = %err, "failed to apply auto-attach target types");
            self.events
                .error_output(format!("Failed to apply auto-attach target types: {err}"));
        }

        if launch {
            match &self.collaborators.launcher {
                Some(launcher) => {
                    if let Err(err) = launcher.start_debuggee(&config, &session.ui).await {
                        tracing::warn!(error = %err, "failed to start the debuggee");
                        self.events
                            .error_output(format!("Failed to start the debuggee: {err}"));
                    }
                }
                None => tracing::debug!("no process launcher, debuggee must be started manually"),
            }
        }
        Ok(())
    }

    /// Sends `detachDebugUI` for the recorded UI, if any. Runs after the
    /// session token may be cancelled, so it is bounded by its own timeout.
    async fn detach_ui(&self) {
        let Some((client, ui)) = self.attached_ui.lock().take() else {
            return;
        };
        let timeout = self.settings.detach_timeout();
        match tokio::time::timeout(timeout, client.detach_debug_ui(&ui)).await {
            Ok(Ok(())) => tracing::debug!(ui = %ui.id, "debugger UI detached"),
            Ok(Err(err)) => tracing::warn!(error = %err, "failed to detach debugger UI"),
            Err(_) => tracing::warn!(?timeout, "detaching debugger UI timed out"),
        }
    }

    /// Tears the session down once. Later calls only answer `request`.
    async fn disconnect(&self, request: Option<&Request>) {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            if let Some(request) = request {
                self.events.success(request, None);
            }
            return;
        }
        *self.state.lock() = SessionState::Disconnecting;

        self.token.cancel();
        let poller = self.poller.lock().take();
        if let Some(handle) = poller {
            let _ = handle.await;
        }
        self.engine.lock().take();
        self.detach_ui().await;

        *self.state.lock() = SessionState::Terminated;
        tracing::debug!("session terminated");
        if let Some(request) = request {
            self.events.success(request, None);
        }
        self.events.event("terminated", None);
    }
}

fn parse_args<T: DeserializeOwned>(request: &Request) -> DebugResult<T> {
    request.parse_args().map_err(|err| {
        DebugError::InvalidRequest(format!(
            "{}: {}",
            request.command,
            sanitize_json_error_message(&err.to_string())
        ))
    })
}

fn as_unreachable(err: DebugError) -> DebugError {
    if err.is_cancelled() {
        return err;
    }
    tracing::error!(error = %err, "debug server is unreachable");
    HandshakeFailure::ServerUnreachable.into()
}

/// Outcomes of the UI attach that abort the session.
pub fn classify_attach(outcome: AttachDebugUiResult) -> Option<HandshakeFailure> {
    match outcome {
        AttachDebugUiResult::Unknown => Some(HandshakeFailure::Unknown),
        AttachDebugUiResult::IbInDebug => Some(HandshakeFailure::AlreadyDebugged),
        AttachDebugUiResult::NotRegistered => Some(HandshakeFailure::ServerUnreachable),
        AttachDebugUiResult::CredentialsRequired
        | AttachDebugUiResult::FullCredentialsRequired => {
            Some(HandshakeFailure::CredentialsRequired)
        }
        AttachDebugUiResult::Registered => None,
    }
}

fn failure_context(command: &str) -> Option<&'static str> {
    Some(match command {
        "launch" | "attach" => "Failed to attach to the debug server",
        "configurationDone" => "Failed to finish configuration",
        "setBreakpoints" => "Failed to set breakpoints",
        "setExceptionBreakpoints" => "Failed to configure stopping on runtime errors",
        "threads" => "Failed to list threads",
        "stackTrace" => "Failed to get the call stack",
        "scopes" => "Failed to get variable scopes",
        "variables" => "Failed to get variables",
        "evaluate" => "Failed to evaluate expression",
        "continue" | "next" | "stepIn" | "stepOut" => "Failed to send step command",
        "DebugTargetsRequest" => "Failed to list debug targets",
        "AttachDebugTargetRequest" => "Failed to attach debug target",
        "SetAutoAttachTargetTypesRequest" => "Failed to set auto-attach target types",
        _ => return None,
    })
}

pub fn capabilities() -> Capabilities {
    Capabilities {
        supports_configuration_done_request: true,
        supports_evaluate_for_hovers: true,
        supports_exception_filter_options: true,
        supports_conditional_breakpoints: true,
        supports_log_points: true,
        supports_single_thread_execution_requests: true,
        exception_breakpoint_filters: vec![ExceptionBreakpointsFilter {
            filter: "all".to_string(),
            label: "Stop on runtime error".to_string(),
            description: "Break when a runtime error is raised".to_string(),
            supports_condition: true,
            condition_description: "Substring of the exception text".to_string(),
        }],
    }
}
