use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::{
    AttachDebugUiResult, CalculationResult, DebugServerClient, DebugServerConnector,
    DebugTargetId, DebugTargetIdLight, DebugTargetType, DebugUi, DebuggerOptions, Endpoint,
    EvalRequest, EvaluationResult, ModuleBreakpoints, Notification, PathStep, RdbgError, Result,
    RteFilter, StepAction, TargetState, TargetStateItem, ValueInfo, ViewInterface,
};

/// An in-memory debug server used for unit/integration testing.
///
/// It records every command it receives and answers from canned data, so the
/// adapter can be exercised without a platform installation. Clones share
/// state.
#[derive(Clone, Default)]
pub struct MockDebugServer {
    state: Arc<State>,
}

#[derive(Clone, Debug)]
pub struct MockDebugServerConfig {
    /// Reply to `attachDebugUI`.
    pub attach_result: AttachDebugUiResult,
    /// When set, evaluation commands reply with no result and deliver it as an
    /// `ExprEvaluated` notification instead.
    pub deferred_evaluations: bool,
    /// How long an empty `pingDebugUI` is held open before returning.
    pub ping_hold: Duration,
    /// When set, `connect` fails as if the server were not listening.
    pub unreachable: bool,
    /// How long `attachDebugUI` takes to answer.
    pub attach_hold: Duration,
}

impl Default for MockDebugServerConfig {
    fn default() -> Self {
        Self {
            attach_result: AttachDebugUiResult::Registered,
            deferred_evaluations: false,
            ping_hold: Duration::from_millis(20),
            unreachable: false,
            attach_hold: Duration::ZERO,
        }
    }
}

/// Canned answer for one evaluation path.
#[derive(Clone, Debug)]
pub enum EvalReply {
    Value {
        value: ValueInfo,
        calculation: CalculationResult,
    },
    Error(String),
}

impl EvalReply {
    pub fn value(value: ValueInfo, calculation: CalculationResult) -> Self {
        Self::Value { value, calculation }
    }
}

/// A command received by the mock, with the arguments that matter to tests.
#[derive(Clone, Debug, PartialEq)]
pub enum MockCall {
    Test,
    AttachDebugUi { ui: DebugUi },
    DetachDebugUi,
    DebugTargets,
    SetAutoAttachSettings(Vec<DebugTargetType>),
    ClearBreakOnNextStatement,
    AttachDetachTargets {
        attach: bool,
        targets: Vec<DebugTargetIdLight>,
    },
    SetBreakpoints(Vec<ModuleBreakpoints>),
    SetBreakOnRte(RteFilter),
    EvalLocalVariables(EvalRequest),
    EvalExpr(EvalRequest),
    Step {
        target: DebugTargetIdLight,
        action: StepAction,
    },
}

impl MockCall {
    fn command(&self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::AttachDebugUi { .. } => "attachDebugUI",
            Self::DetachDebugUi => "detachDebugUI",
            Self::DebugTargets => "getDbgTargets",
            Self::SetAutoAttachSettings(_) => "setAutoAttachSettings",
            Self::ClearBreakOnNextStatement => "clearBreakOnNextStatement",
            Self::AttachDetachTargets { .. } => "attachDetachDbgTargets",
            Self::SetBreakpoints(_) => "setBreakpoints",
            Self::SetBreakOnRte(_) => "setBreakOnRTE",
            Self::EvalLocalVariables(_) => "evalLocalVariables",
            Self::EvalExpr(_) => "evalExpr",
            Self::Step { .. } => "step",
        }
    }
}

type StepHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct State {
    config: Mutex<MockDebugServerConfig>,
    calls: Mutex<Vec<MockCall>>,
    endpoint: Mutex<Option<Endpoint>>,
    targets: Mutex<Vec<DebugTargetId>>,
    attached: Mutex<HashSet<String>>,
    auto_attach: Mutex<Vec<DebugTargetType>>,
    eval_replies: Mutex<HashMap<(Vec<PathStep>, ViewInterface), EvalReply>>,
    step_states: Mutex<Option<Vec<TargetStateItem>>>,
    step_hook: Mutex<Option<StepHook>>,
    failures: Mutex<HashMap<&'static str, String>>,
    notifications: Mutex<VecDeque<Notification>>,
    notified: Notify,
}

impl MockDebugServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: MockDebugServerConfig) -> Self {
        let server = Self::default();
        *server.state.config.lock() = config;
        server
    }

    pub fn set_attach_result(&self, result: AttachDebugUiResult) {
        self.state.config.lock().attach_result = result;
    }

    pub fn set_deferred_evaluations(&self, deferred: bool) {
        self.state.config.lock().deferred_evaluations = deferred;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.config.lock().unreachable = unreachable;
    }

    /// Makes every following call of `command` (wire command name, e.g.
    /// `"step"`) fail with a server error.
    pub fn fail_command(&self, command: &'static str, message: impl Into<String>) {
        self.state.failures.lock().insert(command, message.into());
    }

    pub fn clear_failure(&self, command: &'static str) {
        self.state.failures.lock().remove(command);
    }

    /// Registers a running target without announcing it.
    pub fn add_target(&self, target: DebugTargetId) {
        self.state.targets.lock().push(target);
    }

    /// Registers a running target and queues a `TargetStarted` notification.
    pub fn start_target(&self, target: DebugTargetId) {
        self.add_target(target.clone());
        self.push_notification(Notification::target_started(target));
    }

    /// Drops a target and queues a `TargetQuit` notification.
    pub fn quit_target(&self, target: &DebugTargetId) {
        self.state.targets.lock().retain(|t| t.id != target.id);
        self.state.attached.lock().remove(&target.id);
        self.push_notification(Notification::target_quit(target.clone()));
    }

    pub fn push_notification(&self, notification: Notification) {
        self.state.notifications.lock().push_back(notification);
        self.state.notified.notify_waiters();
    }

    pub fn set_eval_reply(&self, path: Vec<PathStep>, view: ViewInterface, reply: EvalReply) {
        self.state.eval_replies.lock().insert((path, view), reply);
    }

    /// Overrides the target states returned by `step`. By default only the
    /// stepped target is reported as running.
    pub fn set_step_states(&self, states: Vec<TargetStateItem>) {
        *self.state.step_states.lock() = Some(states);
    }

    /// Runs `hook` inside every `step` call, before the reply is returned.
    pub fn set_step_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.state.step_hook.lock() = Some(Arc::new(hook));
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.calls.lock().clone()
    }

    pub fn calls_of(&self, command: &str) -> Vec<MockCall> {
        self.state
            .calls
            .lock()
            .iter()
            .filter(|call| call.command() == command)
            .cloned()
            .collect()
    }

    pub fn endpoint(&self) -> Option<Endpoint> {
        self.state.endpoint.lock().clone()
    }

    pub fn attached_targets(&self) -> HashSet<String> {
        self.state.attached.lock().clone()
    }

    pub fn auto_attach(&self) -> Vec<DebugTargetType> {
        self.state.auto_attach.lock().clone()
    }

    fn record(&self, call: MockCall) -> Result<()> {
        let command = call.command();
        tracing::trace!(command, "mock debug server call");
        self.state.calls.lock().push(call);
        match self.state.failures.lock().get(command) {
            Some(message) => Err(RdbgError::Server(message.clone())),
            None => Ok(()),
        }
    }

    fn evaluate(&self, request: &EvalRequest) -> Result<Option<EvaluationResult>> {
        let view = request
            .interfaces
            .first()
            .copied()
            .unwrap_or(ViewInterface::Context);
        let reply = self
            .state
            .eval_replies
            .lock()
            .get(&(request.path.clone(), view))
            .cloned()
            .ok_or_else(|| {
                RdbgError::Server(format!("no value for path {:?} ({view:?})", request.path))
            })?;

        let result = match reply {
            EvalReply::Value { value, calculation } => EvaluationResult {
                result_id: request.result_id.clone(),
                error_occurred: false,
                exception: String::new(),
                value,
                calculation,
            },
            EvalReply::Error(exception) => EvaluationResult {
                result_id: request.result_id.clone(),
                error_occurred: true,
                exception,
                value: ValueInfo::default(),
                calculation: CalculationResult::empty(view),
            },
        };

        if self.state.config.lock().deferred_evaluations {
            self.push_notification(Notification::expr_evaluated(result));
            Ok(None)
        } else {
            Ok(Some(result))
        }
    }
}

#[async_trait]
impl DebugServerClient for MockDebugServer {
    async fn test(&self) -> Result<()> {
        self.record(MockCall::Test)
    }

    async fn attach_debug_ui(
        &self,
        ui: &DebugUi,
        _options: DebuggerOptions,
    ) -> Result<AttachDebugUiResult> {
        self.record(MockCall::AttachDebugUi { ui: ui.clone() })?;
        let (hold, result) = {
            let config = self.state.config.lock();
            (config.attach_hold, config.attach_result)
        };
        if !hold.is_zero() {
            tokio::time::sleep(hold).await;
        }
        Ok(result)
    }

    async fn detach_debug_ui(&self, _ui: &DebugUi) -> Result<()> {
        self.record(MockCall::DetachDebugUi)
    }

    async fn debug_targets(&self, _ui: &DebugUi) -> Result<Vec<DebugTargetId>> {
        self.record(MockCall::DebugTargets)?;
        Ok(self.state.targets.lock().clone())
    }

    async fn set_auto_attach_settings(
        &self,
        _ui: &DebugUi,
        kinds: &[DebugTargetType],
    ) -> Result<()> {
        self.record(MockCall::SetAutoAttachSettings(kinds.to_vec()))?;
        *self.state.auto_attach.lock() = kinds.to_vec();
        Ok(())
    }

    async fn clear_break_on_next_statement(&self, _ui: &DebugUi) -> Result<()> {
        self.record(MockCall::ClearBreakOnNextStatement)
    }

    async fn attach_detach_targets(
        &self,
        _ui: &DebugUi,
        attach: bool,
        targets: &[DebugTargetIdLight],
    ) -> Result<()> {
        self.record(MockCall::AttachDetachTargets {
            attach,
            targets: targets.to_vec(),
        })?;
        let mut attached = self.state.attached.lock();
        for target in targets {
            if attach {
                attached.insert(target.id.clone());
            } else {
                attached.remove(&target.id);
            }
        }
        Ok(())
    }

    async fn set_breakpoints(&self, _ui: &DebugUi, modules: Vec<ModuleBreakpoints>) -> Result<()> {
        self.record(MockCall::SetBreakpoints(modules))
    }

    async fn set_break_on_rte(&self, _ui: &DebugUi, filter: RteFilter) -> Result<()> {
        self.record(MockCall::SetBreakOnRte(filter))
    }

    async fn eval_local_variables(
        &self,
        _ui: &DebugUi,
        request: EvalRequest,
    ) -> Result<Option<EvaluationResult>> {
        self.record(MockCall::EvalLocalVariables(request.clone()))?;
        self.evaluate(&request)
    }

    async fn eval_expr(
        &self,
        _ui: &DebugUi,
        request: EvalRequest,
    ) -> Result<Option<EvaluationResult>> {
        self.record(MockCall::EvalExpr(request.clone()))?;
        self.evaluate(&request)
    }

    async fn step(
        &self,
        _ui: &DebugUi,
        target: &DebugTargetIdLight,
        action: StepAction,
    ) -> Result<Vec<TargetStateItem>> {
        self.record(MockCall::Step {
            target: target.clone(),
            action,
        })?;
        let hook = self.state.step_hook.lock().clone();
        if let Some(hook) = hook {
            hook();
        }
        let states = self.state.step_states.lock().clone();
        Ok(states.unwrap_or_else(|| {
            vec![TargetStateItem {
                target_id: target.clone(),
                state: TargetState::Worked,
            }]
        }))
    }

    async fn ping_debug_ui(&self, _ui: &DebugUi) -> Result<Vec<Notification>> {
        if let Some(message) = self.state.failures.lock().get("pingDebugUIParams") {
            return Err(RdbgError::Server(message.clone()));
        }

        let hold = self.state.config.lock().ping_hold;
        let notified = self.state.notified.notified();
        if self.state.notifications.lock().is_empty() {
            let _ = tokio::time::timeout(hold, notified).await;
        }
        Ok(self.state.notifications.lock().drain(..).collect())
    }
}

#[async_trait]
impl DebugServerConnector for MockDebugServer {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn DebugServerClient>> {
        *self.state.endpoint.lock() = Some(endpoint.clone());
        if self.state.config.lock().unreachable {
            return Err(RdbgError::Transport(format!(
                "connection refused: {}:{}",
                endpoint.host, endpoint.port
            )));
        }
        Ok(Arc::new(self.clone()))
    }
}
