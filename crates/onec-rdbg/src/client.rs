use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    AttachDebugUiResult, DebugTargetId, DebugTargetIdLight, DebugTargetType, DebugUi,
    DebuggerOptions, Endpoint, EvalRequest, EvaluationResult, ModuleBreakpoints, Notification,
    Result, RteFilter, StepAction, TargetStateItem,
};

/// One command per debug server operation used by the adapter.
///
/// Implementations are shared between the request handlers and the
/// notification poller, so every method takes `&self` and may be called
/// concurrently.
#[async_trait]
pub trait DebugServerClient: Send + Sync {
    /// Connectivity check.
    async fn test(&self) -> Result<()>;

    async fn attach_debug_ui(
        &self,
        ui: &DebugUi,
        options: DebuggerOptions,
    ) -> Result<AttachDebugUiResult>;

    async fn detach_debug_ui(&self, ui: &DebugUi) -> Result<()>;

    /// Currently running targets of the infobase, attached or not.
    async fn debug_targets(&self, ui: &DebugUi) -> Result<Vec<DebugTargetId>>;

    /// Target kinds the server should attach automatically as they start.
    async fn set_auto_attach_settings(&self, ui: &DebugUi, kinds: &[DebugTargetType])
        -> Result<()>;

    async fn clear_break_on_next_statement(&self, ui: &DebugUi) -> Result<()>;

    async fn attach_detach_targets(
        &self,
        ui: &DebugUi,
        attach: bool,
        targets: &[DebugTargetIdLight],
    ) -> Result<()>;

    /// Replaces the full breakpoint set for every module listed.
    async fn set_breakpoints(&self, ui: &DebugUi, modules: Vec<ModuleBreakpoints>) -> Result<()>;

    async fn set_break_on_rte(&self, ui: &DebugUi, filter: RteFilter) -> Result<()>;

    /// `None` means the result will arrive later as an `ExprEvaluated` notification.
    async fn eval_local_variables(
        &self,
        ui: &DebugUi,
        request: EvalRequest,
    ) -> Result<Option<EvaluationResult>>;

    /// `None` means the result will arrive later as an `ExprEvaluated` notification.
    async fn eval_expr(&self, ui: &DebugUi, request: EvalRequest)
        -> Result<Option<EvaluationResult>>;

    async fn step(
        &self,
        ui: &DebugUi,
        target: &DebugTargetIdLight,
        action: StepAction,
    ) -> Result<Vec<TargetStateItem>>;

    /// Drains the server's notification queue for this UI.
    async fn ping_debug_ui(&self, ui: &DebugUi) -> Result<Vec<Notification>>;
}

/// Opens a [`DebugServerClient`] for a debug server endpoint.
#[async_trait]
pub trait DebugServerConnector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn DebugServerClient>>;
}
