//! Stack & variable introspection on top of the call-stack cache, the
//! variable reference table and evaluation correlation.

use std::sync::Arc;

use onec_rdbg::{
    CallStackFormed, EvalRequest, EvaluationResult, PathStep, RuntimeError, ViewInterface,
};
use serde_json::json;

use crate::dap::types::{EvaluateResult, Scope, Source, StackFrame, Variable};
use crate::error::DebugResult;
use crate::evaluation::PendingEvaluations;
use crate::events::EventSink;
use crate::metadata::MetadataProvider;
use crate::session::Session;
use crate::stack::{CallStacks, FrameRef};
use crate::targets::TargetRegistry;
use crate::variables::{needs_union_view, VariableRef, VariableTable};

pub struct StackTrace {
    pub frames: Vec<StackFrame>,
    pub total_frames: usize,
}

pub struct Inspector {
    session: Arc<Session>,
    registry: Arc<TargetRegistry>,
    metadata: Arc<dyn MetadataProvider>,
    events: EventSink,
    stacks: CallStacks,
    variables: VariableTable,
    evaluations: Arc<PendingEvaluations>,
}

impl Inspector {
    pub fn new(
        session: Arc<Session>,
        registry: Arc<TargetRegistry>,
        metadata: Arc<dyn MetadataProvider>,
        events: EventSink,
    ) -> Self {
        Self {
            session,
            registry,
            metadata,
            events,
            stacks: CallStacks::default(),
            variables: VariableTable::default(),
            evaluations: PendingEvaluations::new(),
        }
    }

    /// Invalidates the cached stack plus every frame and variable reference
    /// of `thread_id`.
    pub fn clear_thread(&self, thread_id: i64) {
        self.stacks.clear(thread_id);
        self.variables.clear(thread_id);
    }

    /// Marks the current stop of `thread_id` for a later
    /// [`clear_thread_if_unchanged`](Self::clear_thread_if_unchanged).
    pub fn stop_generation(&self, thread_id: i64) -> u64 {
        self.stacks.generation(thread_id)
    }

    /// Clears `thread_id` only if no stack arrived since `generation` was
    /// taken.
    pub fn clear_thread_if_unchanged(&self, thread_id: i64, generation: u64) {
        if self.stacks.clear_if_unchanged(thread_id, generation) {
            self.variables.clear(thread_id);
        }
    }

    /// As [`clear_thread`](Self::clear_thread) for a thread that no longer
    /// exists.
    pub fn forget_thread(&self, thread_id: i64) {
        self.stacks.forget(thread_id);
        self.variables.clear(thread_id);
    }

    pub fn on_call_stack_formed(&self, info: CallStackFormed) -> DebugResult<()> {
        let thread_id = self.registry.thread_id(&info.target_id.id)?;
        if let Some(stack) = info.call_stack {
            self.variables.clear(thread_id);
            self.stacks.store(thread_id, stack);
        }

        if let Some(message) = info.message.filter(|message| !message.is_empty()) {
            self.events.stdout(message);
        }
        if info.send_message_only {
            return Ok(());
        }

        tracing::debug!(
            thread_id,
            stop_by_bp = info.stop_by_bp,
            suspended_by_other = info.suspended_by_other,
            "target stopped"
        );
        self.events.event(
            "stopped",
            Some(json!({
                "reason": "breakpoint",
                "threadId": thread_id,
                "allThreadsStopped": true,
            })),
        );
        Ok(())
    }

    pub fn on_runtime_error(&self, info: RuntimeError) -> DebugResult<()> {
        let thread_id = self.registry.thread_id(&info.target_id.id)?;
        if let Some(stack) = info.call_stack {
            self.variables.clear(thread_id);
            self.stacks.store(thread_id, stack);
        }

        tracing::debug!(thread_id, "target stopped on runtime error");
        self.events.event(
            "stopped",
            Some(json!({
                "reason": "exception",
                "threadId": thread_id,
                "allThreadsStopped": true,
            })),
        );
        self.events.error_output(info.description);
        Ok(())
    }

    /// Delivers a deferred evaluation result to its waiter.
    pub fn on_expr_evaluated(&self, result: EvaluationResult) {
        let token = result.result_id.clone();
        self.evaluations.resolve(&token, result);
    }

    pub async fn stack_trace(
        &self,
        thread_id: i64,
        start_frame: usize,
        levels: Option<usize>,
    ) -> DebugResult<StackTrace> {
        self.registry.target(thread_id)?;
        let stack = self.stacks.wait_for(thread_id, &self.session.token).await?;
        let total_frames = stack.len();
        let levels = levels.filter(|levels| *levels > 0).unwrap_or(usize::MAX);

        let frames = stack
            .iter()
            .enumerate()
            .skip(start_frame)
            .take(levels)
            .map(|(index, item)| {
                let id = self.stacks.register_frame(FrameRef { thread_id, index });
                let source = self.metadata.path_by_module(&item.module).map(|path| Source {
                    name: path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned()),
                    path: Some(path.to_string_lossy().into_owned()),
                });
                StackFrame {
                    id,
                    name: format!("{} : {}", item.presentation, item.line_no),
                    source,
                    line: self.session.to_client_line(item.line_no),
                    column: 0,
                }
            })
            .collect();

        Ok(StackTrace {
            frames,
            total_frames,
        })
    }

    pub fn scopes(&self, frame_id: i64) -> DebugResult<Vec<Scope>> {
        let frame = self.stacks.frame(frame_id)?;
        let locals = self.variables.alloc(VariableRef {
            thread_id: frame.thread_id,
            frame_index: frame.index,
            path: Vec::new(),
            view: ViewInterface::Context,
        });
        Ok(vec![Scope {
            name: "Locals".to_string(),
            variables_reference: locals,
            expensive: false,
        }])
    }

    pub async fn variables(&self, reference: i64) -> DebugResult<Vec<Variable>> {
        let var = self.variables.get(reference)?;
        let result = self.evaluate_ref(&var).await?;
        if result.error_occurred {
            return Ok(vec![Variable {
                name: "error".to_string(),
                value: result.exception,
                type_: None,
                variables_reference: 0,
            }]);
        }

        let mut rendered = self.variables.render(&var, &result);
        if needs_union_view(&result) {
            let items = self
                .eval_path(&var, var.path.clone(), ViewInterface::Collection)
                .await?;
            rendered.extend(self.variables.render_collection(&var, &items));
        }
        Ok(rendered)
    }

    pub async fn evaluate(&self, expression: &str, frame_id: i64) -> DebugResult<EvaluateResult> {
        let frame = self.stacks.frame(frame_id)?;
        let root = VariableRef {
            thread_id: frame.thread_id,
            frame_index: frame.index,
            path: Vec::new(),
            view: ViewInterface::Context,
        };
        let step = PathStep::Expression(expression.to_string());
        let result = self
            .eval_path(&root, vec![step.clone()], ViewInterface::Context)
            .await?;

        if result.error_occurred {
            return Ok(EvaluateResult {
                result: result.exception,
                type_: None,
                variables_reference: 0,
            });
        }

        Ok(EvaluateResult {
            variables_reference: self.variables.reference_for(&root, step, &result.value),
            result: result.value.presentation,
            type_: Some(result.value.type_name),
        })
    }

    async fn evaluate_ref(&self, var: &VariableRef) -> DebugResult<EvaluationResult> {
        if var.path.is_empty() {
            self.eval_locals(var).await
        } else {
            self.eval_path(var, var.path.clone(), var.view).await
        }
    }

    fn eval_request(
        &self,
        var: &VariableRef,
        token: &str,
        path: Vec<PathStep>,
        view: ViewInterface,
    ) -> DebugResult<EvalRequest> {
        let target = self.registry.target(var.thread_id)?;
        let settings = &self.session.settings;
        Ok(EvalRequest {
            target_id: target.light(),
            stack_level: u32::try_from(var.frame_index).unwrap_or(u32::MAX),
            result_id: token.to_string(),
            interfaces: vec![view],
            path,
            max_text_size: settings.max_text_size,
            calc_waiting_time_ms: settings.calc_waiting_time_ms,
        })
    }

    async fn eval_locals(&self, var: &VariableRef) -> DebugResult<EvaluationResult> {
        let mut pending = self.evaluations.register();
        let request = self.eval_request(var, pending.token(), Vec::new(), ViewInterface::Context)?;
        let session = &self.session;
        let immediate = session
            .call(session.client.eval_local_variables(&session.ui, request))
            .await?;
        if let Some(result) = immediate {
            self.evaluations.resolve(pending.token(), result);
        }
        pending.wait(&session.token).await
    }

    async fn eval_path(
        &self,
        var: &VariableRef,
        path: Vec<PathStep>,
        view: ViewInterface,
    ) -> DebugResult<EvaluationResult> {
        let mut pending = self.evaluations.register();
        let request = self.eval_request(var, pending.token(), path, view)?;
        let session = &self.session;
        let immediate = session
            .call(session.client.eval_expr(&session.ui, request))
            .await?;
        if let Some(result) = immediate {
            self.evaluations.resolve(pending.token(), result);
        }
        let result = pending.wait(&session.token).await;
        tracing::debug!(thread_id = var.thread_id, ok = result.is_ok(), "evaluation finished");
        result
    }

    #[cfg(test)]
    pub(crate) fn pending_evaluations(&self) -> usize {
        self.evaluations.len()
    }
}
