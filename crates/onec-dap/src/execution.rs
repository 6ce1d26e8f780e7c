//! Execution Control: breakpoints, runtime-error filters and stepping.

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use onec_rdbg::{
    BreakpointInfo, ModuleBreakpoints, RteFilter, RteFilterItem, StepAction, TargetState,
};
use serde_json::json;

use crate::dap::types::{
    Breakpoint, SetExceptionBreakpointsArguments, Source, SourceBreakpoint,
};
use crate::error::{DebugError, DebugResult};
use crate::events::EventSink;
use crate::inspect::Inspector;
use crate::metadata::{capitalize_first_char, MetadataProvider};
use crate::session::Session;
use crate::targets::TargetRegistry;

pub struct ExecutionControl {
    session: Arc<Session>,
    registry: Arc<TargetRegistry>,
    inspector: Arc<Inspector>,
    metadata: Arc<dyn MetadataProvider>,
    events: EventSink,
}

impl ExecutionControl {
    pub fn new(
        session: Arc<Session>,
        registry: Arc<TargetRegistry>,
        inspector: Arc<Inspector>,
        metadata: Arc<dyn MetadataProvider>,
        events: EventSink,
    ) -> Self {
        Self {
            session,
            registry,
            inspector,
            metadata,
            events,
        }
    }

    /// Replaces the breakpoint set of the module behind `source`.
    pub async fn set_breakpoints(
        &self,
        source: &Source,
        breakpoints: &[SourceBreakpoint],
    ) -> DebugResult<Vec<Breakpoint>> {
        let Some(path) = source.path.as_deref() else {
            return Err(DebugError::InvalidRequest(
                "setBreakpoints: missing source.path".to_string(),
            ));
        };
        let path = capitalize_first_char(path);
        let module = self
            .metadata
            .module_by_path(&PathBuf::from(&path))
            .ok_or_else(|| DebugError::UnknownSource(path.clone()))?;

        let infos: Vec<BreakpointInfo> = breakpoints
            .iter()
            .map(|bp| self.breakpoint_info(bp))
            .collect();
        tracing::debug!(path = %path, count = infos.len(), "setting breakpoints");

        let session = &self.session;
        session
            .call(session.client.set_breakpoints(
                &session.ui,
                vec![ModuleBreakpoints {
                    module,
                    breakpoints: infos,
                }],
            ))
            .await?;

        let source = Source {
            name: source.name.clone(),
            path: Some(path),
        };
        Ok(breakpoints
            .iter()
            .map(|bp| Breakpoint {
                verified: true,
                line: Some(bp.line),
                source: Some(source.clone()),
            })
            .collect())
    }

    fn breakpoint_info(&self, bp: &SourceBreakpoint) -> BreakpointInfo {
        let condition = bp.condition.clone().unwrap_or_default();
        let log_message = bp.log_message.clone().filter(|msg| !msg.is_empty());
        let tracepoint = log_message.is_some();
        BreakpointInfo {
            line: self.session.to_backend_line(bp.line),
            hit_count: 1,
            is_active: true,
            break_on_condition: !condition.is_empty(),
            condition,
            put_description: log_message,
            show_output_message: tracepoint,
            continue_execution: tracepoint,
        }
    }

    /// Enables stopping on runtime errors when any filter is selected. A
    /// single filter condition becomes a substring match on the error text.
    pub async fn set_exception_filters(
        &self,
        args: &SetExceptionBreakpointsArguments,
    ) -> DebugResult<Vec<Breakpoint>> {
        let filter = rte_filter(args);
        tracing::debug!(
            stop_on_errors = filter.stop_on_errors,
            analyze_error_str = filter.analyze_error_str,
            "setting runtime error filter"
        );

        let session = &self.session;
        session
            .call(session.client.set_break_on_rte(&session.ui, filter))
            .await?;

        let count = args.filters.len() + args.filter_options.len();
        Ok((0..count)
            .map(|_| Breakpoint {
                verified: true,
                line: None,
                source: None,
            })
            .collect())
    }

    /// Resumes `thread_id`. Every attached target the debug server reports as
    /// running again gets a `continued` event.
    ///
    /// Returns the `allThreadsContinued` flag for the response.
    pub async fn step(
        &self,
        thread_id: i64,
        action: StepAction,
        single_thread: bool,
    ) -> DebugResult<bool> {
        let target = self.registry.target(thread_id)?;
        self.inspector.clear_thread(thread_id);
        // A target may stop again before the step reply arrives; its new
        // stack must outlive the reply.
        let stops: HashMap<i64, u64> = self
            .registry
            .threads()
            .into_iter()
            .map(|thread| (thread.id, self.inspector.stop_generation(thread.id)))
            .collect();

        let session = &self.session;
        let states = session
            .call(session.client.step(&session.ui, &target.light(), action))
            .await?;
        tracing::debug!(thread_id, ?action, resumed = states.len(), "step issued");

        for item in states {
            if item.state != TargetState::Worked {
                continue;
            }
            // Targets detached meanwhile have no thread to report.
            let Ok(resumed) = self.registry.thread_id(&item.target_id.id) else {
                continue;
            };
            if let Some(&generation) = stops.get(&resumed) {
                self.inspector.clear_thread_if_unchanged(resumed, generation);
            }
            self.events.event(
                "continued",
                Some(json!({ "threadId": resumed, "allThreadsContinued": false })),
            );
        }
        Ok(!single_thread)
    }
}

fn rte_filter(args: &SetExceptionBreakpointsArguments) -> RteFilter {
    let stop_on_errors = !args.filters.is_empty() || !args.filter_options.is_empty();
    let conditions: Vec<&str> = args
        .filter_options
        .iter()
        .filter_map(|opt| opt.condition.as_deref())
        .filter(|cond| !cond.is_empty())
        .collect();

    match conditions.as_slice() {
        [pattern] => RteFilter {
            stop_on_errors,
            analyze_error_str: true,
            str_template: vec![RteFilterItem {
                include: true,
                pattern: (*pattern).to_string(),
            }],
        },
        _ => RteFilter {
            stop_on_errors,
            ..RteFilter::default()
        },
    }
}

/// Maps a DAP stepping command to the debug server's step action.
pub fn step_action(command: &str) -> Option<StepAction> {
    match command {
        "continue" => Some(StepAction::Continue),
        "next" => Some(StepAction::Step),
        "stepIn" => Some(StepAction::StepIn),
        "stepOut" => Some(StepAction::StepOut),
        _ => None,
    }
}
