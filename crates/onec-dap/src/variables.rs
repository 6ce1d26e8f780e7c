use onec_rdbg::{EvaluationResult, PathStep, ValueInfo, ViewInterface};
use parking_lot::Mutex;

use crate::dap::types::Variable;
use crate::error::{DebugError, DebugResult};
use crate::handles::HandleTable;

/// One node of a lazily expanded evaluation tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRef {
    pub thread_id: i64,
    pub frame_index: usize,
    /// Empty for the local context of the frame.
    pub path: Vec<PathStep>,
    pub view: ViewInterface,
}

impl VariableRef {
    fn child(&self, step: PathStep, view: ViewInterface) -> Self {
        let mut path = self.path.clone();
        path.push(step);
        Self {
            thread_id: self.thread_id,
            frame_index: self.frame_index,
            path,
            view,
        }
    }
}

#[derive(Default)]
pub struct VariableTable {
    refs: Mutex<HandleTable<VariableRef>>,
}

impl VariableTable {
    pub fn alloc(&self, var: VariableRef) -> i64 {
        self.refs.lock().alloc(var)
    }

    pub fn get(&self, reference: i64) -> DebugResult<VariableRef> {
        self.refs
            .lock()
            .get(reference)
            .cloned()
            .ok_or(DebugError::UnknownVariablesReference(reference))
    }

    pub fn clear(&self, thread_id: i64) {
        self.refs.lock().retain(|var| var.thread_id != thread_id);
    }

    /// A reference for a value that can be expanded further, `0` otherwise.
    pub fn reference_for(&self, parent: &VariableRef, step: PathStep, value: &ValueInfo) -> i64 {
        match expansion_view(value) {
            Some(view) => self.alloc(parent.child(step, view)),
            None => 0,
        }
    }

    /// Renders an evaluation result according to the view the debug server
    /// chose for it.
    pub fn render(&self, parent: &VariableRef, result: &EvaluationResult) -> Vec<Variable> {
        let calculation = &result.calculation;
        match calculation.view_interface {
            ViewInterface::Enum => calculation
                .enum_values
                .iter()
                .map(|value| Variable {
                    name: value.presentation.clone(),
                    value: String::new(),
                    type_: None,
                    variables_reference: 0,
                })
                .collect(),
            ViewInterface::Collection => self.render_collection(parent, result),
            ViewInterface::Context => calculation
                .context_properties
                .iter()
                .map(|prop| {
                    if !prop.property.is_readable {
                        return Variable {
                            name: prop.property.name.clone(),
                            value: prop.property.error.clone(),
                            type_: None,
                            variables_reference: 0,
                        };
                    }
                    // Locals are addressed as free expressions, members as
                    // properties of their parent.
                    let step = if parent.path.is_empty() {
                        PathStep::Expression(prop.property.name.clone())
                    } else {
                        PathStep::Property(prop.property.name.clone())
                    };
                    Variable {
                        name: format!("{} ({})", prop.property.name, prop.value.type_name),
                        value: prop.value.presentation.clone(),
                        type_: Some(prop.value.type_name.clone()),
                        variables_reference: self.reference_for(parent, step, &prop.value),
                    }
                })
                .collect(),
        }
    }

    pub fn render_collection(&self, parent: &VariableRef, result: &EvaluationResult) -> Vec<Variable> {
        result
            .calculation
            .collection_items
            .iter()
            .enumerate()
            .map(|(index, value)| {
                let index = u32::try_from(index).unwrap_or(u32::MAX);
                Variable {
                    name: format!("{index} ({})", value.type_name),
                    value: value.presentation.clone(),
                    type_: Some(value.type_name.clone()),
                    variables_reference: self.reference_for(parent, PathStep::Index(index), value),
                }
            })
            .collect()
    }
}

/// How a value expands: as a context when it has members, as a collection when
/// it only has indexed items.
pub fn expansion_view(value: &ValueInfo) -> Option<ViewInterface> {
    if value.is_expandable {
        Some(ViewInterface::Context)
    } else if value.is_indexed_collection {
        Some(ViewInterface::Collection)
    } else {
        None
    }
}

/// A context that is also an indexed collection of known size gets its items
/// listed after its properties.
pub fn needs_union_view(result: &EvaluationResult) -> bool {
    result.calculation.view_interface == ViewInterface::Context
        && result.value.is_indexed_collection
        && result.value.collection_size.is_some()
}
