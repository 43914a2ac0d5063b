//! Concrete actions: parameter edits and module graph edits.

use std::any::Any;
use std::sync::Arc;

use super::action::{ActionError, Coalesce, ReversibleAction, WaitingAction};
use crate::details::ParameterDetails;
use crate::graph::{GraphError, ModuleGraph, ModuleId, ModuleSubtree};
use crate::parameter::Parameter;
use crate::value::unit_value;

/// Sets a parameter's normalized value.
///
/// Consecutive changes to the same parameter within one transaction merge
/// into a single action spanning the first previous value and the last new
/// one. A chain that returns to where it started cancels out.
pub struct ChangeParameterValue {
    parameter: Arc<Parameter>,
    previous: f32,
    value: f32,
}

impl ChangeParameterValue {
    /// Captures the parameter's current value as the undo target.
    pub fn new(parameter: Arc<Parameter>, value: f32) -> Self {
        let previous = parameter.normalized_value();
        Self {
            parameter,
            previous,
            value: unit_value(value).unwrap_or(previous),
        }
    }

    /// Value restored by undo.
    pub fn previous(&self) -> f32 {
        self.previous
    }

    /// Value applied by perform.
    pub fn value(&self) -> f32 {
        self.value
    }
}

impl ReversibleAction for ChangeParameterValue {
    fn perform(&mut self) -> Result<(), ActionError> {
        self.parameter.set_normalized_value(self.value);
        Ok(())
    }

    fn undo(&mut self) -> Result<(), ActionError> {
        self.parameter.set_normalized_value(self.previous);
        Ok(())
    }

    fn coalesce_with(&mut self, next: &dyn ReversibleAction) -> Coalesce {
        let Some(next) = next.as_any().downcast_ref::<Self>() else {
            return Coalesce::Unmerged;
        };
        if !Arc::ptr_eq(&self.parameter, &next.parameter) || next.previous != self.value {
            return Coalesce::Unmerged;
        }
        self.value = next.value;
        if self.value == self.previous {
            Coalesce::Cancelled
        } else {
            Coalesce::Merged
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &'static str {
        "change parameter value"
    }
}

/// Replaces a parameter's description, optionally moving its value.
pub struct ChangeParameterDetails {
    parameter: Arc<Parameter>,
    details: ParameterDetails,
    value: Option<f32>,
    previous: Option<(ParameterDetails, f32)>,
}

impl ChangeParameterDetails {
    /// Creates the action; the current state is captured on perform.
    pub fn new(parameter: Arc<Parameter>, details: ParameterDetails, value: Option<f32>) -> Self {
        Self {
            parameter,
            details,
            value,
            previous: None,
        }
    }
}

impl ReversibleAction for ChangeParameterDetails {
    fn perform(&mut self) -> Result<(), ActionError> {
        let snapshot = self.parameter.serialize();
        self.previous = Some((snapshot.details, snapshot.normalized_value));
        self.parameter
            .set_parameter_details(self.details.clone(), self.value);
        Ok(())
    }

    fn undo(&mut self) -> Result<(), ActionError> {
        let (details, value) = self
            .previous
            .clone()
            .ok_or(ActionError::MissingState(self.name()))?;
        self.parameter.set_parameter_details(details, Some(value));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &'static str {
        "change parameter details"
    }
}

/// Inserts a subtree into the graph. Undo takes it back out, intact.
#[derive(Debug)]
pub struct InsertModule {
    parent: ModuleId,
    index: usize,
    id: ModuleId,
    subtree: Option<ModuleSubtree>,
}

impl InsertModule {
    /// Inserts `subtree` as child `index` of `parent`.
    pub fn new(parent: ModuleId, index: usize, subtree: ModuleSubtree) -> Self {
        Self {
            parent,
            index,
            id: subtree.module.id,
            subtree: Some(subtree),
        }
    }

    /// Id of the inserted subtree root.
    pub fn id(&self) -> ModuleId {
        self.id
    }
}

impl WaitingAction for InsertModule {
    type Target = ModuleGraph;

    fn perform_in(&mut self, graph: &mut ModuleGraph) -> Result<(), ActionError> {
        let subtree = self
            .subtree
            .take()
            .ok_or(ActionError::MissingState(self.name()))?;
        if let Err(err) = graph.validate_insert(self.parent, self.index, &subtree) {
            self.subtree = Some(subtree);
            return Err(err.into());
        }
        graph.insert(self.parent, self.index, subtree)?;
        Ok(())
    }

    fn undo_in(&mut self, graph: &mut ModuleGraph) -> Result<(), ActionError> {
        let children = graph
            .children(self.parent)
            .ok_or(GraphError::ModuleNotFound(self.parent))?;
        if children.get(self.index) != Some(&self.id) {
            return Err(GraphError::ModuleNotFound(self.id).into());
        }
        self.subtree = Some(graph.remove(self.parent, self.index)?);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "insert module"
    }
}

/// Removes child `index` of `parent`. Undo reinserts the removed subtree.
#[derive(Debug)]
pub struct RemoveModule {
    parent: ModuleId,
    index: usize,
    removed: Option<ModuleSubtree>,
}

impl RemoveModule {
    /// Removes child `index` of `parent`.
    pub fn new(parent: ModuleId, index: usize) -> Self {
        Self {
            parent,
            index,
            removed: None,
        }
    }

    /// The subtree held for undo, if the action has been performed.
    pub fn removed(&self) -> Option<&ModuleSubtree> {
        self.removed.as_ref()
    }
}

impl WaitingAction for RemoveModule {
    type Target = ModuleGraph;

    fn perform_in(&mut self, graph: &mut ModuleGraph) -> Result<(), ActionError> {
        self.removed = Some(graph.remove(self.parent, self.index)?);
        Ok(())
    }

    fn undo_in(&mut self, graph: &mut ModuleGraph) -> Result<(), ActionError> {
        let subtree = self
            .removed
            .take()
            .ok_or(ActionError::MissingState(self.name()))?;
        if let Err(err) = graph.validate_insert(self.parent, self.index, &subtree) {
            self.removed = Some(subtree);
            return Err(err.into());
        }
        graph.insert(self.parent, self.index, subtree)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "remove module"
    }
}

/// Moves a module between positions. The destination index is the position
/// after removal from the source.
#[derive(Debug, Clone, Copy)]
pub struct MoveModule {
    from_parent: ModuleId,
    from_index: usize,
    to_parent: ModuleId,
    to_index: usize,
}

impl MoveModule {
    /// Moves child `from_index` of `from_parent` to child `to_index` of `to_parent`.
    pub fn new(from_parent: ModuleId, from_index: usize, to_parent: ModuleId, to_index: usize) -> Self {
        Self {
            from_parent,
            from_index,
            to_parent,
            to_index,
        }
    }
}

impl WaitingAction for MoveModule {
    type Target = ModuleGraph;

    fn perform_in(&mut self, graph: &mut ModuleGraph) -> Result<(), ActionError> {
        graph.move_module(self.from_parent, self.from_index, self.to_parent, self.to_index)?;
        Ok(())
    }

    fn undo_in(&mut self, graph: &mut ModuleGraph) -> Result<(), ActionError> {
        graph.move_module(self.to_parent, self.to_index, self.from_parent, self.from_index)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "move module"
    }
}
