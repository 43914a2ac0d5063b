//! Host session: graph, undo log, and host automation slots in one place.
//!
//! ```text
//!  UI thread                              audio thread
//!  ─────────                              ────────────
//!  set_parameter_value ─► log ─► Parameter ◄── process_block
//!  insert/remove/move  ─► log ─► EditGate<ModuleGraph> ◄── try_enter
//!                                      ▲
//!  host ─► ParameterBridge ────────────┘ (read in update_value)
//! ```
//!
//! Structural edits wait on the [`EditGate`]; the audio thread never waits
//! and skips a block while an edit holds the gate.
//!
//! Closures passed to [`Session::with_graph`] run with the gate held and must
//! not call back into structural edits.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::bridge::ParameterBridge;
use crate::details::ParameterDetails;
use crate::graph::{Module, ModuleGraph, ModuleId, ModuleSubtree};
use crate::parameter::{DEFAULT_SAMPLE_RATE, Parameter};
use crate::sync::{EditGate, WaitFn};
use crate::undo::{
    ActionError, ChangeParameterDetails, ChangeParameterValue, DEFAULT_CAPACITY, InsertModule, MoveModule,
    RemoveModule, ReplayMonitor, ReversibleAction, TransactionLog, UndoError, Waiting,
};

/// Session sizing.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Transactions kept by the undo log.
    pub undo_capacity: usize,
    /// Number of host automation slots.
    pub host_slot_count: usize,
    /// Maximum characters of a slot name reported to the host.
    pub name_max_length: usize,
    /// Sample rate new modules' parameters are prepared at, until the first
    /// processed block reports the host's rate.
    pub sample_rate: f32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            undo_capacity: DEFAULT_CAPACITY,
            host_slot_count: 128,
            name_max_length: 32,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

/// Everything one plugin instance edits.
pub struct Session {
    gate: EditGate<ModuleGraph>,
    wait: WaitFn<ModuleGraph>,
    log: Mutex<TransactionLog>,
    monitor: ReplayMonitor,
    bridges: Vec<Arc<ParameterBridge>>,
    next_module_id: AtomicU32,
    options: SessionOptions,
}

impl Session {
    /// Creates an empty session.
    pub fn new(options: SessionOptions) -> Self {
        let gate = EditGate::new(ModuleGraph::new());
        let wait = gate.wait_function();
        let log = TransactionLog::new(options.undo_capacity);
        let monitor = log.monitor();
        let bridges = (0..options.host_slot_count).map(ParameterBridge::new).collect();
        #[cfg(feature = "tracing")]
        tracing::debug!(
            slots = options.host_slot_count,
            undo_capacity = options.undo_capacity,
            "session created"
        );
        Self {
            gate,
            wait,
            log: Mutex::new(log),
            monitor,
            bridges,
            next_module_id: AtomicU32::new(ModuleId::ROOT.0 + 1),
            options,
        }
    }

    /// Sizing the session was created with.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    fn log(&self) -> Result<parking_lot::MutexGuard<'_, TransactionLog>, UndoError> {
        if self.monitor.is_replaying() {
            #[cfg(feature = "tracing")]
            tracing::warn!("session call rejected: transaction log is replaying");
            return Err(UndoError::Reentrant);
        }
        Ok(self.log.lock())
    }

    /// Performs `action` in the current transaction. Pending redo history is
    /// discarded first.
    pub fn perform(&self, action: Box<dyn ReversibleAction>) -> Result<(), UndoError> {
        let mut log = self.log()?;
        if log.can_redo() {
            log.begin_new_transaction();
        }
        log.perform(action)
    }

    fn perform_alone(&self, action: Box<dyn ReversibleAction>) -> Result<(), UndoError> {
        let mut log = self.log()?;
        log.begin_new_transaction();
        log.perform(action)?;
        log.begin_new_transaction();
        Ok(())
    }

    /// Starts a new transaction; later edits undo as one step.
    pub fn begin_gesture(&self) -> Result<(), UndoError> {
        self.log()?.begin_new_transaction();
        Ok(())
    }

    /// Records a normalized value change.
    pub fn set_parameter_value(&self, parameter: &Arc<Parameter>, value: f32) -> Result<(), UndoError> {
        self.perform(Box::new(ChangeParameterValue::new(Arc::clone(parameter), value)))
    }

    /// Records a description change.
    pub fn set_parameter_details(
        &self,
        parameter: &Arc<Parameter>,
        details: ParameterDetails,
        value: Option<f32>,
    ) -> Result<(), UndoError> {
        self.perform(Box::new(ChangeParameterDetails::new(
            Arc::clone(parameter),
            details,
            value,
        )))
    }

    /// Builds a detached module with a fresh id, its parameters prepared at
    /// the session's sample rate.
    pub fn create_module(&self, kind: &str, details: Vec<ParameterDetails>) -> Module {
        let id = ModuleId(self.next_module_id.fetch_add(1, Ordering::Relaxed));
        let module = Module::new(id, kind, details);
        for parameter in &module.parameters {
            parameter.update_value(self.options.sample_rate);
        }
        module
    }

    /// Inserts `subtree` as child `index` of `parent`, as its own transaction.
    pub fn insert_module(
        &self,
        parent: ModuleId,
        index: usize,
        subtree: ModuleSubtree,
    ) -> Result<ModuleId, UndoError> {
        let action = InsertModule::new(parent, index, subtree);
        let id = action.id();
        self.perform_alone(Box::new(Waiting::new(action, Arc::clone(&self.wait))))?;
        Ok(id)
    }

    /// Removes module `id` with its subtree, as its own transaction.
    pub fn remove_module(&self, id: ModuleId) -> Result<(), UndoError> {
        let (parent, index) = self
            .gate
            .wait()
            .position_of(id)
            .map_err(|e| UndoError::Action(ActionError::Graph(e)))?;
        let action = RemoveModule::new(parent, index);
        self.perform_alone(Box::new(Waiting::new(action, Arc::clone(&self.wait))))
    }

    /// Moves a module, as its own transaction. `to_index` is the position
    /// after removal from the source.
    pub fn move_module(
        &self,
        from_parent: ModuleId,
        from_index: usize,
        to_parent: ModuleId,
        to_index: usize,
    ) -> Result<(), UndoError> {
        let action = MoveModule::new(from_parent, from_index, to_parent, to_index);
        self.perform_alone(Box::new(Waiting::new(action, Arc::clone(&self.wait))))
    }

    /// Reverts the last transaction.
    pub fn undo(&self) -> Result<bool, UndoError> {
        self.log()?.undo(false)
    }

    /// Reverts and discards the transaction in progress.
    pub fn undo_current_gesture(&self) -> Result<bool, UndoError> {
        self.log()?.undo(true)
    }

    /// Re-applies the last undone transaction.
    pub fn redo(&self) -> Result<bool, UndoError> {
        self.log()?.redo()
    }

    /// Whether [`undo`](Self::undo) would revert anything.
    pub fn can_undo(&self) -> bool {
        self.log.lock().can_undo()
    }

    /// Whether [`redo`](Self::redo) would re-apply anything.
    pub fn can_redo(&self) -> bool {
        self.log.lock().can_redo()
    }

    /// Resizes the undo log.
    pub fn set_undo_capacity(&self, capacity: usize) -> Result<(), UndoError> {
        self.log()?.set_capacity(capacity);
        Ok(())
    }

    /// Binds host slot `slot` to `parameter`, or unbinds it with `None`.
    /// Returns `false` for an unknown slot.
    pub fn bind_bridge(&self, slot: usize, parameter: Option<&Arc<Parameter>>, pull_value_from_parameter: bool) -> bool {
        match self.bridges.get(slot) {
            Some(bridge) => {
                bridge.reset_parameter_link(parameter, pull_value_from_parameter);
                true
            }
            None => false,
        }
    }

    /// Host slot `slot`.
    pub fn bridge(&self, slot: usize) -> Option<&Arc<ParameterBridge>> {
        self.bridges.get(slot)
    }

    /// All host slots.
    pub fn bridges(&self) -> &[Arc<ParameterBridge>] {
        &self.bridges
    }

    /// Slot name as reported to the host, truncated to the configured length.
    pub fn host_parameter_name(&self, slot: usize) -> Option<String> {
        self.bridges
            .get(slot)
            .map(|b| b.name_truncated(self.options.name_max_length))
    }

    /// Audio-thread update pass. Returns how many parameters recomputed, or
    /// `None` when the block was skipped because an edit holds the graph.
    pub fn process_block(&self, sample_rate: f32) -> Option<usize> {
        let graph = self.gate.try_enter()?;
        Some(graph.update_parameters(sample_rate))
    }

    /// Runs `f` with the graph locked against audio and edits.
    pub fn with_graph<R>(&self, f: impl FnOnce(&ModuleGraph) -> R) -> R {
        f(&self.gate.wait())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("options", &self.options)
            .field("log", &*self.log.lock())
            .finish_non_exhaustive()
    }
}
