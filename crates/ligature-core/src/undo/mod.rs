//! Transactional undo/redo.
//!
//! Edits are [`ReversibleAction`]s grouped into transactions held by a
//! [`TransactionLog`]. One transaction is usually one user gesture: a knob
//! drag records many value changes that coalesce into a single action.
//!
//! Actions that touch the module graph implement [`WaitingAction`] and run
//! inside an edit scope so the audio thread never sees a half-applied edit.

mod action;
mod actions;
mod log;

pub use action::{ActionError, Coalesce, ReversibleAction, Waiting, WaitingAction};
pub use actions::{ChangeParameterDetails, ChangeParameterValue, InsertModule, MoveModule, RemoveModule};
pub use log::{DEFAULT_CAPACITY, ReplayMonitor, TransactionLog, UndoError};
