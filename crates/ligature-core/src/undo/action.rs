//! Reversible actions and the waiting protocol.
//!
//! Every edit recorded in a [`TransactionLog`](super::TransactionLog) is a
//! [`ReversibleAction`]. Actions that mutate state the audio thread reads
//! wholesale implement [`WaitingAction`] instead and are wrapped in
//! [`Waiting`], which obtains an [`EditScope`] from an injected wait function
//! before touching the target.
//!
//! Pure parameter value changes do not need this: the parameter's own lock is
//! enough.

use std::any::Any;

use thiserror::Error;

use crate::graph::GraphError;
use crate::sync::{EditScope, WaitFn};

/// Failure of a single action.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// The graph rejected the edit.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// A waiting action ran before its wait function was installed.
    #[error("waiting action has no wait function installed")]
    NoWaitFunction,
    /// Undo ran without the state captured by `perform`.
    #[error("{0} has no captured state to restore")]
    MissingState(&'static str),
}

/// Result of trying to merge an action into the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coalesce {
    /// The previous action absorbed the new one.
    Merged,
    /// The two cancel out; both are discarded.
    Cancelled,
    /// Keep both.
    Unmerged,
}

/// An edit that can be undone and redone.
///
/// `perform` and `undo` are exact inverses: `perform(); undo()` leaves the
/// target as it was before `perform`.
pub trait ReversibleAction: Send + 'static {
    /// Applies the edit.
    fn perform(&mut self) -> Result<(), ActionError>;

    /// Reverts the edit.
    fn undo(&mut self) -> Result<(), ActionError>;

    /// Re-applies the edit after an undo.
    fn redo(&mut self) -> Result<(), ActionError> {
        self.perform()
    }

    /// Tries to absorb `next`, which has already been performed and directly
    /// follows `self` in the same transaction.
    fn coalesce_with(&mut self, _next: &dyn ReversibleAction) -> Coalesce {
        Coalesce::Unmerged
    }

    /// Downcasting support for [`coalesce_with`](Self::coalesce_with).
    fn as_any(&self) -> &dyn Any;

    /// Human-readable name for logs and menus.
    fn name(&self) -> &'static str;
}

/// An action on state shared with the audio thread.
pub trait WaitingAction: Send + 'static {
    /// State the action mutates.
    type Target: Send + 'static;

    /// Applies the edit while the caller holds the edit scope.
    fn perform_in(&mut self, target: &mut Self::Target) -> Result<(), ActionError>;

    /// Reverts the edit while the caller holds the edit scope.
    fn undo_in(&mut self, target: &mut Self::Target) -> Result<(), ActionError>;

    /// Re-applies the edit while the caller holds the edit scope.
    fn redo_in(&mut self, target: &mut Self::Target) -> Result<(), ActionError> {
        self.perform_in(target)
    }

    /// Human-readable name for logs and menus.
    fn name(&self) -> &'static str;
}

/// Adapts a [`WaitingAction`] into a [`ReversibleAction`] by waiting for an
/// [`EditScope`] before each step.
pub struct Waiting<A: WaitingAction> {
    action: A,
    wait: Option<WaitFn<A::Target>>,
}

impl<A: WaitingAction> Waiting<A> {
    /// Wraps `action` with its wait function.
    pub fn new(action: A, wait: WaitFn<A::Target>) -> Self {
        Self {
            action,
            wait: Some(wait),
        }
    }

    /// Wraps `action`; a wait function must be installed before it runs.
    pub fn pending(action: A) -> Self {
        Self { action, wait: None }
    }

    /// Installs the wait function.
    pub fn set_wait_function(&mut self, wait: WaitFn<A::Target>) {
        self.wait = Some(wait);
    }

    /// The wrapped action.
    pub fn action(&self) -> &A {
        &self.action
    }

    fn scope(&self) -> Result<EditScope<A::Target>, ActionError> {
        match &self.wait {
            Some(wait) => Ok(wait()),
            None => {
                if cfg!(debug_assertions) {
                    panic!("{} ran without a wait function", self.action.name());
                }
                #[cfg(feature = "tracing")]
                tracing::warn!(action = self.action.name(), "no wait function installed");
                Err(ActionError::NoWaitFunction)
            }
        }
    }
}

impl<A: WaitingAction> ReversibleAction for Waiting<A> {
    fn perform(&mut self) -> Result<(), ActionError> {
        let mut scope = self.scope()?;
        self.action.perform_in(&mut *scope)
    }

    fn undo(&mut self) -> Result<(), ActionError> {
        let mut scope = self.scope()?;
        self.action.undo_in(&mut *scope)
    }

    fn redo(&mut self) -> Result<(), ActionError> {
        let mut scope = self.scope()?;
        self.action.redo_in(&mut *scope)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &'static str {
        self.action.name()
    }
}
