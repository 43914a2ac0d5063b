//! Fixed-capacity ring buffer of transactions.
//!
//! ```text
//!            oldest undo          cursor        redo region
//!                 │                 │          ┌─────┴─────┐
//!   slots:  [ T ][ T ][ T ][ T ][ T(open) ][ R ][ R ][   ][   ]
//!           └──────── undo_count ────────┘└redo_count┘
//! ```
//!
//! The slot at `cursor` is the current transaction; it is open until
//! [`begin_new_transaction`](TransactionLog::begin_new_transaction) closes it.
//! `undo_count` includes the current slot, so it is always at least 1, and
//! `undo_count + redo_count <= capacity` after every operation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use super::action::{ActionError, Coalesce, ReversibleAction};

/// Capacity used by [`TransactionLog::default`].
pub const DEFAULT_CAPACITY: usize = 100;

/// Errors reported by [`TransactionLog`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UndoError {
    /// Called while the log is replaying or performing an action.
    #[error("transaction log is busy replaying; re-entrant call rejected")]
    Reentrant,
    /// A new action was recorded while redo history exists.
    #[error("redo history pending; begin a new transaction before recording")]
    RedoPending,
    /// The action's own `perform` failed; nothing was recorded.
    #[error("action failed: {0}")]
    Action(#[source] ActionError),
    /// An action failed during undo or redo; the log has been cleared.
    #[error("replay failed, transaction log cleared: {0}")]
    ReplayFailed(#[source] ActionError),
}

type Transaction = Vec<Box<dyn ReversibleAction>>;

/// Observes whether a log is replaying, without locking it.
///
/// Owners that keep the log behind a mutex check this first so a re-entrant
/// call from inside an action is rejected instead of deadlocking.
#[derive(Debug, Clone)]
pub struct ReplayMonitor(Arc<AtomicBool>);

impl ReplayMonitor {
    /// Whether an action is currently running under the log.
    pub fn is_replaying(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Undo manager.
pub struct TransactionLog {
    transactions: Vec<Transaction>,
    cursor: usize,
    undo_count: usize,
    redo_count: usize,
    busy: Arc<AtomicBool>,
}

impl Default for TransactionLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl TransactionLog {
    /// Creates an empty log holding up to `capacity` transactions (min 1).
    pub fn new(capacity: usize) -> Self {
        let mut transactions = Vec::new();
        transactions.resize_with(capacity.max(1), Vec::new);
        Self {
            transactions,
            cursor: 0,
            undo_count: 1,
            redo_count: 0,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for checking the busy flag from outside.
    pub fn monitor(&self) -> ReplayMonitor {
        ReplayMonitor(Arc::clone(&self.busy))
    }

    /// Maximum number of transactions.
    pub fn capacity(&self) -> usize {
        self.transactions.len()
    }

    /// Transactions behind the cursor, current one included.
    pub fn undo_count(&self) -> usize {
        self.undo_count
    }

    /// Transactions ahead of the cursor.
    pub fn redo_count(&self) -> usize {
        self.redo_count
    }

    /// Number of actions in the current transaction.
    pub fn current_len(&self) -> usize {
        self.transactions[self.cursor].len()
    }

    /// Whether [`undo`](Self::undo) would revert anything.
    pub fn can_undo(&self) -> bool {
        self.undo_count > 1 || !self.transactions[self.cursor].is_empty()
    }

    /// Whether [`redo`](Self::redo) would re-apply anything.
    pub fn can_redo(&self) -> bool {
        self.redo_count > 0
    }

    /// Names of the actions in the current transaction, oldest first.
    pub fn current_names(&self) -> Vec<&'static str> {
        self.transactions[self.cursor].iter().map(|a| a.name()).collect()
    }

    fn slot(&self, offset: isize) -> usize {
        let cap = self.capacity() as isize;
        (self.cursor as isize + offset).rem_euclid(cap) as usize
    }

    /// Performs `action` and records it in the current transaction, merging it
    /// into the previous action when that action accepts it.
    pub fn perform(&mut self, mut action: Box<dyn ReversibleAction>) -> Result<(), UndoError> {
        let busy = Arc::clone(&self.busy);
        let Some(_guard) = BusyGuard::enter(&busy) else {
            #[cfg(feature = "tracing")]
            tracing::warn!(action = action.name(), "perform rejected during replay");
            return Err(UndoError::Reentrant);
        };
        if self.redo_count != 0 {
            if cfg!(debug_assertions) {
                panic!("perform({}) with {} redo transactions pending", action.name(), self.redo_count);
            }
            #[cfg(feature = "tracing")]
            tracing::warn!(action = action.name(), "perform rejected: redo history pending");
            return Err(UndoError::RedoPending);
        }

        action.perform().map_err(UndoError::Action)?;

        let current = &mut self.transactions[self.cursor];
        if let Some(last) = current.last_mut() {
            match last.coalesce_with(action.as_ref()) {
                Coalesce::Merged => return Ok(()),
                Coalesce::Cancelled => {
                    current.pop();
                    return Ok(());
                }
                Coalesce::Unmerged => {}
            }
        }
        current.push(action);
        Ok(())
    }

    /// Closes the current transaction and opens a new one, discarding redo
    /// history. An empty current transaction is reused.
    pub fn begin_new_transaction(&mut self) {
        self.clear_redo();
        if self.transactions[self.cursor].is_empty() {
            return;
        }
        self.cursor = self.slot(1);
        self.transactions[self.cursor].clear();
        self.undo_count = (self.undo_count + 1).min(self.capacity());
        #[cfg(feature = "tracing")]
        tracing::trace!(cursor = self.cursor, undo = self.undo_count, "transaction begun");
    }

    fn clear_redo(&mut self) {
        for offset in 1..=self.redo_count {
            let slot = self.slot(offset as isize);
            self.transactions[slot].clear();
        }
        self.redo_count = 0;
    }

    /// Reverts the current transaction, most recent action first.
    ///
    /// Unless `current_transaction_only`, the cursor then moves back so the
    /// reverted transaction becomes redoable; otherwise the current
    /// transaction is discarded in place along with any redo history recorded
    /// on top of it. Returns whether anything was reverted. If any action
    /// fails, the whole log is cleared.
    pub fn undo(&mut self, current_transaction_only: bool) -> Result<bool, UndoError> {
        let busy = Arc::clone(&self.busy);
        let Some(_guard) = BusyGuard::enter(&busy) else {
            return Err(UndoError::Reentrant);
        };

        if !current_transaction_only && self.redo_count == 0 {
            while self.undo_count > 1 && self.transactions[self.cursor].is_empty() {
                self.cursor = self.slot(-1);
                self.undo_count -= 1;
            }
        }
        if self.transactions[self.cursor].is_empty() {
            return Ok(false);
        }
        if current_transaction_only && self.redo_count != 0 {
            #[cfg(feature = "tracing")]
            tracing::debug!(redo = self.redo_count, "discarding redo history above reverted transaction");
            self.clear_redo();
        }

        let cursor = self.cursor;
        let replay = self.transactions[cursor]
            .iter_mut()
            .rev()
            .try_for_each(|action| action.undo());
        if let Err(err) = replay {
            return Err(self.replay_failed(err));
        }

        if current_transaction_only {
            self.transactions[cursor].clear();
        } else {
            self.step_back();
        }
        Ok(true)
    }

    fn step_back(&mut self) {
        self.cursor = self.slot(-1);
        if self.undo_count > 1 {
            self.undo_count -= 1;
        } else {
            self.transactions[self.cursor].clear();
        }
        self.redo_count = (self.redo_count + 1).min(self.capacity() - self.undo_count);
    }

    /// Re-applies the transaction ahead of the cursor and moves onto it.
    /// Returns whether anything was re-applied. If any action fails, the
    /// whole log is cleared.
    pub fn redo(&mut self) -> Result<bool, UndoError> {
        let busy = Arc::clone(&self.busy);
        let Some(_guard) = BusyGuard::enter(&busy) else {
            return Err(UndoError::Reentrant);
        };
        if self.redo_count == 0 {
            return Ok(false);
        }

        let next = self.slot(1);
        let replay = self.transactions[next]
            .iter_mut()
            .try_for_each(|action| action.redo());
        if let Err(err) = replay {
            return Err(self.replay_failed(err));
        }

        let vacated_empty = self.transactions[self.cursor].is_empty();
        self.cursor = next;
        self.redo_count -= 1;
        if !(self.undo_count == 1 && vacated_empty) {
            self.undo_count = (self.undo_count + 1).min(self.capacity());
        }
        Ok(true)
    }

    fn replay_failed(&mut self, err: ActionError) -> UndoError {
        #[cfg(feature = "tracing")]
        tracing::error!("replay failed, clearing transaction log: {err}");
        self.clear();
        UndoError::ReplayFailed(err)
    }

    /// Drops every transaction.
    pub fn clear(&mut self) {
        for transaction in &mut self.transactions {
            transaction.clear();
        }
        self.cursor = 0;
        self.undo_count = 1;
        self.redo_count = 0;
    }

    /// Resizes the ring, keeping logical order.
    ///
    /// When everything fits, everything is kept. Otherwise up to half the new
    /// capacity is reserved for the nearest redo transactions, the newest undo
    /// transactions fill the rest, and any remaining room goes back to redo.
    pub fn set_capacity(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        let old_capacity = self.capacity();
        let undo = self.undo_count;
        let redo = self.redo_count;
        let oldest = self.slot(1 - undo as isize);

        let mut ordered: Vec<Transaction> = (0..undo + redo)
            .map(|i| std::mem::take(&mut self.transactions[(oldest + i) % old_capacity]))
            .collect();

        let (undo_keep, redo_keep) = if undo + redo <= capacity {
            (undo, redo)
        } else {
            let redo_keep = redo.min(capacity / 2);
            let undo_keep = undo.min(capacity - redo_keep);
            (undo_keep, redo.min(capacity - undo_keep))
        };

        let mut transactions: Vec<Transaction> = ordered.drain(undo - undo_keep..undo + redo_keep).collect();
        transactions.resize_with(capacity, Vec::new);
        self.transactions = transactions;
        self.cursor = undo_keep - 1;
        self.undo_count = undo_keep;
        self.redo_count = redo_keep;
        #[cfg(feature = "tracing")]
        tracing::debug!(capacity, undo = undo_keep, redo = redo_keep, "transaction log resized");
    }
}

impl std::fmt::Debug for TransactionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionLog")
            .field("capacity", &self.capacity())
            .field("cursor", &self.cursor)
            .field("undo_count", &self.undo_count)
            .field("redo_count", &self.redo_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::any::Any;

    /// Appends its tag to a shared history on perform, removes it on undo.
    struct Tag {
        history: Arc<Mutex<Vec<u32>>>,
        tag: u32,
        fail_undo: bool,
    }

    impl ReversibleAction for Tag {
        fn perform(&mut self) -> Result<(), ActionError> {
            self.history.lock().push(self.tag);
            Ok(())
        }

        fn undo(&mut self) -> Result<(), ActionError> {
            if self.fail_undo {
                return Err(ActionError::MissingState("tag"));
            }
            let popped = self.history.lock().pop();
            assert_eq!(popped, Some(self.tag));
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn name(&self) -> &'static str {
            "tag"
        }
    }

    /// Merges with a directly preceding `Merge` of the same key.
    struct Merge {
        key: u32,
        cancel: bool,
    }

    impl ReversibleAction for Merge {
        fn perform(&mut self) -> Result<(), ActionError> {
            Ok(())
        }

        fn undo(&mut self) -> Result<(), ActionError> {
            Ok(())
        }

        fn coalesce_with(&mut self, next: &dyn ReversibleAction) -> Coalesce {
            match next.as_any().downcast_ref::<Merge>() {
                Some(next) if next.key == self.key && next.cancel => Coalesce::Cancelled,
                Some(next) if next.key == self.key => Coalesce::Merged,
                _ => Coalesce::Unmerged,
            }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn name(&self) -> &'static str {
            "merge"
        }
    }

    struct Failing;

    impl ReversibleAction for Failing {
        fn perform(&mut self) -> Result<(), ActionError> {
            Err(ActionError::NoWaitFunction)
        }

        fn undo(&mut self) -> Result<(), ActionError> {
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    fn history() -> Arc<Mutex<Vec<u32>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn tag(history: &Arc<Mutex<Vec<u32>>>, tag: u32) -> Box<dyn ReversibleAction> {
        Box::new(Tag {
            history: Arc::clone(history),
            tag,
            fail_undo: false,
        })
    }

    fn record(log: &mut TransactionLog, history: &Arc<Mutex<Vec<u32>>>, tag_value: u32) {
        log.begin_new_transaction();
        log.perform(tag(history, tag_value)).unwrap();
    }

    fn assert_bounds(log: &TransactionLog) {
        assert!(log.undo_count() >= 1);
        assert!(log.undo_count() + log.redo_count() <= log.capacity());
    }

    #[test]
    fn new_log_is_empty() {
        let log = TransactionLog::default();
        assert_eq!(log.capacity(), DEFAULT_CAPACITY);
        assert_eq!(log.undo_count(), 1);
        assert!(!log.can_undo());
        assert!(!log.can_redo());
    }

    #[test]
    fn undo_redo_replays_in_order() {
        let h = history();
        let mut log = TransactionLog::new(10);
        log.perform(tag(&h, 1)).unwrap();
        log.perform(tag(&h, 2)).unwrap();
        record(&mut log, &h, 3);
        assert_eq!(*h.lock(), vec![1, 2, 3]);

        assert!(log.undo(false).unwrap());
        assert_eq!(*h.lock(), vec![1, 2]);
        assert!(log.undo(false).unwrap());
        assert!(h.lock().is_empty());
        assert!(!log.undo(false).unwrap());

        assert!(log.redo().unwrap());
        assert_eq!(*h.lock(), vec![1, 2]);
        assert!(log.redo().unwrap());
        assert_eq!(*h.lock(), vec![1, 2, 3]);
        assert!(!log.redo().unwrap());
        assert_bounds(&log);
    }

    #[test]
    fn begin_on_empty_transaction_keeps_slot() {
        let mut log = TransactionLog::new(4);
        log.begin_new_transaction();
        log.begin_new_transaction();
        assert_eq!(log.undo_count(), 1);
    }

    #[test]
    fn begin_after_undo_drops_redo() {
        let h = history();
        let mut log = TransactionLog::new(4);
        record(&mut log, &h, 1);
        record(&mut log, &h, 2);
        log.undo(false).unwrap();
        assert!(log.can_redo());
        log.begin_new_transaction();
        assert!(!log.can_redo());
        log.perform(tag(&h, 9)).unwrap();
        assert_eq!(*h.lock(), vec![1, 9]);
        log.undo(false).unwrap();
        log.undo(false).unwrap();
        assert!(h.lock().is_empty());
    }

    #[test]
    fn current_only_discards_in_place() {
        let h = history();
        let mut log = TransactionLog::new(4);
        record(&mut log, &h, 1);
        record(&mut log, &h, 2);
        assert!(log.undo(true).unwrap());
        assert_eq!(*h.lock(), vec![1]);
        assert_eq!(log.current_len(), 0);
        assert!(!log.can_redo());
        assert!(log.undo(false).unwrap());
        assert!(h.lock().is_empty());
    }

    #[test]
    fn current_only_after_undo_drops_redo() {
        let h = history();
        let mut log = TransactionLog::new(4);
        record(&mut log, &h, 1);
        record(&mut log, &h, 2);
        record(&mut log, &h, 3);
        log.undo(false).unwrap();
        assert_eq!(*h.lock(), vec![1, 2]);

        assert!(log.undo(true).unwrap());
        assert_eq!(*h.lock(), vec![1]);
        assert!(!log.can_redo());
        assert!(!log.redo().unwrap());
        assert_eq!(*h.lock(), vec![1]);

        assert!(log.can_undo());
        assert!(log.undo(false).unwrap());
        assert!(h.lock().is_empty());
        assert!(log.redo().unwrap());
        assert_eq!(*h.lock(), vec![1]);
        assert_bounds(&log);
    }

    #[test]
    fn current_only_on_oldest_with_redo_pending() {
        let h = history();
        let mut log = TransactionLog::new(4);
        record(&mut log, &h, 1);
        record(&mut log, &h, 2);
        log.undo(false).unwrap();
        assert!(log.undo(true).unwrap());
        assert!(h.lock().is_empty());
        assert!(!log.redo().unwrap());
        assert!(!log.can_undo());
        assert!(h.lock().is_empty());
        assert_bounds(&log);
    }

    #[test]
    fn overflow_drops_oldest() {
        let h = history();
        let mut log = TransactionLog::new(3);
        for i in 0..5 {
            record(&mut log, &h, i);
            assert_bounds(&log);
        }
        assert_eq!(log.undo_count(), 3);
        let mut undone = 0;
        while log.undo(false).unwrap() {
            undone += 1;
            assert_bounds(&log);
        }
        assert_eq!(undone, 3);
        assert_eq!(*h.lock(), vec![0, 1]);
    }

    #[test]
    fn coalescing_merges_and_cancels() {
        let mut log = TransactionLog::new(4);
        log.perform(Box::new(Merge { key: 1, cancel: false })).unwrap();
        log.perform(Box::new(Merge { key: 1, cancel: false })).unwrap();
        assert_eq!(log.current_len(), 1);
        log.perform(Box::new(Merge { key: 2, cancel: false })).unwrap();
        assert_eq!(log.current_len(), 2);
        log.perform(Box::new(Merge { key: 2, cancel: true })).unwrap();
        assert_eq!(log.current_names(), vec!["merge"]);
    }

    #[test]
    fn failed_perform_is_not_recorded() {
        let mut log = TransactionLog::new(4);
        assert_eq!(
            log.perform(Box::new(Failing)),
            Err(UndoError::Action(ActionError::NoWaitFunction))
        );
        assert_eq!(log.current_len(), 0);
    }

    #[test]
    fn replay_failure_clears_log() {
        let h = history();
        let mut log = TransactionLog::new(4);
        record(&mut log, &h, 1);
        log.begin_new_transaction();
        log.perform(Box::new(Tag {
            history: Arc::clone(&h),
            tag: 2,
            fail_undo: true,
        }))
        .unwrap();
        assert!(matches!(log.undo(false), Err(UndoError::ReplayFailed(_))));
        assert!(!log.can_undo());
        assert!(!log.can_redo());
        assert_eq!(log.undo_count(), 1);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "redo transactions pending")]
    fn perform_with_pending_redo_panics_in_debug() {
        let h = history();
        let mut log = TransactionLog::new(4);
        record(&mut log, &h, 1);
        log.undo(false).unwrap();
        let _ = log.perform(tag(&h, 2));
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn perform_with_pending_redo_is_rejected_in_release() {
        let h = history();
        let mut log = TransactionLog::new(4);
        record(&mut log, &h, 1);
        log.undo(false).unwrap();
        assert_eq!(log.perform(tag(&h, 2)), Err(UndoError::RedoPending));
        assert_eq!(log.redo_count(), 1);
    }

    #[test]
    fn monitor_reports_busy() {
        let log = TransactionLog::new(2);
        let monitor = log.monitor();
        assert!(!monitor.is_replaying());
        let _guard = BusyGuard::enter(&log.busy).unwrap();
        assert!(monitor.is_replaying());
        assert!(BusyGuard::enter(&log.busy).is_none());
    }

    #[test]
    fn resize_keeps_everything_that_fits() {
        let h = history();
        let mut log = TransactionLog::new(10);
        for i in 1..=4 {
            record(&mut log, &h, i);
        }
        log.undo(false).unwrap();
        log.set_capacity(5);
        assert_eq!(log.capacity(), 5);
        assert_eq!(log.redo_count(), 1);
        log.redo().unwrap();
        assert_eq!(*h.lock(), vec![1, 2, 3, 4]);
        while log.undo(false).unwrap() {}
        assert!(h.lock().is_empty());
    }

    #[test]
    fn resize_smaller_keeps_newest() {
        let h = history();
        let mut log = TransactionLog::new(10);
        for i in 1..=8 {
            record(&mut log, &h, i);
        }
        log.undo(false).unwrap();
        log.undo(false).unwrap();
        log.set_capacity(4);
        assert_bounds(&log);
        assert_eq!(log.redo_count(), 2);
        assert_eq!(log.undo_count(), 2);

        log.redo().unwrap();
        log.redo().unwrap();
        assert_eq!(*h.lock(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let mut undone = 0;
        while log.undo(false).unwrap() {
            undone += 1;
        }
        assert_eq!(undone, 4);
        assert_eq!(*h.lock(), vec![1, 2, 3, 4]);
    }
}
