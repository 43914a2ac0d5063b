//! Locking primitives shared by the UI, host, and audio threads.
//!
//! Two granularities exist:
//!
//! - [`SpinLock`] guards a handful of fields for a few instructions at a time
//!   (one parameter's state, one bridge's display name). Acquisition has
//!   acquire ordering, release has release ordering. The real-time thread may
//!   take it; holders must never allocate, log, or call out across an unbounded
//!   amount of work.
//! - [`EditGate`] guards state that structural edits rewrite wholesale (the
//!   module graph). The audio thread only ever *tries* to enter it and skips a
//!   block when an edit is in progress; the UI thread *waits* for the current
//!   block to finish and receives an [`EditScope`] whose drop signals that the
//!   mutation is done.
//!
//! ```text
//! UI thread ──► EditGate::wait() ──(parks until block ends)──► EditScope ── mutate ── drop
//!                                                                 │
//! Audio thread ──► EditGate::try_enter() ──(None while scope held)┘
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use lock_api::ArcMutexGuard;
use parking_lot::{Mutex, MutexGuard, RawMutex};

/// Spin iterations between cooperative yields while contended.
const SPINS_BEFORE_YIELD: u32 = 64;

/// Guard returned by [`SpinLock::lock`] and [`SpinLock::try_lock`].
pub type SpinGuard<'a, T> = MutexGuard<'a, T>;

/// Short-critical-section lock.
///
/// Never parks the calling thread: a contended `lock()` busy-waits with
/// [`std::hint::spin_loop`] and yields the time slice every
/// `SPINS_BEFORE_YIELD` attempts. Use [`try_lock`](Self::try_lock) on paths
/// that must not wait at all.
#[derive(Debug, Default)]
pub struct SpinLock<T> {
    inner: Mutex<T>,
}

impl<T> SpinLock<T> {
    /// Creates an unlocked spin lock holding `value`.
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Acquires the lock, spinning until it is free.
    #[inline]
    pub fn lock(&self) -> SpinGuard<'_, T> {
        let mut spins = 0u32;
        loop {
            if let Some(guard) = self.inner.try_lock() {
                return guard;
            }
            spins = spins.wrapping_add(1);
            if spins % SPINS_BEFORE_YIELD == 0 {
                std::thread::yield_now();
            } else {
                std::hint::spin_loop();
            }
        }
    }

    /// Acquires the lock only if it is immediately available.
    #[inline]
    pub fn try_lock(&self) -> Option<SpinGuard<'_, T>> {
        self.inner.try_lock()
    }

    /// Mutable access without locking; exclusive borrow proves no other holder.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// Consumes the lock, returning the protected value.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

/// Owned token proving exclusive, audio-block-safe access to gated state.
///
/// Dropping the scope releases the gate and lets the audio thread enter the
/// next block.
pub struct EditScope<T> {
    guard: ArcMutexGuard<RawMutex, T>,
}

impl<T> Deref for EditScope<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for EditScope<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> std::fmt::Debug for EditScope<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditScope").finish_non_exhaustive()
    }
}

/// Zero-argument callable that blocks until mutation is safe.
///
/// Injected into every [`Waiting`](crate::undo::Waiting) action.
pub type WaitFn<T> = Arc<dyn Fn() -> EditScope<T> + Send + Sync>;

/// Coarse synchronization point between structural edits and audio blocks.
///
/// Cloning produces another handle to the same gate.
pub struct EditGate<T> {
    shared: Arc<Mutex<T>>,
}

impl<T> Clone for EditGate<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> EditGate<T> {
    /// Creates a gate around `value`.
    pub fn new(value: T) -> Self {
        Self {
            shared: Arc::new(Mutex::new(value)),
        }
    }

    /// Blocks until no audio block is running, then holds the gate.
    pub fn wait(&self) -> EditScope<T> {
        EditScope {
            guard: self.shared.lock_arc(),
        }
    }

    /// Holds the gate only if no one else does.
    pub fn try_wait(&self) -> Option<EditScope<T>> {
        self.shared
            .try_lock_arc()
            .map(|guard| EditScope { guard })
    }

    /// Audio-thread entry for one block. Returns `None` while an edit holds
    /// the gate; the caller skips the block instead of waiting.
    #[inline]
    pub fn try_enter(&self) -> Option<MutexGuard<'_, T>> {
        self.shared.try_lock()
    }

    /// Returns a [`WaitFn`] bound to this gate.
    pub fn wait_function(&self) -> WaitFn<T> {
        let gate = self.clone();
        Arc::new(move || gate.wait())
    }
}
