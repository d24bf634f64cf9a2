//! Blocking primitives: cancellation tokens, interruptible locks, the
//! producer/consumer frame rendezvous, and frame-rate pacing.
//!
//! Every wait in this module parks on a condition variable and is woken by
//! its producer or by a [`CancelToken`]; nothing here spins or polls.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

/// A blocking operation was interrupted by [`CancelToken::cancel`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cancelled;

/// Wakes one registered waiter so it can observe the cancellation flag.
///
/// Implementations must take the waiter's own mutex before notifying; that
/// closes the window between a waiter's flag check and its park.
trait Notify: Send + Sync {
    fn notify(&self);
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    next_waiter: AtomicU64,
    waiters: Mutex<Vec<(u64, Arc<dyn Notify>)>>,
}

/// Shared cancellation flag for the blocking operations issued through one
/// device handle.
///
/// Cancellation is sticky: once [`cancel`](Self::cancel) runs, every current
/// and future wait on this token fails with [`Cancelled`].
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Raises the flag and wakes every registered waiter.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let waiters = self.inner.waiters.lock().unwrap();
        for (_, waiter) in waiters.iter() {
            waiter.notify();
        }
    }

    fn subscribe(&self, waiter: Arc<dyn Notify>) -> CancelSubscription<'_> {
        let id = self.inner.next_waiter.fetch_add(1, Ordering::Relaxed);
        self.inner.waiters.lock().unwrap().push((id, waiter));
        CancelSubscription { token: self, id }
    }
}

/// Keeps a waiter registered with its token; deregisters on drop.
struct CancelSubscription<'a> {
    token: &'a CancelToken,
    id: u64,
}

impl Drop for CancelSubscription<'_> {
    fn drop(&mut self) {
        let mut waiters = self.token.inner.waiters.lock().unwrap();
        if let Some(pos) = waiters.iter().position(|(id, _)| *id == self.id) {
            waiters.swap_remove(pos);
        }
    }
}

#[derive(Default)]
struct LockShared {
    gate: Mutex<()>,
    unlocked: Condvar,
}

impl Notify for LockShared {
    fn notify(&self) {
        let _gate = self.gate.lock().unwrap();
        self.unlocked.notify_all();
    }
}

/// Mutual exclusion whose waiters can be interrupted.
///
/// `std::sync::Mutex` parks uninterruptibly, so acquisition is built from
/// `try_lock` plus a gate condvar that the holder signals on release.
pub struct Lock<T> {
    value: Mutex<T>,
    shared: Arc<LockShared>,
}

impl<T> Lock<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
            shared: Arc::default(),
        }
    }

    /// Acquires the lock, failing with [`Cancelled`] if `cancel` fires while
    /// this thread is parked.
    pub fn lock(&self, cancel: &CancelToken) -> Result<LockGuard<'_, T>, Cancelled> {
        if let Some(value) = self.try_acquire() {
            return Ok(LockGuard {
                value: Some(value),
                shared: &self.shared,
            });
        }
        let _sub = cancel.subscribe(Arc::clone(&self.shared) as Arc<dyn Notify>);
        let mut gate = self.shared.gate.lock().unwrap();
        loop {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }
            if let Some(value) = self.try_acquire() {
                return Ok(LockGuard {
                    value: Some(value),
                    shared: &self.shared,
                });
            }
            gate = self.shared.unlocked.wait(gate).unwrap();
        }
    }

    fn try_acquire(&self) -> Option<MutexGuard<'_, T>> {
        match self.value.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::WouldBlock) => None,
            Err(TryLockError::Poisoned(err)) => panic!("poisoned device lock: {err}"),
        }
    }
}

pub struct LockGuard<'a, T> {
    value: Option<MutexGuard<'a, T>>,
    shared: &'a LockShared,
}

impl<T> Deref for LockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value.as_ref().unwrap()
    }
}

impl<T> DerefMut for LockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().unwrap()
    }
}

impl<T> Drop for LockGuard<'_, T> {
    fn drop(&mut self) {
        // Release the value before signalling, so a woken waiter's try_lock
        // cannot race a still-held mutex.
        self.value = None;
        let _gate = self.shared.gate.lock().unwrap();
        self.shared.unlocked.notify_all();
    }
}

#[derive(Default)]
struct SignalState {
    /// Threads currently parked in `wait` or `wait_timeout`.
    waiting: usize,
    /// Releases granted by `publish` but not yet consumed by a waiter.
    /// Never exceeds `waiting`.
    pending: usize,
    last_sequence: u64,
}

#[derive(Default)]
struct SignalShared {
    state: Mutex<SignalState>,
    arrived: Condvar,
}

impl Notify for SignalShared {
    fn notify(&self) {
        let _state = self.state.lock().unwrap();
        self.arrived.notify_all();
    }
}

/// Rendezvous between the frame producer and its consumers.
///
/// Each publish releases exactly one parked consumer. A publish that finds
/// no consumer parked is dropped outright; it is never queued for a later
/// arrival, so a consumer always observes a frame completed *after* it
/// started waiting.
#[derive(Default)]
pub struct FrameSignal {
    shared: Arc<SignalShared>,
}

impl FrameSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands `sequence` to one parked consumer, if any.
    pub fn publish(&self, sequence: u64) {
        let mut state = self.shared.state.lock().unwrap();
        if state.pending < state.waiting {
            state.pending += 1;
            state.last_sequence = sequence;
            self.shared.arrived.notify_all();
        }
    }

    /// Blocks until a frame is published or `cancel` fires.
    ///
    /// A pending cancellation wins over a pending frame.
    pub fn wait(&self, cancel: &CancelToken) -> Result<u64, Cancelled> {
        let _sub = cancel.subscribe(Arc::clone(&self.shared) as Arc<dyn Notify>);
        let mut state = self.shared.state.lock().unwrap();
        state.waiting += 1;
        loop {
            if cancel.is_cancelled() {
                Self::depart(&mut state);
                return Err(Cancelled);
            }
            if state.pending > 0 {
                state.pending -= 1;
                state.waiting -= 1;
                return Ok(state.last_sequence);
            }
            state = self.shared.arrived.wait(state).unwrap();
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`, returning
    /// `Ok(None)` when the deadline passes without a frame.
    pub fn wait_timeout(
        &self,
        cancel: &CancelToken,
        timeout: Duration,
    ) -> Result<Option<u64>, Cancelled> {
        let deadline = Instant::now() + timeout;
        let _sub = cancel.subscribe(Arc::clone(&self.shared) as Arc<dyn Notify>);
        let mut state = self.shared.state.lock().unwrap();
        state.waiting += 1;
        loop {
            if cancel.is_cancelled() {
                Self::depart(&mut state);
                return Err(Cancelled);
            }
            if state.pending > 0 {
                state.pending -= 1;
                state.waiting -= 1;
                return Ok(Some(state.last_sequence));
            }
            let now = Instant::now();
            if now >= deadline {
                Self::depart(&mut state);
                return Ok(None);
            }
            let (guard, _) = self
                .shared
                .arrived
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = guard;
        }
    }

    /// Deregisters a waiter that leaves without consuming a grant. A grant
    /// left with no waiter to take it is dropped, keeping `pending` within
    /// `waiting`.
    fn depart(state: &mut SignalState) {
        state.waiting -= 1;
        state.pending = state.pending.min(state.waiting);
    }
}

/// Spaces frame traffic to the configured rate.
///
/// The anchor advances by exactly one period per paced frame, so wakeup
/// jitter does not accumulate; a producer that falls behind re-anchors at
/// the current time instead of bursting to catch up.
pub struct FramePacer {
    anchor: Instant,
    idle: FrameSignal,
}

impl FramePacer {
    pub fn new() -> Self {
        Self {
            anchor: Instant::now(),
            idle: FrameSignal::new(),
        }
    }

    /// Re-anchors the schedule at the present moment.
    pub fn mark(&mut self) {
        self.anchor = Instant::now();
    }

    /// Blocks until one frame period after the previously paced frame.
    ///
    /// `fps == 0` disables pacing entirely. The period is the integer
    /// millisecond count `1000 / fps`, so rates above 1000 collapse to
    /// back-to-back frames. Cancellation interrupts the delay.
    pub fn pace(&mut self, fps: u32, cancel: &CancelToken) -> Result<(), Cancelled> {
        if fps == 0 {
            self.anchor = Instant::now();
            return Ok(());
        }
        let period = Duration::from_millis(u64::from(1000 / fps));
        let due = self.anchor + period;
        let now = Instant::now();
        match due.checked_duration_since(now) {
            Some(wait) => {
                if !wait.is_zero() {
                    self.idle.wait_timeout(cancel, wait)?;
                }
                self.anchor = due;
            }
            None => self.anchor = now,
        }
        Ok(())
    }
}

impl Default for FramePacer {
    fn default() -> Self {
        Self::new()
    }
}
