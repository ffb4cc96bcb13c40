//! # Shared handle to a single scheduled timeout.
//!
//! A [`Timeout`] is created by the timer facade and shared between the caller
//! (who may cancel it) and the worker (who fires it). The state machine is
//! strict:
//!
//! ```text
//! INIT ──fire──► EXPIRED
//!   └──cancel──► CANCELLED
//! ```
//!
//! Neither `EXPIRED` nor `CANCELLED` transitions further. A periodic timeout
//! stays `INIT` while armed: it leaves the state machine only through
//! cancellation, so the worker can keep re-arming it.
//!
//! ## Identity
//! `id` is 64 bits: the high bits hold a monotonic counter, the low
//! `ceil(log2(wheel_size))` bits hold the current slot, so an id holder can
//! locate the timeout in O(bucket size). When a periodic timeout is
//! rescheduled the slot bits are refreshed but the counter is preserved.
//! `id == 0` means "not yet scheduled".

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

/// User task invoked when a timeout fires.
///
/// Implemented for plain closures: `Arc::new(|t: &Timeout| { ... })`.
pub trait TimerTask: Send + Sync + 'static {
    /// Runs the task. Panics are caught and logged by the dispatching facade;
    /// a periodic task stays scheduled even if one iteration panics.
    fn run(&self, timeout: &Timeout);
}

impl<F> TimerTask for F
where
    F: Fn(&Timeout) + Send + Sync + 'static,
{
    fn run(&self, timeout: &Timeout) {
        self(timeout)
    }
}

/// Shared handle to a task object.
pub type TimerTaskRef = Arc<dyn TimerTask>;

/// Lifecycle state of a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TimeoutState {
    /// Scheduled (or re-armed) and waiting to fire.
    Init = 0,
    /// Fired; terminal.
    Expired = 1,
    /// Cancelled; terminal.
    Cancelled = 2,
}

struct Inner {
    state: AtomicU8,
    /// Absolute firing time in clock milliseconds. Worker-owned after
    /// scheduling; atomics only because the handle crosses threads.
    deadline: AtomicU64,
    /// Re-arm interval; 0 unless periodic.
    delay: u64,
    /// Wheel slot holding this timeout.
    slot: AtomicUsize,
    /// Counter/slot identity; 0 until first scheduled.
    id: AtomicU64,
    task: TimerTaskRef,
}

/// Shared, cancellable timeout handle.
#[derive(Clone)]
pub struct Timeout {
    inner: Arc<Inner>,
}

impl Timeout {
    /// Creates a timeout firing at `now + delay` (all milliseconds).
    ///
    /// With `periodic`, the worker re-arms it at `deadline + delay` after each
    /// firing until it is cancelled. Facades construct these; hand-rolled
    /// drivers embedding a [`TimerWorker`](crate::TimerWorker) may too.
    pub fn new(task: TimerTaskRef, now_millis: u64, delay_millis: u64, periodic: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(TimeoutState::Init as u8),
                deadline: AtomicU64::new(now_millis.saturating_add(delay_millis)),
                delay: if periodic { delay_millis } else { 0 },
                slot: AtomicUsize::new(0),
                id: AtomicU64::new(0),
                task,
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TimeoutState {
        match self.inner.state.load(Ordering::Acquire) {
            0 => TimeoutState::Init,
            1 => TimeoutState::Expired,
            _ => TimeoutState::Cancelled,
        }
    }

    /// Marks the timeout cancelled. Idempotent; always succeeds.
    ///
    /// The worker drops the entry the next time it sweeps its slot; a
    /// cancelled periodic timeout is never re-armed.
    pub fn cancel(&self) {
        // Never demote EXPIRED.
        let _ = self.inner.state.compare_exchange(
            TimeoutState::Init as u8,
            TimeoutState::Cancelled as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// True once [`Timeout::cancel`] has taken effect.
    pub fn is_cancelled(&self) -> bool {
        self.state() == TimeoutState::Cancelled
    }

    /// True once the timeout has fired (non-periodic only).
    pub fn is_expired(&self) -> bool {
        self.state() == TimeoutState::Expired
    }

    /// True if the timeout re-arms itself after firing.
    pub fn is_periodic(&self) -> bool {
        self.inner.delay != 0
    }

    /// Absolute firing time in clock milliseconds.
    pub fn deadline_millis(&self) -> u64 {
        self.inner.deadline.load(Ordering::Acquire)
    }

    /// Re-arm interval in milliseconds; 0 unless periodic.
    pub fn delay_millis(&self) -> u64 {
        self.inner.delay
    }

    /// Counter/slot identity; 0 until first scheduled.
    pub fn id(&self) -> u64 {
        self.inner.id.load(Ordering::Acquire)
    }

    pub(crate) fn task(&self) -> &TimerTaskRef {
        &self.inner.task
    }

    pub(crate) fn slot(&self) -> usize {
        self.inner.slot.load(Ordering::Acquire)
    }

    pub(crate) fn set_slot(&self, slot: usize) {
        self.inner.slot.store(slot, Ordering::Release);
    }

    pub(crate) fn set_id(&self, id: u64) {
        self.inner.id.store(id, Ordering::Release);
    }

    pub(crate) fn set_deadline(&self, deadline_millis: u64) {
        self.inner.deadline.store(deadline_millis, Ordering::Release);
    }

    /// Transitions `INIT -> EXPIRED` for non-periodic timeouts.
    ///
    /// Returns true if this firing should dispatch the task: either the
    /// transition happened, or the timeout is periodic and still armed.
    /// `CANCELLED` stays `CANCELLED` and never dispatches.
    pub(crate) fn fire(&self) -> bool {
        if self.is_periodic() {
            return self.state() == TimeoutState::Init;
        }
        self.inner
            .state
            .compare_exchange(
                TimeoutState::Init as u8,
                TimeoutState::Expired as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Identity comparison helper for bucket removal.
    pub(crate) fn same(&self, other: &Timeout) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Timeout {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for Timeout {}

impl fmt::Debug for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeout")
            .field("deadline_ms", &self.deadline_millis())
            .field("delay_ms", &self.inner.delay)
            .field("slot", &self.slot())
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> TimerTaskRef {
        Arc::new(|_: &Timeout| {})
    }

    #[test]
    fn cancel_is_idempotent_and_sticky() {
        let t = Timeout::new(noop(), 0, 50, false);
        t.cancel();
        t.cancel();
        assert!(t.is_cancelled());
        assert!(!t.fire());
        assert!(t.is_cancelled());
    }

    #[test]
    fn fire_is_one_shot_for_non_periodic() {
        let t = Timeout::new(noop(), 0, 50, false);
        assert!(t.fire());
        assert!(t.is_expired());
        assert!(!t.fire());
        // EXPIRED is terminal; cancel must not demote it.
        t.cancel();
        assert!(t.is_expired());
    }

    #[test]
    fn periodic_keeps_dispatching_until_cancelled() {
        let t = Timeout::new(noop(), 0, 50, true);
        assert!(t.is_periodic());
        assert!(t.fire());
        assert!(t.fire());
        t.cancel();
        assert!(!t.fire());
    }
}
