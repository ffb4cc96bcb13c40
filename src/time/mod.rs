//! Hashed-wheel timer: the engine behind every time-based event on the
//! platform (I/O deadlines, user timers, redeploy scanning).
//!
//! ## Contents
//! - [`wheel`] — fixed ring with modular indexing
//! - [`bucket`] — tombstoned slot collection with FIFO iteration
//! - [`timeout`] — shared timeout handle with an atomic state machine
//! - [`worker`] — the single-owner engine: schedule, expire, reschedule
//! - [`timer`] — mode A facade: dedicated thread + bounded event queue
//! - [`loop_timer`] — mode B facade: the engine owned by one async task
//! - [`clock`] — time source abstraction (system or manual)
//!
//! ## Ownership rule
//! All wheel mutations happen on exactly one owner thread: the dedicated
//! timer thread ([`WheelTimer`]) or the event-loop task ([`LoopTimer`]).
//! External callers enqueue commands; the owner consumes them serially, so
//! the hot path takes no locks.
//!
//! ## Accuracy
//! The timer is approximate: a timeout fires within one tick of its
//! deadline. Shrink the tick duration for finer resolution.

mod bucket;
mod clock;
mod loop_timer;
mod timeout;
mod timer;
mod wheel;
mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use loop_timer::LoopTimer;
pub use timeout::{Timeout, TimeoutState, TimerTask, TimerTaskRef};
pub use timer::WheelTimer;
pub use worker::TimerWorker;

use std::time::Duration;

use crate::actions::ActionFuture;
use crate::error::TimerError;

/// Public surface shared by both timer deployment modes.
///
/// The trait masks whether the engine runs on a dedicated thread
/// ([`WheelTimer`]) or inside an event loop task ([`LoopTimer`]).
pub trait Timer: Send + Sync {
    /// Schedules `task` to run after `delay`; with `periodic`, re-armed at
    /// `deadline + delay` after each firing until cancelled.
    fn new_timeout(
        &self,
        task: TimerTaskRef,
        delay: Duration,
        periodic: bool,
    ) -> Result<Timeout, TimerError>;

    /// Removes a timeout so it never fires.
    ///
    /// Post-stop removals are silent no-ops.
    fn remove(&self, timeout: &Timeout);

    /// Shuts the engine down.
    ///
    /// The returned future completes with the timeouts that were still
    /// pending; no task is dispatched after it resolves. Calling `stop` a
    /// second time (or from a firing task) yields an error outcome.
    fn stop(&self) -> ActionFuture<Vec<Timeout>, TimerError>;
}
