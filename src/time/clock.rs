//! # Time source abstraction for the timer engine.
//!
//! The worker never reads the OS clock directly; it goes through [`Clock`]
//! so that tests (and deterministic simulations) can drive virtual time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Millisecond time source.
pub trait Clock: Send + Sync + 'static {
    /// Current time in milliseconds. Must be monotonic enough for deadline
    /// arithmetic; wall-clock jumps shift firing times accordingly.
    fn now_millis(&self) -> u64;
}

/// Wall-clock time source used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Manually advanced time source for tests and simulations.
///
/// # Example
/// ```
/// use modvisor::{Clock, ManualClock};
///
/// let clock = ManualClock::new(0);
/// clock.advance(49);
/// assert_eq!(clock.now_millis(), 49);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a clock frozen at `start_millis`.
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    /// Moves time forward by `millis`.
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Sets the absolute time.
    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
