//! # Single-owner timer engine.
//!
//! [`TimerWorker`] implements the hashed-wheel algorithm: scheduling hashes a
//! timeout's deadline onto a wheel slot, and each tick sweeps exactly one
//! slot. All methods take `&mut self` and must be called from the worker's
//! designated owner (a dedicated thread or an event-loop task); the facades
//! enforce this by funnelling commands through a queue.
//!
//! ## Tick discipline
//! `last_deadline + k * tick_duration` is the deadline of the slot processed
//! `k` ticks from now. [`TimerWorker::expired`] advances `last_deadline`
//! while it is `<= now`, sweeping the slot under the current tick index each
//! round and collecting entries whose deadline has passed. Entries more than
//! a full wheel turn away share a slot with nearer entries and are simply
//! reconsidered on the next turn, because their deadline is still in the
//! future when the slot is swept.
//!
//! ## Periodic reschedule
//! A periodic timeout is re-armed at **last planned + delay** (processing
//! drift is not absorbed). If several periods were missed between polls,
//! `expired()` yields one entry per missed period (catch-up firing).

use std::sync::Arc;
use std::time::Duration;

use super::bucket::{Bucket, SweepAction};
use super::clock::Clock;
use super::timeout::{Timeout, TimeoutState};
use super::wheel::Wheel;

/// Upper bound on the wheel size, leaving room for the id counter bits.
const MAX_TICKS_PER_WHEEL: usize = 0x4000_0000;

/// The hashed-wheel engine shared by both timer facades.
pub struct TimerWorker {
    /// Duration between ticks, in milliseconds.
    tick_duration: u64,
    /// Index of the slot the next sweep will process.
    tick: usize,
    /// Deadline of the slot at the current tick index.
    last_deadline: u64,
    wheel: Wheel<Bucket<Timeout>>,
    /// Monotonic counter feeding the high bits of timeout ids.
    id_counter: u64,
    /// Number of low id bits reserved for the slot index.
    mask_bits: u32,
    clock: Arc<dyn Clock>,
}

impl TimerWorker {
    /// Creates a worker.
    ///
    /// # Panics
    /// Panics if `tick_duration` is zero, `ticks_per_wheel` is out of range,
    /// or `tick_duration * ticks_per_wheel` overflows 63 bits.
    pub fn new(tick_duration: Duration, ticks_per_wheel: usize, clock: Arc<dyn Clock>) -> Self {
        let tick_ms = tick_duration.as_millis() as u64;
        assert!(tick_ms > 0, "tick duration must be > 0");
        assert!(
            (1..=MAX_TICKS_PER_WHEEL).contains(&ticks_per_wheel),
            "ticks_per_wheel out of range: {ticks_per_wheel}"
        );
        assert!(
            tick_ms
                .checked_mul(ticks_per_wheel as u64)
                .is_some_and(|span| span <= i64::MAX as u64),
            "tick duration too long for wheel size"
        );

        // ceil(log2(size)): enough low bits to encode any slot index.
        let mask_bits = ticks_per_wheel.next_power_of_two().trailing_zeros();

        Self {
            tick_duration: tick_ms,
            tick: 0,
            last_deadline: clock.now_millis(),
            wheel: Wheel::new(ticks_per_wheel, Bucket::new),
            id_counter: 0,
            mask_bits,
            clock,
        }
    }

    /// Duration of one tick in milliseconds.
    pub fn tick_duration_millis(&self) -> u64 {
        self.tick_duration
    }

    /// Number of low id bits holding the slot index.
    pub fn slot_mask_bits(&self) -> u32 {
        self.mask_bits
    }

    /// Time until the next tick should be processed.
    ///
    /// Already saturated at zero: a caller can sleep on it directly.
    pub fn sleep_time(&self) -> Duration {
        let next = self.last_deadline + self.tick_duration;
        Duration::from_millis(next.saturating_sub(self.clock.now_millis()))
    }

    /// Schedules (or re-arms) a timeout.
    ///
    /// Computes the slot from the deadline's distance to `last_deadline`,
    /// writes the slot back into the timeout, and assigns or refreshes its
    /// id: a fresh timeout gets `counter << mask_bits | slot`; a re-armed one
    /// keeps its counter bits and only the slot bits change. The counter
    /// wraps to zero on overflow.
    pub fn schedule(&mut self, timeout: &Timeout) {
        let diff = timeout.deadline_millis().saturating_sub(self.last_deadline);
        let len = self.wheel.len() as u64;
        let slot = ((self.tick as u64 + diff / self.tick_duration) % len) as usize;
        timeout.set_slot(slot);

        self.id_counter = self.id_counter.wrapping_add(1) & (u64::MAX >> self.mask_bits);
        if timeout.id() == 0 {
            timeout.set_id((self.id_counter << self.mask_bits) | slot as u64);
        } else {
            let counter_mask = !self.slot_mask();
            timeout.set_id((timeout.id() & counter_mask) | slot as u64);
        }

        self.wheel.get_mut(slot).add(timeout.clone());
    }

    /// Removes a timeout so it never fires.
    ///
    /// Looks only in the timeout's stored slot; if it is not there the
    /// timeout has already been fired or dequeued and this is a no-op.
    pub fn remove(&mut self, timeout: &Timeout) -> bool {
        let slot = timeout.slot();
        self.wheel.get_mut(slot).remove(timeout)
    }

    /// Removes a timeout by id.
    ///
    /// Non-periodic ids carry their slot in the low bits, so the lookup is
    /// O(bucket size). A periodic timeout's slot bits may have advanced since
    /// the id was taken; only the counter bits are compared, across all
    /// buckets.
    pub fn remove_by_id(&mut self, id: u64, periodic: bool) -> Option<Timeout> {
        if !periodic {
            let slot = (id & self.slot_mask()) as usize;
            return Self::remove_first(self.wheel.get_mut(slot), |t| t.id() == id);
        }

        let counter_mask = !self.slot_mask();
        let wanted = id & counter_mask;
        for bucket in self.wheel.iter_mut() {
            if let Some(found) = Self::remove_first(bucket, |t| t.id() & counter_mask == wanted) {
                return Some(found);
            }
        }
        None
    }

    /// Finds a scheduled timeout by exact id without removing it.
    pub fn find(&self, id: u64) -> Option<Timeout> {
        let slot = (id & self.slot_mask()) as usize;
        self.wheel.get(slot).iter().find(|t| t.id() == id).cloned()
    }

    /// Collects every timeout whose deadline has passed.
    ///
    /// Advances `last_deadline` tick by tick while it is `<= now`. Entries
    /// already expired or cancelled are tombstoned in passing. Each expired
    /// periodic timeout is re-armed at `deadline + delay`; if that is still
    /// `<= now` it contributes one more entry per missed period before being
    /// re-armed past `now`.
    pub fn expired(&mut self) -> Vec<Timeout> {
        let mut out = Vec::new();
        let now = self.clock.now_millis();
        while self.last_deadline <= now {
            self.fetch_expired(now, &mut out);
            let next = self.last_deadline + self.tick_duration;
            if next > now {
                break;
            }
            self.last_deadline = next;
            self.tick += 1;
        }
        out
    }

    /// Marks expired timeouts: `INIT -> EXPIRED` for non-periodic entries,
    /// while `CANCELLED` stays `CANCELLED`. Dispatching the user task is the
    /// facade's responsibility.
    pub fn notify(&self, expired: &[Timeout]) {
        for timeout in expired {
            let _ = timeout.fire();
        }
    }

    /// Convenience for driver loops: collect, mark, return.
    pub fn next_tick(&mut self) -> Vec<Timeout> {
        let expired = self.expired();
        self.notify(&expired);
        expired
    }

    /// Every timeout still sitting in the wheel.
    pub fn unprocessed(&self) -> Vec<Timeout> {
        let mut out = Vec::new();
        for bucket in self.wheel.iter() {
            out.extend(bucket.iter().cloned());
        }
        out
    }

    /// Number of timeouts still sitting in the wheel.
    pub fn pending(&self) -> usize {
        self.wheel.iter().map(|b| b.count()).sum()
    }

    #[inline]
    fn slot_mask(&self) -> u64 {
        (1u64 << self.mask_bits) - 1
    }

    fn remove_first(
        bucket: &mut Bucket<Timeout>,
        mut matches: impl FnMut(&Timeout) -> bool,
    ) -> Option<Timeout> {
        let mut taken = false;
        let mut found = None;
        bucket.sweep(
            |t| {
                if !taken && matches(t) {
                    taken = true;
                    SweepAction::Remove
                } else {
                    SweepAction::Keep
                }
            },
            |t| found = Some(t),
        );
        found
    }

    fn fetch_expired(&mut self, now: u64, out: &mut Vec<Timeout>) {
        let slot = self.wheel.index(self.tick);
        let mut rearm: Vec<Timeout> = Vec::new();
        let bucket = self.wheel.get_mut(slot);
        bucket.sweep(
            |t| {
                if t.state() != TimeoutState::Init {
                    // Stale entry: fired or cancelled since it was queued.
                    SweepAction::Remove
                } else if t.deadline_millis() <= now {
                    SweepAction::Remove
                } else {
                    SweepAction::Keep
                }
            },
            |t| {
                if t.state() != TimeoutState::Init {
                    return;
                }
                out.push(t.clone());
                if t.is_periodic() {
                    let mut deadline = t.deadline_millis() + t.delay_millis();
                    while deadline <= now {
                        out.push(t.clone());
                        deadline += t.delay_millis();
                    }
                    t.set_deadline(deadline);
                    rearm.push(t);
                }
            },
        );
        for timeout in rearm {
            self.schedule(&timeout);
        }
    }
}
