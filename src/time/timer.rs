//! # Mode A timer facade: dedicated worker thread.
//!
//! [`WheelTimer`] spawns one background thread that owns a [`TimerWorker`].
//! Callers never touch the wheel: `new_timeout`/`remove`/`stop` enqueue
//! [`TimerEvent`]s onto a small bounded queue and the thread consumes them
//! serially between tick sweeps.
//!
//! ## Thread loop
//! ```text
//! loop {
//!   sleep = worker.sleep_time()
//!   event = queue.recv_timeout(sleep)
//!   match event {
//!     timed out     → sweep: expired() → fire + dispatch each task
//!     Schedule(t)   → worker.schedule(t)   (then drain the queue)
//!     Cancel(t)     → worker.remove(t)
//!     Shutdown      → complete the stop latch with unprocessed timeouts
//!   }
//! }
//! ```
//!
//! ## Rules
//! - The queue is bounded (16 entries); producers block when it is full.
//!   Queues are either empty or full, so a small capacity costs nothing.
//! - `stop()` must not be called from a firing task: the thread cannot join
//!   itself. The stop latch resolves with every unprocessed timeout; no task
//!   is dispatched afterwards.
//! - User task panics are caught and logged; the timer never dies from a
//!   user task, and a panicking periodic task stays scheduled.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use tracing::{error, warn};

use crate::actions::ActionFuture;
use crate::error::TimerError;

use super::clock::{Clock, SystemClock};
use super::timeout::{Timeout, TimerTaskRef};
use super::worker::TimerWorker;
use super::Timer;

/// Capacity of the command queue between producers and the timer thread.
const EVENT_QUEUE_CAPACITY: usize = 16;

/// Command passed to the timer thread.
enum TimerEvent {
    /// Stop processing; the thread answers on the stop latch.
    Shutdown,
    /// Add a timeout to the wheel.
    Schedule(Timeout),
    /// Drop a timeout from the wheel.
    Cancel(Timeout),
}

/// Hashed-wheel timer driven by a dedicated thread.
pub struct WheelTimer {
    events: SyncSender<TimerEvent>,
    clock: Arc<dyn Clock>,
    stopped: AtomicBool,
    stop_latch: ActionFuture<Vec<Timeout>, TimerError>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl WheelTimer {
    /// Creates and starts a timer with a 100ms tick and 1024 wheel slots.
    pub fn with_defaults() -> Arc<Self> {
        Self::new(Duration::from_millis(100), 1024, Arc::new(SystemClock))
    }

    /// Creates and starts a timer with the given geometry and clock.
    ///
    /// # Panics
    /// Panics on invalid geometry (see [`TimerWorker::new`]) or if the OS
    /// refuses to spawn the thread.
    pub fn new(
        tick_duration: Duration,
        ticks_per_wheel: usize,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let worker = TimerWorker::new(tick_duration, ticks_per_wheel, clock.clone());
        let (tx, rx) = mpsc::sync_channel(EVENT_QUEUE_CAPACITY);
        let stop_latch: ActionFuture<Vec<Timeout>, TimerError> = ActionFuture::new();

        let latch = stop_latch.clone();
        let handle = thread::Builder::new()
            .name("modvisor-timer".into())
            .spawn(move || run_worker(worker, rx, latch))
            .expect("failed to spawn timer thread");
        let thread_id = handle.thread().id();

        Arc::new(Self {
            events: tx,
            clock,
            stopped: AtomicBool::new(false),
            stop_latch,
            thread: Mutex::new(Some(handle)),
            thread_id,
        })
    }

    fn send(&self, event: TimerEvent) -> Result<(), TimerError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(TimerError::Stopped);
        }
        // Blocks while the queue is full; warn once on contention.
        match self.events.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                warn!("timer event queue full; waiting");
                self.events.send(event).map_err(|_| TimerError::Stopped)
            }
            Err(TrySendError::Disconnected(_)) => Err(TimerError::Stopped),
        }
    }
}

impl Timer for WheelTimer {
    fn new_timeout(
        &self,
        task: TimerTaskRef,
        delay: Duration,
        periodic: bool,
    ) -> Result<Timeout, TimerError> {
        let timeout = Timeout::new(
            task,
            self.clock.now_millis(),
            delay.as_millis() as u64,
            periodic,
        );
        self.send(TimerEvent::Schedule(timeout.clone()))?;
        Ok(timeout)
    }

    fn remove(&self, timeout: &Timeout) {
        timeout.cancel();
        // Post-stop cancels are silent no-ops; the wheel is gone anyway.
        let _ = self.send(TimerEvent::Cancel(timeout.clone()));
    }

    fn stop(&self) -> ActionFuture<Vec<Timeout>, TimerError> {
        if thread::current().id() == self.thread_id {
            return ActionFuture::ready(Err(TimerError::StopFromTimerTask));
        }
        if self.stopped.swap(true, Ordering::AcqRel) {
            return ActionFuture::ready(Err(TimerError::Stopped));
        }

        if self.events.send(TimerEvent::Shutdown).is_err() {
            // Thread already gone; latch was completed on its way out.
            return self.stop_latch.clone();
        }
        if let Some(handle) = self.thread.lock().expect("timer handle poisoned").take() {
            let _ = handle.join();
        }
        self.stop_latch.clone()
    }
}

impl Drop for WheelTimer {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::Release);
        // Best effort: even if the queue is full, dropping the sender makes
        // the thread observe the disconnect and exit.
        let _ = self.events.try_send(TimerEvent::Shutdown);
    }
}

/// Thread body: consume commands, sweep ticks, dispatch expired tasks.
fn run_worker(
    mut worker: TimerWorker,
    events: Receiver<TimerEvent>,
    stop_latch: ActionFuture<Vec<Timeout>, TimerError>,
) {
    loop {
        match events.recv_timeout(worker.sleep_time()) {
            Err(RecvTimeoutError::Timeout) => {
                let expired = worker.expired();
                dispatch(&expired);
            }
            Err(RecvTimeoutError::Disconnected) => break,
            Ok(first) => {
                let mut event = first;
                loop {
                    match event {
                        TimerEvent::Shutdown => {
                            stop_latch.complete(Ok(worker.unprocessed()));
                            return;
                        }
                        TimerEvent::Schedule(timeout) => worker.schedule(&timeout),
                        TimerEvent::Cancel(timeout) => {
                            worker.remove(&timeout);
                        }
                    }
                    match events.try_recv() {
                        Ok(next) => event = next,
                        Err(_) => break,
                    }
                }
            }
        }
    }
    stop_latch.complete(Ok(worker.unprocessed()));
}

/// Fires each expired timeout and runs its task, swallowing panics.
pub(super) fn dispatch(expired: &[Timeout]) {
    for timeout in expired {
        if !timeout.fire() {
            continue;
        }
        let task = timeout.task().clone();
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| task.run(timeout))) {
            let msg = panic_message(&panic);
            error!(error = %msg, "timer task panicked");
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
