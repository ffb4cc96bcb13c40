//! # Mode B timer facade: event-loop plug-in.
//!
//! [`LoopTimer`] puts the same [`TimerWorker`] inside a single async task
//! instead of a dedicated thread: the task plays the role of an I/O event
//! loop whose blocking wait is clamped by the timer's next tick. Commands
//! from other tasks/threads are enqueued and consumed serially by the owner
//! task, preserving the single-owner rule.
//!
//! ## Loop body
//! ```text
//! loop {
//!   wait = min(default_timeout, max(0, worker.sleep_time()))
//!   select! {
//!     cmd = commands.recv() => apply (Schedule / Cancel / Shutdown)
//!     _   = sleep(wait)     => expired() → fire + dispatch (post-select phase)
//!   }
//! }
//! ```
//!
//! `default_timeout` is what the surrounding event loop would have slept
//! anyway; the timer only ever shortens the wait, never lengthens it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::actions::ActionFuture;
use crate::error::TimerError;

use super::clock::{Clock, SystemClock};
use super::timeout::{Timeout, TimerTaskRef};
use super::timer::dispatch;
use super::worker::TimerWorker;
use super::Timer;

enum LoopCommand {
    Shutdown,
    Schedule(Timeout),
    Cancel(Timeout),
}

/// Hashed-wheel timer hosted by an event-loop task.
pub struct LoopTimer {
    commands: mpsc::UnboundedSender<LoopCommand>,
    clock: Arc<dyn Clock>,
    stopped: AtomicBool,
    stop_latch: ActionFuture<Vec<Timeout>, TimerError>,
    token: CancellationToken,
}

impl LoopTimer {
    /// Spawns the owner task on the current tokio runtime with a 100ms tick,
    /// 1024 slots and a 200ms default wait.
    pub fn with_defaults() -> Arc<Self> {
        Self::new(
            Duration::from_millis(100),
            1024,
            Duration::from_millis(200),
            Arc::new(SystemClock),
        )
    }

    /// Spawns the owner task on the current tokio runtime.
    ///
    /// `default_timeout` is the event loop's own wait bound; the actual wait
    /// each round is `min(default_timeout, worker.sleep_time())`.
    ///
    /// # Panics
    /// Panics on invalid wheel geometry or outside a tokio runtime.
    pub fn new(
        tick_duration: Duration,
        ticks_per_wheel: usize,
        default_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let worker = TimerWorker::new(tick_duration, ticks_per_wheel, clock.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        let stop_latch: ActionFuture<Vec<Timeout>, TimerError> = ActionFuture::new();
        let token = CancellationToken::new();

        tokio::spawn(run_loop(
            worker,
            rx,
            default_timeout,
            stop_latch.clone(),
            token.clone(),
        ));

        Arc::new(Self {
            commands: tx,
            clock,
            stopped: AtomicBool::new(false),
            stop_latch,
            token,
        })
    }

    fn send(&self, command: LoopCommand) -> Result<(), TimerError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(TimerError::Stopped);
        }
        self.commands.send(command).map_err(|_| TimerError::Stopped)
    }
}

impl Timer for LoopTimer {
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
        self.send(LoopCommand::Schedule(timeout.clone()))?;
        Ok(timeout)
    }

    fn remove(&self, timeout: &Timeout) {
        timeout.cancel();
        let _ = self.send(LoopCommand::Cancel(timeout.clone()));
    }

    fn stop(&self) -> ActionFuture<Vec<Timeout>, TimerError> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return ActionFuture::ready(Err(TimerError::Stopped));
        }
        // If the loop is already gone it completed the latch on its way out.
        let _ = self.commands.send(LoopCommand::Shutdown);
        self.stop_latch.clone()
    }
}

impl Drop for LoopTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Owner task: the event-loop stand-in that drives the worker.
async fn run_loop(
    mut worker: TimerWorker,
    mut commands: mpsc::UnboundedReceiver<LoopCommand>,
    default_timeout: Duration,
    stop_latch: ActionFuture<Vec<Timeout>, TimerError>,
    token: CancellationToken,
) {
    loop {
        let wait = worker.sleep_time().min(default_timeout);
        tokio::select! {
            _ = token.cancelled() => break,
            cmd = commands.recv() => match cmd {
                None => break,
                Some(LoopCommand::Shutdown) => break,
                Some(LoopCommand::Schedule(timeout)) => worker.schedule(&timeout),
                Some(LoopCommand::Cancel(timeout)) => {
                    worker.remove(&timeout);
                }
            },
            _ = tokio::time::sleep(wait) => {
                // Post-select phase: run expirations on the owner task.
                let expired = worker.expired();
                dispatch(&expired);
            }
        }
    }
    stop_latch.complete(Ok(worker.unprocessed()));
}
