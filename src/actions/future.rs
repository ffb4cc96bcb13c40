//! # One-shot latched future for blocking actions.
//!
//! [`ActionFuture`] is the bridge between a background action and the caller
//! that waits for it. The producer calls [`ActionFuture::complete`] exactly
//! once (later calls are ignored); consumers either block with a timeout
//! ([`ActionFuture::get`]), peek without blocking
//! ([`ActionFuture::poll_outcome`]), or `.await` the future directly.
//!
//! ## Rules
//! - The first `complete` wins; the result never changes afterwards.
//! - `get` with a timeout returns [`ActionOutcome::TimedOut`] instead of a
//!   nullable sentinel, so "not finished" and "finished with nothing" cannot
//!   be confused.
//! - Handles are cheap clones sharing one latch.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

/// Outcome of an action as observed by a waiting caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome<T, E> {
    /// The action has not completed yet (only returned by non-blocking peeks).
    Pending,
    /// The action completed successfully.
    Ok(T),
    /// The action completed with an error.
    Err(E),
    /// The wait timed out before the action completed.
    TimedOut,
}

impl<T, E> ActionOutcome<T, E> {
    /// Returns true for [`ActionOutcome::Ok`].
    pub fn is_ok(&self) -> bool {
        matches!(self, ActionOutcome::Ok(_))
    }
}

struct Shared<T, E> {
    state: Mutex<State<T, E>>,
    cond: Condvar,
}

struct State<T, E> {
    result: Option<Result<T, E>>,
    wakers: Vec<Waker>,
}

/// One-shot latched future.
///
/// Created empty; completed exactly once by the producer. All clones observe
/// the same result.
pub struct ActionFuture<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for ActionFuture<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> Default for ActionFuture<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> ActionFuture<T, E> {
    /// Creates a new, incomplete future.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    result: None,
                    wakers: Vec::new(),
                }),
                cond: Condvar::new(),
            }),
        }
    }

    /// Creates a future that is already completed with `result`.
    pub fn ready(result: Result<T, E>) -> Self {
        let fut = Self::new();
        fut.complete(result);
        fut
    }

    /// Latches the result. The first call wins; later calls are ignored.
    ///
    /// Returns true if this call set the result.
    pub fn complete(&self, result: Result<T, E>) -> bool {
        let wakers = {
            let mut state = self.shared.state.lock().expect("action future poisoned");
            if state.result.is_some() {
                return false;
            }
            state.result = Some(result);
            std::mem::take(&mut state.wakers)
        };
        self.shared.cond.notify_all();
        for w in wakers {
            w.wake();
        }
        true
    }

    /// Returns true once the action has completed.
    pub fn is_done(&self) -> bool {
        self.shared
            .state
            .lock()
            .expect("action future poisoned")
            .result
            .is_some()
    }
}

impl<T: Clone, E: Clone> ActionFuture<T, E> {
    /// Non-blocking peek at the outcome.
    pub fn poll_outcome(&self) -> ActionOutcome<T, E> {
        let state = self.shared.state.lock().expect("action future poisoned");
        match &state.result {
            None => ActionOutcome::Pending,
            Some(Ok(v)) => ActionOutcome::Ok(v.clone()),
            Some(Err(e)) => ActionOutcome::Err(e.clone()),
        }
    }

    /// Blocks the calling thread until the action completes.
    pub fn wait(&self) -> Result<T, E> {
        let mut state = self.shared.state.lock().expect("action future poisoned");
        while state.result.is_none() {
            state = self
                .shared
                .cond
                .wait(state)
                .expect("action future poisoned");
        }
        match state.result.as_ref() {
            Some(Ok(v)) => Ok(v.clone()),
            Some(Err(e)) => Err(e.clone()),
            None => unreachable!("loop exits only with a result"),
        }
    }

    /// Blocks the calling thread until the action completes or `timeout`
    /// elapses.
    ///
    /// Never returns [`ActionOutcome::Pending`].
    pub fn get(&self, timeout: Duration) -> ActionOutcome<T, E> {
        let mut state = self.shared.state.lock().expect("action future poisoned");
        let mut remaining = timeout;
        while state.result.is_none() {
            let start = std::time::Instant::now();
            let (next, wait) = self
                .shared
                .cond
                .wait_timeout(state, remaining)
                .expect("action future poisoned");
            state = next;
            if state.result.is_some() {
                break;
            }
            if wait.timed_out() {
                return ActionOutcome::TimedOut;
            }
            // Spurious wakeup: shrink the remaining budget and wait again.
            remaining = remaining.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return ActionOutcome::TimedOut;
            }
        }
        match state.result.as_ref() {
            Some(Ok(v)) => ActionOutcome::Ok(v.clone()),
            Some(Err(e)) => ActionOutcome::Err(e.clone()),
            None => unreachable!("loop exits only with a result"),
        }
    }
}

impl<T: Clone, E: Clone> Future for ActionFuture<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.shared.state.lock().expect("action future poisoned");
        match &state.result {
            Some(res) => Poll::Ready(res.clone()),
            None => {
                if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    state.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn first_completion_wins() {
        let fut: ActionFuture<u32, String> = ActionFuture::new();
        assert!(fut.complete(Ok(1)));
        assert!(!fut.complete(Ok(2)));
        assert_eq!(fut.poll_outcome(), ActionOutcome::Ok(1));
    }

    #[test]
    fn get_times_out_when_incomplete() {
        let fut: ActionFuture<u32, String> = ActionFuture::new();
        assert_eq!(
            fut.get(Duration::from_millis(20)),
            ActionOutcome::TimedOut
        );
        assert_eq!(fut.poll_outcome(), ActionOutcome::Pending);
    }

    #[test]
    fn get_observes_cross_thread_completion() {
        let fut: ActionFuture<u32, String> = ActionFuture::new();
        let producer = fut.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            producer.complete(Err("nope".to_string()));
        });
        assert_eq!(
            fut.get(Duration::from_secs(5)),
            ActionOutcome::Err("nope".to_string())
        );
    }

    #[tokio::test]
    async fn awaitable_from_async_context() {
        let fut: ActionFuture<&'static str, String> = ActionFuture::new();
        let producer = fut.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            producer.complete(Ok("done"));
        });
        assert_eq!(fut.await, Ok("done"));
    }
}
