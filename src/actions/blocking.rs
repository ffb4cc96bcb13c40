//! # Blocking actions and the worker-context guard.
//!
//! The deploy/resolve core blocks on file I/O and repository downloads, so it
//! must never run on an async executor thread. [`BlockingAction::run`] ships a
//! closure to tokio's blocking pool and marks the executing thread as a
//! **worker context** for the closure's duration; the core asserts that
//! marker with [`require_worker_context`].
//!
//! ## Rules
//! - The marker is thread-local and strictly scoped: it is cleared before the
//!   pool thread is reused, even if the closure panics.
//! - `require_worker_context()` is the only sanctioned way for core code to
//!   enforce the scheduling model; it returns
//!   [`DeployError::NotWorkerContext`] instead of panicking.

use std::cell::Cell;

use tokio::runtime::Handle;

use crate::actions::future::ActionFuture;
use crate::error::DeployError;

thread_local! {
    static WORKER_CONTEXT: Cell<bool> = const { Cell::new(false) };
}

/// Clears the worker marker when the scope ends, panics included.
struct WorkerScope;

impl WorkerScope {
    fn enter() -> Self {
        WORKER_CONTEXT.with(|f| f.set(true));
        WorkerScope
    }
}

impl Drop for WorkerScope {
    fn drop(&mut self) {
        WORKER_CONTEXT.with(|f| f.set(false));
    }
}

/// Returns true if the current thread is executing a blocking action.
pub fn is_worker_context() -> bool {
    WORKER_CONTEXT.with(|f| f.get())
}

/// Fails with [`DeployError::NotWorkerContext`] unless called from inside a
/// blocking action.
pub fn require_worker_context() -> Result<(), DeployError> {
    if is_worker_context() {
        Ok(())
    } else {
        Err(DeployError::NotWorkerContext)
    }
}

/// Runs closures on the runtime's blocking pool inside a worker context.
pub struct BlockingAction;

impl BlockingAction {
    /// Schedules `action` onto the blocking pool and returns a latched future
    /// for its result.
    ///
    /// The future completes with the closure's return value; if the closure
    /// panics the future is completed with `on_panic` so waiters are never
    /// left hanging.
    pub fn run<T, E, F>(handle: &Handle, on_panic: E, action: F) -> ActionFuture<T, E>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let future = ActionFuture::new();
        let latch = future.clone();
        let guard = PanicCompletion {
            latch: future.clone(),
            on_panic: Some(on_panic),
        };
        handle.spawn_blocking(move || {
            let _scope = WorkerScope::enter();
            let mut guard = guard;
            latch.complete(action());
            guard.disarm();
        });
        future
    }

    /// Runs `action` on the blocking pool and awaits it from async code.
    pub async fn run_async<T, E, F>(handle: &Handle, on_panic: E, action: F) -> Result<T, E>
    where
        T: Send + Clone + 'static,
        E: Send + Clone + 'static,
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        Self::run(handle, on_panic, action).await
    }
}

/// Completes the latch with an error if the action panicked.
struct PanicCompletion<T, E> {
    latch: ActionFuture<T, E>,
    on_panic: Option<E>,
}

impl<T, E> PanicCompletion<T, E> {
    fn disarm(&mut self) {
        self.on_panic = None;
    }
}

impl<T, E> Drop for PanicCompletion<T, E> {
    fn drop(&mut self) {
        if let Some(err) = self.on_panic.take() {
            self.latch.complete(Err(err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::future::ActionOutcome;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn action_runs_in_worker_context() {
        assert!(!is_worker_context());
        let fut = BlockingAction::run(&Handle::current(), "panicked", || {
            require_worker_context().map_err(|_| "not worker")?;
            Ok::<_, &'static str>(7)
        });
        assert_eq!(fut.await, Ok(7));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn marker_does_not_leak_to_async_threads() {
        let fut = BlockingAction::run(&Handle::current(), (), || Ok::<_, ()>(()));
        let _ = fut.await;
        assert!(require_worker_context().is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panicking_action_completes_the_latch() {
        let fut: ActionFuture<(), &'static str> =
            BlockingAction::run(&Handle::current(), "panicked", || panic!("boom"));
        assert_eq!(
            fut.get(Duration::from_secs(5)),
            ActionOutcome::Err("panicked")
        );
    }
}
