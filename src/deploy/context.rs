//! # Execution contexts for verticle lifecycle hooks.
//!
//! Every verticle instance is attached to an [`ExecutionContext`] that
//! schedules its `start`/`stop` hooks and runs registered close hooks during
//! undeploy. Non-worker instances run on the async runtime; worker instances
//! run on the blocking pool, where they may block freely.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;

/// Where a context schedules its lifecycle hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// Async runtime task; hooks must not block.
    EventLoop,
    /// Blocking pool thread; hooks may block.
    Worker,
}

struct Inner {
    kind: ContextKind,
    handle: Handle,
    close_hooks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

/// Scheduler handle for one verticle instance.
///
/// Cheap to clone; clones share the close-hook list.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<Inner>,
}

impl ExecutionContext {
    /// Creates a context scheduling onto `handle`.
    pub fn new(kind: ContextKind, handle: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                kind,
                handle,
                close_hooks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The scheduling kind of this context.
    pub fn kind(&self) -> ContextKind {
        self.inner.kind
    }

    /// Schedules a lifecycle future onto this context.
    ///
    /// Worker contexts drive the future to completion on a blocking-pool
    /// thread, so blocking inside it is acceptable there. Requires a
    /// multi-threaded runtime.
    pub fn run(&self, fut: impl Future<Output = ()> + Send + 'static) {
        match self.inner.kind {
            ContextKind::EventLoop => {
                self.inner.handle.spawn(fut);
            }
            ContextKind::Worker => {
                let handle = self.inner.handle.clone();
                self.inner.handle.spawn_blocking(move || handle.block_on(fut));
            }
        }
    }

    /// Registers a hook to run when the instance is undeployed.
    pub fn add_close_hook(&self, hook: impl FnOnce() + Send + 'static) {
        self.inner
            .close_hooks
            .lock()
            .expect("close hooks poisoned")
            .push(Box::new(hook));
    }

    /// Runs and clears all registered close hooks, in registration order.
    pub fn run_close_hooks(&self) {
        let hooks = std::mem::take(
            &mut *self
                .inner
                .close_hooks
                .lock()
                .expect("close hooks poisoned"),
        );
        for hook in hooks {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(flavor = "multi_thread")]
    async fn event_loop_context_runs_futures() {
        let cx = ExecutionContext::new(ContextKind::EventLoop, Handle::current());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        cx.run(async move {
            h.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn worker_context_runs_futures_on_the_blocking_pool() {
        let cx = ExecutionContext::new(ContextKind::Worker, Handle::current());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        cx.run(async move {
            // Blocking here is legal on a worker context.
            std::thread::sleep(std::time::Duration::from_millis(10));
            h.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn close_hooks_run_once_in_order() {
        let cx = ExecutionContext::new(ContextKind::EventLoop, Handle::current());
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            cx.add_close_hook(move || order.lock().expect("order").push(i));
        }
        cx.run_close_hooks();
        cx.run_close_hooks();
        assert_eq!(*order.lock().expect("order"), vec![0, 1, 2]);
    }
}
