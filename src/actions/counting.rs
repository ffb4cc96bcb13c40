//! # Counting completion handler.
//!
//! [`CountingCompletionHandler`] aggregates the completion of a variable
//! number of sub-operations (verticle instance launches, child undeploys)
//! into exactly one callback invocation.
//!
//! ## Rules
//! - `inc_required` is called once per sub-operation before it is scheduled.
//! - `complete(success)` is called once per finished sub-operation; the first
//!   failure sets a sticky failed bit.
//! - The sink fires exactly once, when `completed == required` **after**
//!   [`CountingCompletionHandler::seal`] marked the required count final.
//!   Sealing with zero pending sub-operations fires immediately.

use std::sync::{Arc, Mutex};

type DoneSink = Box<dyn FnOnce(bool) + Send>;

struct Inner {
    required: usize,
    completed: usize,
    failed: bool,
    sealed: bool,
    sink: Option<DoneSink>,
}

impl Inner {
    fn maybe_fire(&mut self) {
        if self.sealed && self.completed == self.required {
            if let Some(sink) = self.sink.take() {
                sink(!self.failed);
            }
        }
    }
}

/// Aggregates sub-operation completions into one exactly-once callback.
///
/// Cheap to clone; all clones share the same counters and sink.
#[derive(Clone)]
pub struct CountingCompletionHandler {
    inner: Arc<Mutex<Inner>>,
}

impl CountingCompletionHandler {
    /// Creates a handler that will call `sink(success)` exactly once.
    ///
    /// `success` is true only if every sub-operation completed successfully.
    pub fn new(sink: impl FnOnce(bool) + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                required: 0,
                completed: 0,
                failed: false,
                sealed: false,
                sink: Some(Box::new(sink)),
            })),
        }
    }

    /// Registers one more sub-operation. Must precede its `complete` call.
    pub fn inc_required(&self) {
        let mut inner = self.inner.lock().expect("completion handler poisoned");
        inner.required += 1;
    }

    /// Records one finished sub-operation.
    pub fn complete(&self, success: bool) {
        let mut inner = self.inner.lock().expect("completion handler poisoned");
        inner.completed += 1;
        if !success {
            inner.failed = true;
        }
        inner.maybe_fire();
    }

    /// Marks the required count final.
    ///
    /// After sealing, the sink fires as soon as the last registered
    /// sub-operation completes; if none are outstanding it fires immediately.
    pub fn seal(&self) {
        let mut inner = self.inner.lock().expect("completion handler poisoned");
        inner.sealed = true;
        inner.maybe_fire();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_sink(hits: &Arc<AtomicUsize>, oks: &Arc<AtomicUsize>) -> impl FnOnce(bool) + Send {
        let hits = Arc::clone(hits);
        let oks = Arc::clone(oks);
        move |success| {
            hits.fetch_add(1, Ordering::SeqCst);
            if success {
                oks.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn fires_once_after_last_completion() {
        let hits = Arc::new(AtomicUsize::new(0));
        let oks = Arc::new(AtomicUsize::new(0));
        let handler = CountingCompletionHandler::new(counter_sink(&hits, &oks));

        handler.inc_required();
        handler.inc_required();
        handler.seal();
        handler.complete(true);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        handler.complete(true);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(oks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failure_is_sticky() {
        let hits = Arc::new(AtomicUsize::new(0));
        let oks = Arc::new(AtomicUsize::new(0));
        let handler = CountingCompletionHandler::new(counter_sink(&hits, &oks));

        handler.inc_required();
        handler.inc_required();
        handler.seal();
        handler.complete(false);
        handler.complete(true);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(oks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn sealing_with_nothing_outstanding_fires_immediately() {
        let hits = Arc::new(AtomicUsize::new(0));
        let oks = Arc::new(AtomicUsize::new(0));
        let handler = CountingCompletionHandler::new(counter_sink(&hits, &oks));

        handler.seal();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(oks.load(Ordering::SeqCst), 1);
    }
}
