//! Async primitives used by the deployment core.
//!
//! - [`future`] — one-shot latched [`ActionFuture`] with a typed outcome
//!   (no nullable success sentinel).
//! - [`counting`] — [`CountingCompletionHandler`], an atomic counter with a
//!   sticky failure bit and an exactly-once completion sink.
//! - [`blocking`] — [`BlockingAction`], which runs blocking work on the
//!   runtime's blocking pool inside a **worker context**; deployment
//!   operations refuse to run anywhere else.
//!
//! These are the seams between the async public API and the synchronous
//! deploy/resolve core: the core blocks (file I/O, repository downloads) and
//! therefore always executes on a worker thread, while callers await an
//! [`ActionFuture`] or a completion callback.

mod blocking;
mod counting;
mod future;

pub use blocking::{is_worker_context, require_worker_context, BlockingAction};
pub use counting::CountingCompletionHandler;
pub use future::{ActionFuture, ActionOutcome};
