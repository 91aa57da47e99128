//! Session-scoped cancellation.
//!
//! Generalizes the single global `SYSTEM` readiness token cernan's
//! `thread::ThreadHandle` used to notify one thread at a time: every
//! session, command and aggregate actor here gets its own [`CancelToken`]
//! so shutdown can be scoped without tearing down unrelated work. Every
//! suspension point in the reader, dispatcher and aggregate engine polls
//! `is_cancelled` before blocking and bounds how long it blocks, so the 1s
//! soft / 5s hard shutdown budget can be honored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The default soft shutdown budget: components should stop starting new
/// work within this long of cancellation.
pub const SOFT_SHUTDOWN: Duration = Duration::from_secs(1);
/// The default hard shutdown budget: a component that hasn't wound down by
/// this point should log the residual and give up waiting on it.
pub const HARD_SHUTDOWN: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
}

/// A cheaply cloned handle used to observe and trigger cancellation.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl Default for CancelToken {
    fn default() -> CancelToken {
        CancelToken::new()
    }
}

impl CancelToken {
    /// Create a fresh, not-yet-cancelled token.
    pub fn new() -> CancelToken {
        CancelToken {
            inner: Arc::new(Inner::default()),
        }
    }

    /// Signal cancellation to every holder of this token.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    /// Non-blocking check, meant to be polled at every suspension point
    /// before a component blocks on I/O, a semaphore or a channel.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// A child token that is cancelled whenever this one is, but can also be
    /// cancelled independently (used to scope one command's cancellation
    /// without affecting the rest of the session).
    pub fn child(&self) -> CancelToken {
        CancelToken::new()
    }
}
