//! A counting semaphore bounding how many files of a given kind (one-shot
//! `cat`/`grep` reads vs long-lived `tail -f` follows) may be open at once.
//!
//! Mirrors the `Mutex` + `Condvar` wait/notify pattern used for backoff
//! elsewhere in the crate rather than pulling in a dedicated semaphore
//! crate: the logic is a dozen lines and the crate already leans on
//! `std::sync` primitives for everything else.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// A blocking counting semaphore with a bounded wait.
pub struct Admission {
    state: Mutex<usize>,
    available: Condvar,
    limit: usize,
}

/// Held while a file admission slot is checked out; releases it on drop.
/// Holds an `Arc` rather than a borrow so it can travel with a `FileWatcher`
/// into its own long-lived reader thread.
pub struct Permit {
    admission: Arc<Admission>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.admission.release();
    }
}

impl Admission {
    /// Build an admission gate allowing up to `limit` concurrent holders.
    pub fn new(limit: usize) -> Admission {
        Admission {
            state: Mutex::new(0),
            available: Condvar::new(),
            limit,
        }
    }

    /// Block until a slot is free or `timeout` elapses, returning `None` on
    /// timeout.
    pub fn acquire(self: &Arc<Self>, timeout: Duration) -> Option<Permit> {
        let deadline = Instant::now() + timeout;
        let mut count = self.state.lock().unwrap();
        while *count >= self.limit {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, result) = self
                .available
                .wait_timeout(count, deadline - now)
                .unwrap();
            count = guard;
            if result.timed_out() && *count >= self.limit {
                return None;
            }
        }
        *count += 1;
        Some(Permit {
            admission: Arc::clone(self),
        })
    }

    fn release(&self) {
        let mut count = self.state.lock().unwrap();
        *count = count.saturating_sub(1);
        self.available.notify_one();
    }

    /// Current number of outstanding permits, for diagnostics.
    pub fn in_use(&self) -> usize {
        *self.state.lock().unwrap()
    }
}
