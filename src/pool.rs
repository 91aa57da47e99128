//! A pool of reusable byte buffers, keyed by rough size class.
//!
//! The file reader and line framer churn through many short-lived `Vec<u8>`
//! buffers per second under a busy tail. Rather than allocate and drop one
//! per line, callers check a buffer out of the pool and return it with
//! [`BufferPool::release`] once it has been consumed (serialized to the
//! wire, copied into a context window, etc). Buffers are never returned
//! implicitly via `Drop` — every checkout site is responsible for calling
//! `release` on every code path, including error returns, per the crate's
//! ownership discipline for pooled buffers.

use std::sync::Mutex;

/// Size classes a buffer can belong to. A buffer graduates to a larger class
/// (and is not returned to a smaller one) if it grows past its class while in
/// use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SizeClass {
    /// Small lines, most traffic.
    Small,
    /// Bulk reads and long lines up to the default `MaxLineLength`.
    Large,
    /// Anything bigger than `Large`; pooling buys little here, but we still
    /// bound how many we keep around.
    Huge,
}

const SMALL_CAP: usize = 4 * 1024;
const LARGE_CAP: usize = 64 * 1024;

impl SizeClass {
    fn of(len: usize) -> SizeClass {
        if len <= SMALL_CAP {
            SizeClass::Small
        } else if len <= LARGE_CAP {
            SizeClass::Large
        } else {
            SizeClass::Huge
        }
    }

    fn capacity(self) -> usize {
        match self {
            SizeClass::Small => SMALL_CAP,
            SizeClass::Large => LARGE_CAP,
            SizeClass::Huge => LARGE_CAP * 4,
        }
    }
}

const MAX_PER_CLASS: usize = 256;

/// A buffer pool with three size classes.
pub struct BufferPool {
    small: Mutex<Vec<Vec<u8>>>,
    large: Mutex<Vec<Vec<u8>>>,
    huge: Mutex<Vec<Vec<u8>>>,
}

impl Default for BufferPool {
    fn default() -> BufferPool {
        BufferPool {
            small: Mutex::new(Vec::new()),
            large: Mutex::new(Vec::new()),
            huge: Mutex::new(Vec::new()),
        }
    }
}

impl BufferPool {
    /// Create a new, empty pool.
    pub fn new() -> BufferPool {
        BufferPool::default()
    }

    fn bucket(&self, class: SizeClass) -> &Mutex<Vec<Vec<u8>>> {
        match class {
            SizeClass::Small => &self.small,
            SizeClass::Large => &self.large,
            SizeClass::Huge => &self.huge,
        }
    }

    /// Check out a buffer with at least `hint` bytes of capacity.
    pub fn checkout(&self, hint: usize) -> Vec<u8> {
        let class = SizeClass::of(hint);
        let mut bucket = self.bucket(class).lock().unwrap();
        match bucket.pop() {
            Some(mut buf) => {
                buf.clear();
                if buf.capacity() < hint {
                    buf.reserve(hint - buf.capacity());
                }
                buf
            }
            None => Vec::with_capacity(hint.max(class.capacity().min(hint.max(1)))),
        }
    }

    /// Return a buffer to the pool for reuse. The buffer's size class is
    /// determined by its current capacity; pools at `MAX_PER_CLASS` already
    /// are simply dropped instead of retained, bounding memory under a
    /// sustained burst.
    pub fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        let class = SizeClass::of(buf.capacity());
        let mut bucket = self.bucket(class).lock().unwrap();
        if bucket.len() < MAX_PER_CLASS {
            bucket.push(buf);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn checkout_then_release_is_reused() {
        let pool = BufferPool::new();
        let buf = pool.checkout(128);
        let cap = buf.capacity();
        pool.release(buf);
        let buf2 = pool.checkout(128);
        assert!(buf2.capacity() >= cap);
        assert!(buf2.is_empty());
    }

    #[test]
    fn release_above_cap_is_dropped_not_retained() {
        let pool = BufferPool::new();
        for _ in 0..(MAX_PER_CLASS + 10) {
            pool.release(Vec::with_capacity(16));
        }
        let bucket = pool.small.lock().unwrap();
        assert_eq!(bucket.len(), MAX_PER_CLASS);
    }

    #[test]
    fn size_class_escalates_with_length() {
        assert_eq!(SizeClass::of(10), SizeClass::Small);
        assert_eq!(SizeClass::of(SMALL_CAP + 1), SizeClass::Large);
        assert_eq!(SizeClass::of(LARGE_CAP + 1), SizeClass::Huge);
    }
}
