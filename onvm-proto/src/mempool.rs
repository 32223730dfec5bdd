//! Fixed-size object pools.
//!
//! A `Mempool<T>` is preloaded with exactly `capacity` objects at
//! construction and never grows: `get()` hands one out or reports
//! exhaustion, `put()` returns it. No allocation happens on the data path
//! after startup. The pool is just a [`crate::ring::Ring`] of
//! already-constructed objects, matching the original's `rte_mempool`
//! usage (object caches preallocated from a fixed-size shared arena) minus
//! the arena itself, which is out of scope here.

use crate::error::ManagerError;
use crate::ring::{self, Consumer, Producer};

/// A fixed-capacity pool of recycled `T`s.
///
/// `get`/`put` may be called from any thread holding a clone of the pool's
/// producer-facing half; internally a pool is just a ring with every slot
/// preloaded, so "free objects" are exactly "items currently queued".
pub struct Mempool<T> {
    free: Producer<T>,
    taken: Consumer<T>,
}

impl<T> Mempool<T> {
    /// Build a pool of `capacity` objects, each produced by `make`.
    pub fn new(capacity: usize, mut make: impl FnMut() -> T) -> Self {
        let (free, taken) = ring::channel(capacity);
        for _ in 0..capacity {
            // The pool was just created with this exact capacity, so the
            // ring cannot be full yet.
            free.try_enqueue(make())
                .unwrap_or_else(|_| panic!("mempool priming overflowed its own capacity"));
        }
        Self { free, taken }
    }

    /// Take one object out of the pool.
    pub fn get(&mut self) -> Result<T, ManagerError> {
        self.taken.try_dequeue().ok_or(ManagerError::PoolExhausted)
    }

    /// Take up to `n` objects, returning however many were available.
    pub fn get_burst(&mut self, n: usize) -> Vec<T> {
        self.taken.dequeue_burst(n)
    }

    /// Return an object to the pool.
    pub fn put(&self, item: T) {
        // The pool's capacity never exceeds the ring's, so this can only
        // fail if a caller returns more objects than were ever taken out.
        self.free
            .try_enqueue(item)
            .unwrap_or_else(|_| panic!("mempool put() exceeded its own capacity"));
    }

    /// Number of objects currently available to `get()`.
    pub fn free_count(&self) -> usize {
        self.taken.len()
    }

    pub fn capacity(&self) -> usize {
        self.taken.capacity()
    }

    /// A producer handle that can hand objects back to this pool from any
    /// thread, without needing mutable access to the `Mempool` itself.
    pub fn returner(&self) -> Producer<T> {
        self.free.clone()
    }
}
