//! Fixed-capacity lock-free rings.
//!
//! Every hand-off in this system, packets into an NF, control messages
//! into the inbox, freed objects back to a mempool, goes through one of
//! these. A `Ring<T>` is bounded at construction and never grows; producers
//! that find it full get told how much room there was, never blocked.
//!
//! # Memory ordering
//!
//! This is the same head/tail reservation scheme DPDK's `rte_ring` uses for
//! its multi-producer/single-consumer case, generalized from the
//! single-producer cached-cursor design in `ringmpsc`: a producer first
//! reserves a contiguous range with a CAS on `prod_head`, writes its items
//! into that range (no synchronization needed between producers at this
//! point: reserved ranges never overlap), then *publishes* by spin-waiting
//! for `prod_tail` to reach the start of its own reservation before moving
//! it past the end. That wait is what keeps the order the consumer sees
//! equal to reservation order even when two producers finish writing out of
//! order. The single consumer only ever reads up to `prod_tail`, so it can
//! never observe a reserved-but-not-yet-written slot.
//!
//! Bulk (`enqueue_bulk`) and burst (`enqueue_burst` / `dequeue_burst`)
//! operations fall out of the same reservation step: bulk reserves exactly
//! `n` slots or none, burst reserves whatever is free, up to `n`.
//!
//! The ring is single-consumer by construction: [`Consumer`] is not
//! `Clone`, so only one thread can ever hold dequeue access to a given
//! ring, matching the rule that each NF owns its rx/msg consumer outright.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Inner<T> {
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
    capacity: usize,
    /// Next free slot a producer may reserve. Advanced via CAS.
    prod_head: AtomicUsize,
    /// Highest slot whose write has been published; the consumer's horizon.
    prod_tail: AtomicUsize,
    /// Next slot the single consumer will read.
    cons_pos: AtomicUsize,
}

// SAFETY: a slot is written by whichever producer reserved it and read by
// the single consumer once `prod_tail` passes it; the reservation/publish
// protocol below guarantees no two threads ever touch the same slot at
// once, so `T` only ever needs to be `Send` across that one handoff.
unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

impl<T> Inner<T> {
    fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        let buffer = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            buffer,
            capacity,
            prod_head: AtomicUsize::new(0),
            prod_tail: AtomicUsize::new(0),
            cons_pos: AtomicUsize::new(0),
        }
    }

    fn write_slot(&self, pos: usize, item: T) {
        let idx = pos % self.capacity;
        unsafe { (*self.buffer[idx].get()).write(item) };
    }

    fn read_slot(&self, pos: usize) -> T {
        let idx = pos % self.capacity;
        unsafe { (*self.buffer[idx].get()).assume_init_read() }
    }

    /// Reserve a range of slots for a producer. With `exact`, succeeds only
    /// if all `n` are free; otherwise takes whatever is free, up to `n`.
    /// Returns `(start, count)`. `count` is `0` only when nothing could be
    /// reserved, in which case `start` is meaningless.
    fn reserve(&self, n: usize, exact: bool) -> (usize, usize) {
        let mut old_head = self.prod_head.load(Ordering::Relaxed);
        loop {
            let cons = self.cons_pos.load(Ordering::Acquire);
            let free = self.capacity - (old_head - cons);
            let take = if exact {
                if free < n {
                    return (0, 0);
                }
                n
            } else {
                free.min(n)
            };
            if take == 0 {
                return (0, 0);
            }
            let new_head = old_head + take;
            match self.prod_head.compare_exchange_weak(
                old_head,
                new_head,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return (old_head, take),
                Err(observed) => old_head = observed,
            }
        }
    }

    /// Make a reserved-and-written range visible to the consumer, blocking
    /// only until every producer that reserved before us has published.
    fn publish(&self, start: usize, count: usize) {
        while self.prod_tail.load(Ordering::Relaxed) != start {
            std::hint::spin_loop();
        }
        self.prod_tail.store(start + count, Ordering::Release);
    }

    fn free_space(&self) -> usize {
        let head = self.prod_head.load(Ordering::Relaxed);
        let cons = self.cons_pos.load(Ordering::Acquire);
        self.capacity - (head - cons)
    }

    /// Snapshot count of items currently queued and visible to the
    /// consumer. Racy against concurrent producers by design (used for
    /// diagnostics/tests, not correctness).
    fn len(&self) -> usize {
        let tail = self.prod_tail.load(Ordering::Relaxed);
        let cons = self.cons_pos.load(Ordering::Relaxed);
        tail - cons
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        // Drain whatever is published-but-unconsumed so T's destructor runs.
        let mut pos = *self.cons_pos.get_mut();
        let tail = *self.prod_tail.get_mut();
        while pos != tail {
            let idx = pos % self.capacity;
            unsafe { (*self.buffer[idx].get()).assume_init_drop() };
            pos += 1;
        }
    }
}

/// The producer side of a ring. Cheap to clone; many producers may share
/// one ring (multi-producer).
pub struct Producer<T>(Arc<Inner<T>>);

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Producer(self.0.clone())
    }
}

/// The consumer side of a ring. Never `Clone`: there is exactly one
/// consumer for the lifetime of the ring.
pub struct Consumer<T>(Arc<Inner<T>>);

/// Create a bounded ring, returning its producer and consumer halves.
pub fn channel<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    let inner = Arc::new(Inner::new(capacity));
    (Producer(inner.clone()), Consumer(inner))
}

impl<T> Producer<T> {
    /// Enqueue exactly `items.len()` elements, or none at all.
    ///
    /// Returns `Ok(())` if every item was enqueued, or `Err(n)` with the
    /// number of free slots available (`n < items.len()`) if the ring could
    /// not take the whole batch. Nothing is enqueued in that case, even
    /// under concurrent producers, because the reservation is atomic.
    pub fn enqueue_bulk(&self, items: Vec<T>) -> Result<(), usize> {
        let n = items.len();
        if n == 0 {
            return Ok(());
        }
        let (start, count) = self.0.reserve(n, true);
        if count == 0 {
            return Err(self.0.free_space());
        }
        for (i, item) in items.into_iter().enumerate() {
            self.0.write_slot(start + i, item);
        }
        self.0.publish(start, n);
        Ok(())
    }

    /// Enqueue as many of `items` as fit, returning how many were taken.
    pub fn enqueue_burst(&self, items: Vec<T>) -> usize {
        let n = items.len();
        if n == 0 {
            return 0;
        }
        let (start, count) = self.0.reserve(n, false);
        if count == 0 {
            return 0;
        }
        for (i, item) in items.into_iter().take(count).enumerate() {
            self.0.write_slot(start + i, item);
        }
        self.0.publish(start, count);
        count
    }

    /// Enqueue a single item, handing it back if the ring is full.
    pub fn try_enqueue(&self, item: T) -> Result<(), T> {
        let (start, count) = self.0.reserve(1, true);
        if count == 0 {
            return Err(item);
        }
        self.0.write_slot(start, item);
        self.0.publish(start, 1);
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.0.capacity
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Consumer<T> {
    /// Dequeue up to `max` elements, returning whatever was available
    /// (possibly fewer than `max`, possibly zero).
    pub fn dequeue_burst(&mut self, max: usize) -> Vec<T> {
        let pos = self.0.cons_pos.load(Ordering::Relaxed);
        let tail = self.0.prod_tail.load(Ordering::Acquire);
        let take = (tail - pos).min(max);
        let mut out = Vec::with_capacity(take);
        for i in 0..take {
            out.push(self.0.read_slot(pos + i));
        }
        if take > 0 {
            self.0.cons_pos.store(pos + take, Ordering::Release);
        }
        out
    }

    /// Dequeue a single item.
    pub fn try_dequeue(&mut self) -> Option<T> {
        self.dequeue_burst(1).into_iter().next()
    }

    pub fn capacity(&self) -> usize {
        self.0.capacity
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn single_producer_round_trip() {
        let (tx, mut rx) = channel::<u32>(4);
        tx.try_enqueue(1).unwrap();
        tx.try_enqueue(2).unwrap();
        assert_eq!(rx.try_dequeue(), Some(1));
        assert_eq!(rx.try_dequeue(), Some(2));
        assert_eq!(rx.try_dequeue(), None);
    }

    #[test]
    fn full_ring_rejects_enqueue() {
        let (tx, _rx) = channel::<u32>(2);
        tx.try_enqueue(1).unwrap();
        tx.try_enqueue(2).unwrap();
        assert_eq!(tx.try_enqueue(3), Err(3));
    }

    #[test]
    fn bulk_is_all_or_nothing() {
        let (tx, mut rx) = channel::<u32>(4);
        assert_eq!(tx.enqueue_bulk(vec![1, 2, 3, 4, 5]), Err(4));
        assert_eq!(rx.try_dequeue(), None, "partial batch must not be enqueued");
        assert!(tx.enqueue_bulk(vec![1, 2, 3]).is_ok());
        assert_eq!(rx.dequeue_burst(8), vec![1, 2, 3]);
    }

    #[test]
    fn burst_takes_what_fits() {
        let (tx, mut rx) = channel::<u32>(4);
        assert_eq!(tx.enqueue_burst(vec![1, 2, 3, 4, 5]), 4);
        assert_eq!(rx.dequeue_burst(10), vec![1, 2, 3, 4]);
    }

    #[test]
    fn concurrent_producers_never_duplicate_or_lose_items() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 2_000;
        let (tx, mut rx) = channel::<u64>(64);

        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let tx = tx.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        let value = (p * PER_PRODUCER + i) as u64;
                        loop {
                            if tx.try_enqueue(value).is_ok() {
                                break;
                            }
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        let mut seen = vec![false; PRODUCERS * PER_PRODUCER];
        let mut received = 0;
        while received < PRODUCERS * PER_PRODUCER {
            for item in rx.dequeue_burst(64) {
                assert!(!seen[item as usize], "duplicate item {item}");
                seen[item as usize] = true;
                received += 1;
            }
        }

        for h in handles {
            h.join().unwrap();
        }
        assert!(seen.into_iter().all(|s| s));
    }
}
