//! Parent/child supervision (C8).
//!
//! A parent NF that thread-spawns a child inherits nothing structural from
//! it beyond bookkeeping: the child gets its own instance id, its own
//! slot, and records `parent_id`; the parent only tracks how many children
//! are still alive. `children_cnt` is the one piece of registry state a
//! non-controller thread may write, since child-stop paths touch it
//! directly; everything else about a slot stays controller-exclusive.

use std::sync::atomic::{AtomicU32, Ordering};

pub fn inc_children(children_cnt: &AtomicU32) -> u32 {
    children_cnt.fetch_add(1, Ordering::AcqRel) + 1
}

/// Returns the count *after* decrementing.
pub fn dec_children(children_cnt: &AtomicU32) -> u32 {
    children_cnt.fetch_sub(1, Ordering::AcqRel) - 1
}

/// Hook point for back-pressure policy when a service is saturated and its
/// parent has already hit `Max_Child`. The original defers this
/// ("do back pressure in the future"); we expose the hook but ship only a
/// no-op implementation.
pub trait BackpressureHook: Send + Sync {
    fn on_overloaded(&self, service_id: u16, parent_id: u16);
}

/// The default hook: does nothing. Installed unless a caller supplies
/// their own via `Manager::with_backpressure_hook`.
pub struct NoopBackpressure;

impl BackpressureHook for NoopBackpressure {
    fn on_overloaded(&self, _service_id: u16, _parent_id: u16) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inc_then_dec_returns_to_zero() {
        let cnt = AtomicU32::new(0);
        assert_eq!(inc_children(&cnt), 1);
        assert_eq!(inc_children(&cnt), 2);
        assert_eq!(dec_children(&cnt), 1);
        assert_eq!(dec_children(&cnt), 0);
    }
}
