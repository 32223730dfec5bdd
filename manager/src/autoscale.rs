//! The autoscaling controller (C7): one periodic tick, rate-based.
//!
//! Two decisions come out of every tick: whether any sleeping child has
//! been idle long enough at the head of its parent's sleep stack to
//! reclaim permanently, and whether each service's aggregate packet rate
//! calls for a scale-up, a wake, a sleep, or nothing. The thresholds give
//! exactly one instance of slack between `L` and `H`, which is what keeps
//! constant in-band traffic from oscillating (invariant 7).

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use log::info;

use onvm_proto::Message;

use crate::config::{IDLE_TICKS_BEFORE_RECLAIM, WAIT_COUNTER_GRACE};
use crate::manager::Manager;

/// Fast-path multiply for the small `k` values (1..5) this system spends
/// most of its time at; falls back to plain multiplication otherwise.
/// Performance hint only; must never disagree with `rate as u64 * k as u64`.
#[inline]
pub fn quick_multiply(rate: u32, k: u32) -> u64 {
    let rate = rate as u64;
    match k {
        0 => 0,
        1 => rate,
        2 => rate << 1,
        3 => (rate << 1) + rate,
        4 => rate << 2,
        5 => (rate << 2) + rate,
        k => rate * k as u64,
    }
}

/// A summary of what one tick did, for tests and logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub permanent_stops: usize,
    pub wakes: usize,
    pub scales: usize,
    pub sleeps: usize,
    /// NFs stopped this tick for exceeding their `time_to_live` or
    /// `pkt_limit` admission bound.
    pub expirations: usize,
}

impl Manager {
    /// Run one autoscaling decision cycle over `dt` seconds of elapsed
    /// wall-clock time since the previous tick.
    pub fn tick(&mut self, dt: f64) -> TickReport {
        let mut service_pps: HashMap<u16, f64> = HashMap::new();
        let mut permanent_stops = Vec::new();
        let mut expired = Vec::new();

        let live_ids: Vec<u16> = self.registry.iter_live().map(|s| s.instance_id).collect();
        for id in live_ids {
            let slot = self.registry.get(id).unwrap();
            let rx = slot.counters.rx();
            let pps = rx.saturating_sub(slot.rx_last) as f64 / dt;
            let service_id = slot.service_id;
            let parent_id = slot.parent_id;
            let sleeping = slot.sleep_flag;
            let outlived_ttl = slot
                .time_to_live
                .zip(slot.admitted_at)
                .is_some_and(|(ttl, since)| since.elapsed() >= ttl);
            let over_pkt_limit = slot.pkt_limit.is_some_and(|limit| rx >= limit);

            let slot = self.registry.get_mut(id).unwrap();
            slot.rx_last = rx;
            if sleeping {
                slot.idle_ticks += 1;
                let idle_ticks = slot.idle_ticks;
                if let Some(parent_id) = parent_id {
                    if idle_ticks >= IDLE_TICKS_BEFORE_RECLAIM {
                        if let Some(parent) = self.registry.get(parent_id) {
                            if parent.sleep_instance.first() == Some(&id) {
                                permanent_stops.push(id);
                            }
                        }
                    }
                }
            } else {
                slot.idle_ticks = 0;
            }

            if outlived_ttl || over_pkt_limit {
                expired.push(id);
            }

            *service_pps.entry(service_id).or_insert(0.0) += pps;
        }

        let mut report = TickReport::default();

        for id in permanent_stops {
            let mut ctx = self.lifecycle_ctx();
            if ctx.stop(id).is_ok() {
                info!("tick: permanently reclaimed idle sleeper {id}");
                report.permanent_stops += 1;
            }
        }

        for id in expired {
            self.send_to(id, Message::Stop { instance_id: id }).ok();
            info!("tick: instance {id} exceeded its time_to_live/pkt_limit, sent STOP");
            report.expirations += 1;
        }

        let service_ids: Vec<u16> = service_pps.keys().copied().collect();
        for service_id in service_ids {
            self.apply_decision(service_id, service_pps[&service_id], &mut report);
        }

        report
    }

    fn apply_decision(&mut self, service_id: u16, pps: f64, report: &mut TickReport) {
        let k = self.services.count(service_id);
        if k == 0 {
            return;
        }
        let Some(parent_id) = self.services.parent(service_id) else {
            return;
        };
        let Some(parent) = self.registry.get(parent_id) else {
            return;
        };

        let high = quick_multiply(parent.handle_rate, k as u32) as f64;
        let low = quick_multiply(parent.handle_rate, k.saturating_sub(1) as u32) as f64;
        let sleep_count = parent.sleep_instance.len();
        let children_cnt = parent.children_cnt.load(Ordering::Acquire) as usize;
        let wait_flag = parent.wait_flag;
        let wait_counter = parent.wait_counter;
        let max_child = self.config.max_child;

        if pps >= high {
            if let Some(p) = self.registry.get_mut(parent_id) {
                p.wait_counter = WAIT_COUNTER_GRACE;
            }
            if sleep_count > 0 {
                let mut ctx = self.lifecycle_ctx();
                if ctx.wake(parent_id).is_ok() {
                    report.wakes += 1;
                }
            } else if children_cnt < max_child && !wait_flag {
                if self.send_to(parent_id, Message::Scale { parent_id }).is_ok() {
                    if let Some(p) = self.registry.get_mut(parent_id) {
                        p.wait_flag = true;
                    }
                    report.scales += 1;
                }
            } else {
                self.backpressure.on_overloaded(service_id, parent_id);
            }
        } else if pps < low {
            if wait_counter > 0 {
                if let Some(p) = self.registry.get_mut(parent_id) {
                    p.wait_counter -= 1;
                }
            } else if !wait_flag {
                if let Some(last) = self.services.last(service_id) {
                    let mut ctx = self.lifecycle_ctx();
                    if ctx.sleep(last).is_ok() {
                        report.sleeps += 1;
                    }
                }
            }
        }
    }
}
