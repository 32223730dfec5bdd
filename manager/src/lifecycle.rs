//! The lifecycle state machine (C5): admit, ready, sleep, wake, stop.
//!
//! Every transition here is only ever invoked from the controller thread,
//! in response to a dequeued message. There is no concurrent access to
//! guard against within this module. What each function must get right is
//! the *order* of side effects, since a half-finished stop or a
//! ready-before-rings-exist would violate the invariants in `spec.md` §3.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use onvm_proto::{AdmitRequest, CoreRequest, ManagerError, Mempool, Message, NfCounters, PacketBuf};

use crate::config::ManagerConfig;
use crate::core_alloc::CoreTable;
use crate::registry::{NfRegistry, NfSlot, NfStatus, SlotRings};
use crate::service_map::ServiceMap;
use crate::supervision;

/// Everything a lifecycle transition needs mutable access to. Borrowed
/// fresh for each call from `Manager`'s fields; this type never outlives
/// one dispatcher step.
pub struct LifecycleCtx<'a> {
    pub registry: &'a mut NfRegistry,
    pub services: &'a mut ServiceMap,
    pub cores: &'a mut CoreTable,
    pub packet_pool: &'a mut Mempool<PacketBuf>,
    pub config: &'a ManagerConfig,
}

/// Returned to the admitting NF: its capability handle plus the assigned
/// core, so the caller can log/report without walking the handle's guts.
pub struct AdmitOutcome {
    pub handle: onvm_proto::NfHandle,
}

impl<'a> LifecycleCtx<'a> {
    /// `Empty -> Starting`.
    pub fn admit(&mut self, req: AdmitRequest, inbox: onvm_proto::Producer<Message>) -> Result<AdmitOutcome, ManagerError> {
        if req.service_id as usize >= self.config.max_services as usize {
            return Err(ManagerError::ServiceMax);
        }
        if self.services.count(req.service_id) >= self.services.capacity() {
            return Err(ManagerError::ServiceCountMax);
        }

        let instance_id = match req.instance_id {
            Some(id) => {
                self.registry.reserve(id)?;
                id
            }
            None => self.registry.allocate_id()?,
        };

        let dedicated = matches!(req.core_request, CoreRequest::Dedicated);
        let core_id = self.cores.acquire(req.core_hint, dedicated)?;

        if let Some(parent_id) = req.parent_id {
            if let Some(parent) = self.registry.get(parent_id) {
                supervision::inc_children(&parent.children_cnt);
            }
            // The pending SCALE this admit confirms is done serializing;
            // let the next tick re-evaluate this parent's service rate.
            if let Some(parent) = self.registry.get_mut(parent_id) {
                parent.wait_flag = false;
            }
        }

        let (rx_producer, rx_consumer) = onvm_proto::channel(self.config.nf_queue_ringsize);
        let (tx_producer, tx_consumer) = onvm_proto::channel(self.config.nf_queue_ringsize);
        let (msg_producer, msg_consumer) = onvm_proto::channel(self.config.nf_msg_queue_size);

        let counters = Arc::new(NfCounters::default());
        let slot = self
            .registry
            .get_mut(instance_id)
            .expect("instance_id was just allocated or reserved against this table");

        slot.status = NfStatus::Starting;
        slot.service_id = req.service_id;
        slot.tag = Some(req.tag);
        slot.core_id = Some(core_id);
        slot.core_request = req.core_request;
        slot.handle_rate = req.handle_rate;
        slot.parent_id = req.parent_id;
        slot.sleep_flag = false;
        slot.idle_ticks = 0;
        slot.rx_last = 0;
        slot.admitted_at = Some(Instant::now());
        slot.time_to_live = req.time_to_live;
        slot.pkt_limit = req.pkt_limit;
        slot.counters = Arc::clone(&counters);
        slot.rings = Some(SlotRings {
            rx_producer,
            tx_consumer,
            msg_producer,
        });

        Ok(AdmitOutcome {
            handle: onvm_proto::NfHandle {
                instance_id,
                service_id: req.service_id,
                core_id,
                rx: rx_consumer,
                tx: tx_producer,
                msg: msg_consumer,
                inbox,
                counters,
                packet_return: self.packet_pool.returner(),
            },
        })
    }

    /// `Starting -> Running`. Joins the service map unless already marked
    /// sleeping (a child admitted to immediately replace a sleeper, which
    /// this codebase never constructs today but the guard costs nothing).
    pub fn ready(&mut self, instance_id: u16) -> Result<(), ManagerError> {
        let slot = self.registry.get_mut(instance_id).ok_or(ManagerError::InvalidTransition)?;
        if slot.status != NfStatus::Starting {
            return Err(ManagerError::InvalidTransition);
        }
        slot.status = NfStatus::Running;
        let sleeping = slot.sleep_flag;
        let service_id = slot.service_id;
        self.registry.num_nfs += 1;
        if !sleeping {
            self.services.add(service_id, instance_id)?;
        }
        Ok(())
    }

    /// `Running -> Paused`, moving the instance onto its parent's sleep
    /// stack. Called only by the autoscaling controller (§4.7 rule 2).
    pub fn sleep(&mut self, instance_id: u16) -> Result<(), ManagerError> {
        let slot = self.registry.get(instance_id).ok_or(ManagerError::InvalidTransition)?;
        if slot.status != NfStatus::Running {
            return Err(ManagerError::InvalidTransition);
        }
        let service_id = slot.service_id;
        let parent_id = self.services.parent(service_id).ok_or(ManagerError::InvalidTransition)?;

        self.services.remove(service_id, instance_id);
        if let Some(parent) = self.registry.get_mut(parent_id) {
            parent.sleep_instance.push(instance_id);
        }
        let slot = self.registry.get_mut(instance_id).unwrap();
        slot.status = NfStatus::Paused;
        slot.sleep_flag = true;
        slot.idle_ticks = 0;
        Ok(())
    }

    /// `Paused -> Running`, popping the most recently slept child
    /// (LIFO, invariant 10).
    pub fn wake(&mut self, parent_id: u16) -> Result<u16, ManagerError> {
        let parent = self.registry.get_mut(parent_id).ok_or(ManagerError::InvalidTransition)?;
        let instance_id = parent.sleep_instance.pop().ok_or(ManagerError::InvalidTransition)?;
        let service_id = parent.service_id;

        let slot = self.registry.get_mut(instance_id).ok_or(ManagerError::InvalidTransition)?;
        if slot.status != NfStatus::Paused {
            return Err(ManagerError::InvalidTransition);
        }
        slot.status = NfStatus::Running;
        slot.sleep_flag = false;
        slot.idle_ticks = 0;
        self.services.add(service_id, instance_id)?;
        Ok(instance_id)
    }

    /// Full teardown, in the exact order `spec.md` §4.5 mandates. Tolerant
    /// of an already-stopped/empty slot (idempotent, invariant 8).
    pub fn stop(&mut self, instance_id: u16) -> Result<(), ManagerError> {
        let Some(slot) = self.registry.get(instance_id) else {
            return Ok(());
        };
        if slot.status.is_free() {
            return Ok(()); // already torn down; no-op per the idempotency policy
        }
        if slot.status == NfStatus::Running || slot.status == NfStatus::Paused {
            if slot.children_cnt.load(Ordering::Acquire) > 0 {
                return Err(ManagerError::InvalidTransition);
            }
        }

        let prior_status = slot.status;
        let service_id = slot.service_id;
        let sleep_flag = slot.sleep_flag;
        let parent_id = slot.parent_id;
        let core_id = slot.core_id;

        // 1. mark Stopping: observable to the controller, rejects new
        //    messages to this id (enforced by the dispatcher, not here).
        self.registry.get_mut(instance_id).unwrap().status = NfStatus::Stopping;

        // 2. remove from the service map unless it was sleeping (it was
        //    never in the map to begin with).
        if !sleep_flag {
            self.services.remove(service_id, instance_id);
        } else if let Some(parent_id) = parent_id {
            if let Some(parent) = self.registry.get_mut(parent_id) {
                parent.sleep_instance.retain(|&id| id != instance_id);
            }
        }

        // 3. free the tag.
        self.registry.get_mut(instance_id).unwrap().tag = None;

        // 4. decrement the parent's live-children count.
        if let Some(parent_id) = parent_id {
            if let Some(parent) = self.registry.get(parent_id) {
                supervision::dec_children(&parent.children_cnt);
            }
        }

        // 5. release the core, then reconsider core mappings now that it
        //    may have gone empty (§4.5 step 9).
        if let Some(core_id) = core_id {
            self.cores.release(core_id);
            self.maybe_reassign_core(core_id);
        }

        // 6. drain tx, freeing buffers; drop msg ring contents. Draining
        //    rx is the NF's own job (`nf_sdk::stop`) before it ever sends
        //    `NF_STOPPING`. `rx`'s consumer lives inside the `NfHandle`
        //    the NF holds, not here, matching §5's rule that teardown
        //    drain is something an NF thread does, not the controller.
        if let Some(rings) = self.registry.get_mut(instance_id).unwrap().rings.take() {
            self.drain_packets(rings.tx_consumer);
            drop(rings.msg_producer);
        }

        // 7 is implicit: resetting the slot below returns it to the free
        // pool the allocator scans.

        // 8. decrement num_nfs only if it was Running/Paused.
        if prior_status == NfStatus::Running || prior_status == NfStatus::Paused {
            self.registry.num_nfs = self.registry.num_nfs.saturating_sub(1);
        }

        self.registry.get_mut(instance_id).unwrap().reset();
        Ok(())
    }

    /// When `freed_core` has just gone empty and `SHUTDOWN_CORE_REASSIGNMENT`
    /// is enabled, move the instance C2 selects onto it and tell that
    /// instance to rebind (`CHANGE_CORE`).
    fn maybe_reassign_core(&mut self, freed_core: u16) {
        if !self.config.shutdown_core_reassignment || self.cores.nf_count(freed_core) != 0 {
            return;
        }

        let mut by_core: HashMap<u16, Vec<u16>> = HashMap::new();
        for slot in self.registry.iter_live() {
            if let Some(core_id) = slot.core_id {
                by_core.entry(core_id).or_default().push(slot.instance_id);
            }
        }
        let Some(candidate) = self
            .cores
            .find_reassignment_candidate(freed_core, by_core.iter().map(|(&c, v)| (c, v.as_slice())))
        else {
            return;
        };
        let Some(old_core) = self.registry.get(candidate).and_then(|s| s.core_id) else {
            return;
        };

        self.cores.relocate(old_core, freed_core);
        if let Some(slot) = self.registry.get_mut(candidate) {
            slot.core_id = Some(freed_core);
        }
        if let Some(rings) = self.registry.get(candidate).and_then(|s| s.rings.as_ref()) {
            let _ = rings.msg_producer.try_enqueue(Message::ChangeCore {
                instance_id: candidate,
                core_id: freed_core,
            });
        }
    }

    fn drain_packets(&mut self, mut consumer: onvm_proto::Consumer<(PacketBuf, onvm_proto::PacketMeta)>) {
        loop {
            let batch = consumer.dequeue_burst(self.config.packet_read_size);
            if batch.is_empty() {
                break;
            }
            for (buf, _meta) in batch {
                self.packet_pool.put(buf);
            }
        }
    }
}

/// Consumes any slot a dead/misbehaving instance left behind; used by the
/// autoscaling controller when it reclaims a permanently-idle sleeper.
pub fn is_stoppable(slot: &NfSlot) -> bool {
    !slot.status.is_free()
}
