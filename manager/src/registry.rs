//! The fixed NF table (C3): slots indexed by instance id, plus rotating id
//! allocation.
//!
//! Id `0` is reserved as "no NF"; usable ids run `1..capacity`. A slot is
//! "free" in `Empty` or `Stopped`. `spec.md` §3 calls these equivalent
//! for reallocation purposes, so the allocator treats them identically and
//! `stop()` always finishes by resetting a slot straight to `Empty`.

use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use onvm_proto::{CoreRequest, ManagerError, Message, NfCounters, Producer};

/// Where a slot sits in the lifecycle state machine (C5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NfStatus {
    Empty,
    Starting,
    Running,
    Paused,
    Stopping,
    Stopped,
}

impl NfStatus {
    pub fn is_free(self) -> bool {
        matches!(self, NfStatus::Empty | NfStatus::Stopped)
    }

    pub fn is_live(self) -> bool {
        matches!(self, NfStatus::Running | NfStatus::Paused)
    }

    pub fn has_rings(self) -> bool {
        matches!(
            self,
            NfStatus::Starting | NfStatus::Running | NfStatus::Paused | NfStatus::Stopping
        )
    }
}

/// One entry of the NF table.
pub struct NfSlot {
    pub instance_id: u16,
    pub status: NfStatus,
    pub service_id: u16,
    pub tag: Option<String>,
    pub core_id: Option<u16>,
    pub core_request: CoreRequest,
    pub handle_rate: u32,
    pub parent_id: Option<u16>,
    pub children_cnt: Arc<AtomicU32>,
    pub sleep_flag: bool,
    pub idle_ticks: u32,
    /// Controller's memory of this instance's rx counter as of the last
    /// autoscaling tick; used to derive a pps delta (`spec.md` §4.7).
    pub rx_last: u64,
    /// LIFO of sleeping children; meaningful only on a parent slot
    /// (`services[s][0]`).
    pub sleep_instance: Vec<u16>,
    pub wait_counter: u32,
    pub wait_flag: bool,
    pub admitted_at: Option<Instant>,
    pub time_to_live: Option<Duration>,
    pub pkt_limit: Option<u64>,
    pub counters: Arc<NfCounters>,
    /// The controller's side of this slot's three rings; `None` whenever
    /// `status` doesn't `has_rings()`.
    pub rings: Option<SlotRings>,
}

/// The controller-facing halves of a slot's rx/tx/msg rings. The NF holds
/// the complementary halves inside its `NfHandle`.
pub struct SlotRings {
    /// Fabric/dispatcher enqueues packets here for the NF to consume.
    pub rx_producer: Producer<(onvm_proto::PacketBuf, onvm_proto::PacketMeta)>,
    /// The NF enqueues outgoing packets here; the dispatcher drains them.
    pub tx_consumer: onvm_proto::Consumer<(onvm_proto::PacketBuf, onvm_proto::PacketMeta)>,
    /// Controller sends administrative messages to the NF here.
    pub msg_producer: Producer<Message>,
}

impl NfSlot {
    fn empty(instance_id: u16) -> Self {
        Self {
            instance_id,
            status: NfStatus::Empty,
            service_id: 0,
            tag: None,
            core_id: None,
            core_request: CoreRequest::Shared,
            handle_rate: 0,
            parent_id: None,
            children_cnt: Arc::new(AtomicU32::new(0)),
            sleep_flag: false,
            idle_ticks: 0,
            rx_last: 0,
            sleep_instance: Vec::new(),
            wait_counter: 0,
            wait_flag: false,
            admitted_at: None,
            time_to_live: None,
            pkt_limit: None,
            counters: Arc::new(NfCounters::default()),
            rings: None,
        }
    }

    /// Reset a slot back to `Empty`, dropping every field an NF instance
    /// could have touched. Called at the end of `stop()`.
    pub fn reset(&mut self) {
        let instance_id = self.instance_id;
        *self = Self::empty(instance_id);
    }
}

/// The fixed-size NF table plus rotating id allocation.
pub struct NfRegistry {
    slots: Vec<NfSlot>,
    /// Rotating cursor for `allocate_id`; starts the next scan.
    next_instance_id: u16,
    pub num_nfs: u32,
}

impl NfRegistry {
    pub fn new(capacity: u16) -> Self {
        assert!(capacity > 1, "registry needs room for at least one NF past id 0");
        let slots = (0..capacity).map(NfSlot::empty).collect();
        Self {
            slots,
            next_instance_id: 1,
            num_nfs: 0,
        }
    }

    pub fn capacity(&self) -> u16 {
        self.slots.len() as u16
    }

    pub fn get(&self, id: u16) -> Option<&NfSlot> {
        self.slots.get(id as usize)
    }

    pub fn get_mut(&mut self, id: u16) -> Option<&mut NfSlot> {
        self.slots.get_mut(id as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NfSlot> {
        self.slots.iter().skip(1)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut NfSlot> {
        self.slots.iter_mut().skip(1)
    }

    pub fn iter_live(&self) -> impl Iterator<Item = &NfSlot> {
        self.iter().filter(|s| s.status.is_live())
    }

    /// Reserve a specific id, failing if it's out of range or occupied.
    pub fn reserve(&mut self, id: u16) -> Result<(), ManagerError> {
        let slot = self.slots.get(id as usize).ok_or(ManagerError::IdConflict)?;
        if id == 0 || !slot.status.is_free() {
            return Err(ManagerError::IdConflict);
        }
        Ok(())
    }

    /// Two-pass rotating scan for the first free id at or after the
    /// cursor, wrapping once. Mirrors the original's `next_instance_id` /
    /// `starting_instance_id` allocator: no id is reused while the cursor
    /// has passed it at least once since, spreading reuse across the
    /// table instead of always handing back the lowest free id.
    pub fn allocate_id(&mut self) -> Result<u16, ManagerError> {
        let capacity = self.capacity();
        if let Some(id) = (self.next_instance_id..capacity).find(|&id| self.slots[id as usize].status.is_free()) {
            self.next_instance_id = id.wrapping_add(1);
            if self.next_instance_id >= capacity {
                self.next_instance_id = 1;
            }
            return Ok(id);
        }
        if let Some(id) = (1..self.next_instance_id).find(|&id| self.slots[id as usize].status.is_free()) {
            self.next_instance_id = id + 1;
            return Ok(id);
        }
        Err(ManagerError::NoIds)
    }
}
