//! The capability bundle an admitted NF gets back and nothing else.
//!
//! This is the type-system half of the control-path/data-path partition:
//! the controller keeps the registry slot, the service map, and the core
//! table to itself; an NF only ever sees an `NfHandle`, which exposes its
//! own rings, its own counters, and a way to send further control messages,
//! never a reference to the registry. There is no lock between the two
//! sides because there is nothing for an NF to reach that the controller
//! also writes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::message::Message;
use crate::packet::{PacketBuf, PacketMeta};
use crate::ring::{Consumer, Producer};

/// Packet and drop counters for one NF instance.
///
/// Only the owning NF ever writes these (invariant 3 in `spec.md` §3); the
/// controller only reads them, via the `Arc` it keeps alongside the
/// registry slot, which is why plain atomics are enough: no lock needed
/// between a single writer and many readers.
#[derive(Debug, Default)]
pub struct NfCounters {
    rx: AtomicU64,
    tx: AtomicU64,
    drops: AtomicU64,
}

impl NfCounters {
    pub fn record_rx(&self, n: u64) {
        self.rx.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_tx(&self, n: u64) {
        self.tx.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_drop(&self, n: u64) {
        self.drops.fetch_add(n, Ordering::Relaxed);
    }

    pub fn rx(&self) -> u64 {
        self.rx.load(Ordering::Relaxed)
    }

    pub fn tx(&self) -> u64 {
        self.tx.load(Ordering::Relaxed)
    }

    pub fn drops(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }
}

/// Everything an admitted NF needs to run its data loop, and nothing an NF
/// could use to mutate controller-owned state.
///
/// Deliberately not `Clone`: an `NfHandle` is handed out exactly once, in
/// the reply to `NF_STARTING`, and its `rx`/`msg` consumers are
/// single-consumer by construction (see `crate::ring`), so a second copy
/// could never be used safely anyway.
pub struct NfHandle {
    pub instance_id: u16,
    pub service_id: u16,
    pub core_id: u16,
    /// Packets staged for this NF by the fabric/dispatcher.
    pub rx: Consumer<(PacketBuf, PacketMeta)>,
    /// Where this NF sends packets onward.
    pub tx: Producer<(PacketBuf, PacketMeta)>,
    /// Administrative messages targeted at this instance (`Stop`, `Scale`,
    /// `ChangeCore`).
    pub msg: Consumer<Message>,
    /// A clone of the shared inbox, for sending `NF_READY`/`NF_STOPPING`
    /// and further requests back to the controller.
    pub inbox: Producer<Message>,
    /// Shared with the controller's registry slot; the controller only
    /// reads through its own `Arc` clone.
    pub counters: Arc<NfCounters>,
    /// Where to return packet buffers this NF is done with. Used on the
    /// teardown path: since `rx` is single-consumer and owned by this
    /// handle, only the NF itself can drain what's left in it before
    /// exiting, so the SDK's `stop()` drains `rx` through here rather than
    /// leaving that to the controller.
    pub packet_return: Producer<PacketBuf>,
}
