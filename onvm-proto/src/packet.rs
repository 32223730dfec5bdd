//! Per-packet metadata.
//!
//! The packet payload itself (the bytes an NF classifies and rewrites) is
//! out of scope here: it lives in the shared mempool's arena, owned by
//! whichever ring currently holds it. What the control plane and the NF
//! SDK both need is the small, fixed-size *metadata* that travels with a
//! packet and tells the data plane where it goes next.

use bitflags::bitflags;

/// What should happen to a packet after an NF's handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketAction {
    /// Forward to a specific NF instance by id.
    ToNf(u16),
    /// Forward out a NIC port.
    Out(u16),
    /// Drop the packet and return its buffer to the mempool.
    Drop,
    /// Parallel dispatch: a bitmask naming every NF instance (bit index =
    /// instance id) the packet should be copied/staged to.
    Parallel(u64),
}

bitflags! {
    /// Flags an NF sets to stage parallel execution (`PacketAction::Parallel`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PacketFlags: u8 {
        /// The payload may be read by a downstream parallel consumer.
        const PAYLOAD_READ = 1 << 0;
        /// The payload may be mutated by a downstream parallel consumer.
        const PAYLOAD_WRITE = 1 << 1;
    }
}

/// Metadata carried alongside every packet buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketMeta {
    pub action: PacketAction,
    pub destination: u16,
    pub flags: PacketFlags,
}

impl PacketMeta {
    /// The default metadata for a freshly-classified packet: drop unless
    /// an NF's handler says otherwise.
    pub const fn new() -> Self {
        Self {
            action: PacketAction::Drop,
            destination: 0,
            flags: PacketFlags::empty(),
        }
    }
}

impl Default for PacketMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// An opaque packet buffer handle.
///
/// The real payload bytes live in an external shared-memory arena (out of
/// scope for this crate, per `spec.md` §1); what the control plane and its
/// tests need is a cheap, copyable token that stands in for "one packet
/// buffer", so ring and mempool behavior (ownership, drain, free-count)
/// can be exercised without a real packet allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketBuf(pub u64);
