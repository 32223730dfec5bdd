//! Error kinds surfaced by the control plane.
//!
//! None of these are fatal to the controller. Every one of them is meant
//! to be written back into the message that caused it and handed to the
//! originating NF, never unwound or logged-and-ignored silently.

use thiserror::Error;

/// Every non-fatal error the control plane can report to a caller.
///
/// Fatal conditions (ring or mempool allocation failing at boot) are not
/// represented here. Those `panic!` during `Manager::new`, because they
/// mean the process is misconfigured and cannot proceed safely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ManagerError {
    /// The NF registry has no free instance ids left.
    #[error("no free instance ids (registry is at MAX_NFS)")]
    NoIds,
    /// `service_id` is not below `MAX_SERVICES`.
    #[error("service id out of range")]
    ServiceMax,
    /// The service's live-instance count is already at `MAX_NFS_PER_SERVICE`.
    #[error("service instance count at MAX_NFS_PER_SERVICE")]
    ServiceCountMax,
    /// A caller-supplied instance id is already occupied.
    #[error("instance id already in use")]
    IdConflict,
    /// The core allocator could not satisfy the requested core policy.
    #[error("no core capacity for the requested policy")]
    NoCoreCapacity,
    /// A fixed-size object pool had nothing left to hand out.
    #[error("object pool exhausted")]
    PoolExhausted,
    /// A bounded ring had no room for the requested enqueue.
    #[error("ring full")]
    RingFull,
    /// A bounded ring had nothing to dequeue.
    #[error("ring empty")]
    RingEmpty,
    /// A lifecycle operation was attempted from a state that does not
    /// permit it (e.g. `ready()` on a slot that was never `Starting`).
    #[error("invalid lifecycle transition")]
    InvalidTransition,
}
