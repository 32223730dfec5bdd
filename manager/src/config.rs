//! Boot-time configuration.
//!
//! Every constant here has a compiled-in default matching the original's
//! `#define`s; all are overridable through [`ManagerConfig`], built by the
//! `onvm-manager` binary from CLI flags (see `bin/manager.rs`).

use serde::Deserialize;

/// NF table size. Id `0` is reserved as the "no NF" sentinel, so usable ids
/// run `1..MAX_NFS`.
pub const MAX_NFS: u16 = 128;
/// Service id upper bound.
pub const MAX_SERVICES: u16 = 32;
/// Per-service live-instance map capacity.
pub const MAX_NFS_PER_SERVICE: usize = 16;
/// Per-parent fan-out cap.
pub const MAX_CHILD: usize = 7;
/// Number of CPU cores the core allocator tracks.
pub const MAX_CORES: u16 = 16;
/// rx/tx ring capacity, in packet slots.
pub const NF_QUEUE_RINGSIZE: usize = 1024;
/// Per-NF control-message ring capacity.
pub const NF_MSG_QUEUE_SIZE: usize = 64;
/// Burst dequeue size used when draining a ring on teardown.
pub const PACKET_READ_SIZE: usize = 32;
/// Size of the shared packet-buffer mempool backing every rx/tx ring.
pub const PACKET_POOL_CAPACITY: usize = 8192;
/// Ticks a sleeping child must be idle at the head of its parent's sleep
/// stack before the controller permanently reclaims it (`spec.md` §4.7).
pub const IDLE_TICKS_BEFORE_RECLAIM: u32 = 10;
/// Ticks `wait_counter` is set to after a scale-up, gating further sleeps.
pub const WAIT_COUNTER_GRACE: u32 = 10;

/// Runtime-tunable configuration, built from defaults plus CLI overrides.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub max_nfs: u16,
    pub max_services: u16,
    pub max_nfs_per_service: usize,
    pub max_child: usize,
    pub max_cores: u16,
    pub nf_queue_ringsize: usize,
    pub nf_msg_queue_size: usize,
    pub packet_read_size: usize,
    pub packet_pool_capacity: usize,
    /// Controller tick interval, in seconds (`Δt` in `spec.md` §4.7).
    pub tick_interval_secs: f64,
    /// Feature flag for `spec.md` §4.5 step 9: reassign an NF onto a
    /// freed-up core's neighbor when the freed core goes empty.
    pub shutdown_core_reassignment: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_nfs: MAX_NFS,
            max_services: MAX_SERVICES,
            max_nfs_per_service: MAX_NFS_PER_SERVICE,
            max_child: MAX_CHILD,
            max_cores: MAX_CORES,
            nf_queue_ringsize: NF_QUEUE_RINGSIZE,
            nf_msg_queue_size: NF_MSG_QUEUE_SIZE,
            packet_read_size: PACKET_READ_SIZE,
            packet_pool_capacity: PACKET_POOL_CAPACITY,
            tick_interval_secs: 0.5,
            shutdown_core_reassignment: false,
        }
    }
}

/// One entry of the optional boot-time NF manifest (`-F <CONFIG_FILE.json>`
/// in the original), describing an NF to pre-admit before the controller
/// starts ticking.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub service_id: u16,
    pub handle_rate: u32,
    pub tag: String,
    #[serde(default)]
    pub instance_id: Option<u16>,
    #[serde(default)]
    pub dedicated_core: Option<u16>,
}

/// The top-level shape of a boot manifest file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Manifest {
    #[serde(default)]
    pub nfs: Vec<ManifestEntry>,
}
