//! The top-level `Manager`: owns every sub-table and is the only thing
//! with `&mut` access to controller-exclusive state (`spec.md` §9: "a
//! single owned `Manager` value holding all sub-tables").

use onvm_proto::{channel, Consumer, Message, PacketBuf, Producer};

use crate::config::ManagerConfig;
use crate::core_alloc::CoreTable;
use crate::registry::NfRegistry;
use crate::service_map::ServiceMap;
use crate::supervision::{BackpressureHook, NoopBackpressure};

/// Bookkeeping for a created-but-opaque LPM/flow table. The body is out of
/// scope; the manager only needs to remember that the creation handshake
/// happened, for diagnostics.
pub struct TableHandle {
    pub capacity: u32,
}

pub struct Manager {
    pub(crate) registry: NfRegistry,
    pub(crate) services: ServiceMap,
    pub(crate) cores: CoreTable,
    pub(crate) packet_pool: onvm_proto::Mempool<PacketBuf>,
    pub(crate) config: ManagerConfig,
    pub(crate) backpressure: Box<dyn BackpressureHook>,
    pub(crate) lpm_tables: Vec<TableHandle>,
    pub(crate) ft_tables: Vec<TableHandle>,
    /// Producer half cloned into every admitted NF's handle; the consumer
    /// half is drained once per tick by `dispatch::drain_inbox`.
    pub(crate) inbox_tx: Producer<Message>,
    pub(crate) inbox_rx: Consumer<Message>,
}

impl Manager {
    pub fn new(config: ManagerConfig) -> Self {
        let registry = NfRegistry::new(config.max_nfs);
        let services = ServiceMap::new(config.max_services, config.max_nfs_per_service);
        let cores = CoreTable::new(config.max_cores);
        // Fatal if this ever panics: a zero-capacity pool means the
        // process is misconfigured and cannot move a single packet.
        let mut tag = 0u64;
        let packet_pool = onvm_proto::Mempool::new(config.packet_pool_capacity, || {
            tag += 1;
            PacketBuf(tag)
        });
        let (inbox_tx, inbox_rx) = channel(config.max_nfs as usize);

        Self {
            registry,
            services,
            cores,
            packet_pool,
            config,
            backpressure: Box::new(NoopBackpressure),
            lpm_tables: Vec::new(),
            ft_tables: Vec::new(),
            inbox_tx,
            inbox_rx,
        }
    }

    pub fn with_backpressure_hook(mut self, hook: Box<dyn BackpressureHook>) -> Self {
        self.backpressure = hook;
        self
    }

    /// A clone of the shared inbox producer, for an external admission
    /// path (e.g. the boot manifest, or a test harness standing in for an
    /// NF process) to send `NF_STARTING` without already holding a handle.
    pub fn inbox(&self) -> Producer<Message> {
        self.inbox_tx.clone()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn num_nfs(&self) -> u32 {
        self.registry.num_nfs
    }

    pub fn registry(&self) -> &NfRegistry {
        &self.registry
    }

    pub fn services(&self) -> &ServiceMap {
        &self.services
    }

    pub fn packet_pool_free_count(&self) -> usize {
        self.packet_pool.free_count()
    }

    /// Mint a fresh packet buffer from the shared pool and pair it with
    /// metadata, staging it onto instance `dest`'s rx ring. Stands in for
    /// the out-of-scope fabric/NIC ingress path in tests and demos.
    pub fn inject_packet(
        &mut self,
        dest: u16,
        meta: onvm_proto::PacketMeta,
    ) -> Result<(), onvm_proto::ManagerError> {
        let buf = self.packet_pool.get()?;
        let slot = self
            .registry
            .get(dest)
            .ok_or(onvm_proto::ManagerError::InvalidTransition)?;
        let rings = slot
            .rings
            .as_ref()
            .ok_or(onvm_proto::ManagerError::InvalidTransition)?;
        rings
            .rx_producer
            .try_enqueue((buf, meta))
            .map_err(|(buf, _)| {
                self.packet_pool.put(buf);
                onvm_proto::ManagerError::RingFull
            })
    }
}
