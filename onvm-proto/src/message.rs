//! Control messages carried by the shared inbox ring.
//!
//! The original core treats a message as `{type, payload-pointer}`, drawn
//! from a fixed pool and returned to it once the dispatcher is done. A
//! single process with real OS threads has a cheaper way to get the same
//! "caller blocks until the controller replies" behavior: each request
//! variant below carries its own one-shot `mpsc::Sender`, so `send_msg`-style
//! calls block on a `Receiver` instead of spin-polling a shared status byte.
//! The pool-capacity discipline from the original is preserved differently
//! here too: the shared inbox ring is itself bounded, so there is still a
//! hard cap on how many in-flight requests the controller can be holding at
//! once. See [`crate::ring::Ring`].

use std::sync::mpsc::Sender;
use std::time::Duration;

use crate::error::ManagerError;
use crate::handle::NfHandle;

/// Which CPU core policy an admitting NF is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreRequest {
    /// Share a core with other NFs.
    Shared,
    /// Require a core with no other NF on it.
    Dedicated,
}

/// An admission request (`NF_STARTING`).
#[derive(Debug, Clone)]
pub struct AdmitRequest {
    pub service_id: u16,
    pub handle_rate: u32,
    pub tag: String,
    /// Caller-supplied instance id; `None` asks the registry to allocate one.
    pub instance_id: Option<u16>,
    pub core_request: CoreRequest,
    /// Preferred core; `None` lets the allocator pick. With
    /// `CoreRequest::Dedicated` this is the core that must be empty.
    pub core_hint: Option<u16>,
    /// Optional hard lifetime: controller issues an unsolicited `Stop`
    /// after this many seconds since admission.
    pub time_to_live: Option<Duration>,
    /// Optional hard packet budget: controller issues an unsolicited `Stop`
    /// once cumulative rx packets reach this count.
    pub pkt_limit: Option<u64>,
    /// Set by the autoscaling controller when admitting a thread-spawned
    /// child in response to `Scale`; `None` for a top-level admission.
    pub parent_id: Option<u16>,
}

/// A longest-prefix-match table creation request (`REQUEST_LPM`). The table
/// body itself is out of scope; only the creation handshake is modeled.
#[derive(Debug, Clone)]
pub struct LpmRequest {
    pub max_rules: u32,
}

/// A flow-table creation request (`REQUEST_FT`); same scoping as `LpmRequest`.
#[derive(Debug, Clone)]
pub struct FtRequest {
    pub max_flows: u32,
}

/// One control message in flight between an NF and the controller.
///
/// Every variant that expects a reply carries the `Sender` half of a
/// one-shot channel; the controller always replies exactly once, even on
/// failure, mirroring "the message is still returned to its pool" from the
/// original's error-handling policy. Nothing here is ever silently dropped.
#[derive(Debug)]
pub enum Message {
    RequestLpm {
        request: LpmRequest,
        reply: Sender<Result<(), ManagerError>>,
    },
    RequestFt {
        request: FtRequest,
        reply: Sender<Result<(), ManagerError>>,
    },
    NfStarting {
        request: AdmitRequest,
        reply: Sender<Result<NfHandle, ManagerError>>,
    },
    NfReady {
        instance_id: u16,
    },
    NfStopping {
        instance_id: u16,
    },
    /// Controller-to-NF: exit the data loop at the next iteration.
    Stop {
        instance_id: u16,
    },
    /// Controller-to-parent: thread-spawn a new child of the same service.
    Scale {
        parent_id: u16,
    },
    /// Controller-to-NF: rebind to a new core.
    ChangeCore {
        instance_id: u16,
        core_id: u16,
    },
    /// NF-to-NF: relayed by the dispatcher onto `dest_id`'s msg ring
    /// verbatim, since no NF holds another NF's msg producer directly
    /// (`spec.md` §6's `send_msg(dest_id, type, data)`).
    Forward {
        dest_id: u16,
        kind: u8,
        data: Vec<u8>,
    },
}

impl Message {
    /// A short tag for logging, matching the original's message type names.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::RequestLpm { .. } => "REQUEST_LPM",
            Message::RequestFt { .. } => "REQUEST_FT",
            Message::NfStarting { .. } => "NF_STARTING",
            Message::NfReady { .. } => "NF_READY",
            Message::NfStopping { .. } => "NF_STOPPING",
            Message::Stop { .. } => "STOP",
            Message::Scale { .. } => "SCALE",
            Message::ChangeCore { .. } => "CHANGE_CORE",
            Message::Forward { .. } => "FORWARD",
        }
    }
}
