//! Wire types shared between the control plane and every NF.
//!
//! Nothing in this crate runs a control loop or owns a registry. It only
//! defines the rings, pools, and messages that cross the boundary between
//! `manager` (which owns all of that) and `nf-sdk` (which only ever holds
//! an [`handle::NfHandle`]).

pub mod error;
pub mod handle;
pub mod mempool;
pub mod message;
pub mod packet;
pub mod ring;

pub use error::ManagerError;
pub use handle::{NfCounters, NfHandle};
pub use mempool::Mempool;
pub use message::{AdmitRequest, CoreRequest, FtRequest, LpmRequest, Message};
pub use packet::{PacketAction, PacketBuf, PacketFlags, PacketMeta};
pub use ring::{channel, Consumer, Producer};
