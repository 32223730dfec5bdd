//! Client library for Network Functions built on the onvm control plane.
//!
//! An NF only ever holds two things from this crate: a [`LocalCtx`] (its
//! own scratch state, never shared) and an [`onvm_proto::NfHandle`] (its
//! capability bundle, handed back once by `init`). Neither exposes
//! anything the controller's registry, service map, or core table own.

use std::sync::mpsc;
use std::time::Duration;

use log::{info, warn};

use onvm_proto::{
    AdmitRequest, FtRequest, LpmRequest, ManagerError, Message, NfHandle, PacketAction,
    PacketBuf, PacketMeta, Producer,
};

/// Burst size used by the default data loop and by `stop`'s drain. The
/// SDK has no access to the controller's configured ring sizes, so it
/// picks a fixed, conservative batch instead of depending on `manager`.
const DEFAULT_BURST: usize = 32;

/// Per-NF local state. Opaque to the controller; this crate only
/// allocates and frees it.
#[derive(Debug, Default)]
pub struct LocalCtx {
    pub tag: String,
    pub argv_offset: usize,
}

pub fn init_local_ctx() -> LocalCtx {
    LocalCtx::default()
}

/// Send `NF_STARTING` over `inbox` and block until the controller replies,
/// returning the capability handle on success.
///
/// `argv` is the NF's full argument vector; everything after the second
/// `--` separator is the NF's own flags, and `arg_offset` in the returned
/// tuple is where they start (`spec.md` §6's platform/NF argv-splitting
/// convention). `init` itself does not parse past that point.
pub fn init(
    argv: &[String],
    ctx: &mut LocalCtx,
    inbox: Producer<Message>,
    request: AdmitRequest,
) -> Result<(NfHandle, usize), ManagerError> {
    ctx.tag = request.tag.clone();
    ctx.argv_offset = argv
        .iter()
        .enumerate()
        .filter(|(_, a)| a.as_str() == "--")
        .nth(1)
        .map(|(i, _)| i + 1)
        .unwrap_or(argv.len());

    let (reply_tx, reply_rx) = mpsc::channel();
    inbox
        .try_enqueue(Message::NfStarting {
            request,
            reply: reply_tx,
        })
        .map_err(|_| ManagerError::RingFull)?;

    let handle = reply_rx.recv().map_err(|_| ManagerError::RingFull)??;
    info!("{} admitted as instance {}", ctx.tag, handle.instance_id);
    Ok((handle, ctx.argv_offset))
}

/// Send `NF_READY`.
pub fn nf_ready(handle: &NfHandle) {
    let _ = handle.inbox.try_enqueue(Message::NfReady {
        instance_id: handle.instance_id,
    });
}

/// Send `NF_STOPPING`, after draining and returning whatever packets were
/// still sitting in `rx`. This NF is the only thing that can, since `rx`
/// is single-consumer (see `onvm_proto::ring`).
pub fn stop(ctx: &LocalCtx, handle: &mut NfHandle) {
    loop {
        let batch = handle.rx.dequeue_burst(DEFAULT_BURST);
        if batch.is_empty() {
            break;
        }
        for (buf, _meta) in batch {
            let _ = handle.packet_return.try_enqueue(buf);
        }
    }
    let _ = handle.inbox.try_enqueue(Message::NfStopping {
        instance_id: handle.instance_id,
    });
    info!("{} stopped", ctx.tag);
}

/// Enqueue a packet onto `tx`, per its metadata's action. `Drop` returns
/// the buffer to the pool instead of forwarding it.
pub fn return_pkt(handle: &NfHandle, pkt: PacketBuf, meta: PacketMeta) {
    match meta.action {
        PacketAction::Drop => {
            let _ = handle.packet_return.try_enqueue(pkt);
        }
        PacketAction::ToNf(_) | PacketAction::Out(_) | PacketAction::Parallel(_) => {
            if handle.tx.try_enqueue((pkt, meta)).is_err() {
                warn!("{}: tx ring full, dropping packet", handle.instance_id);
            }
        }
    }
}

/// The default data loop: repeatedly drain `rx` in bursts, run `handler`
/// over each packet, and enqueue the result via [`return_pkt`]. Exits as
/// soon as a `Stop` message is observed on `handle.msg`.
pub fn run(
    handle: &mut NfHandle,
    ctx: &mut LocalCtx,
    mut handler: impl FnMut(&PacketBuf, &mut PacketMeta, &mut LocalCtx),
) {
    loop {
        if let Some(Message::Stop { .. }) = handle.msg.try_dequeue() {
            info!("{}: received STOP, exiting data loop", ctx.tag);
            return;
        }
        let batch = handle.rx.dequeue_burst(DEFAULT_BURST);
        if batch.is_empty() {
            std::thread::sleep(Duration::from_micros(100));
            continue;
        }
        for (pkt, mut meta) in batch {
            handler(&pkt, &mut meta, ctx);
            return_pkt(handle, pkt, meta);
        }
    }
}

/// Send an NF-to-NF message, relayed by the dispatcher onto `dest_id`'s msg
/// ring (`send_msg(dest_id, type, data)` in `spec.md` §6). Fire-and-forget:
/// the status returned is only whether the inbox accepted the relay
/// request, not whether `dest_id` read it.
pub fn send_msg(handle: &NfHandle, dest_id: u16, kind: u8, data: Vec<u8>) -> Result<(), ManagerError> {
    handle
        .inbox
        .try_enqueue(Message::Forward { dest_id, kind, data })
        .map_err(|_| ManagerError::RingFull)
}

/// Request an LPM table, blocking for the controller's reply
/// (`REQUEST_LPM`).
pub fn request_lpm(handle: &NfHandle, max_rules: u32) -> Result<(), ManagerError> {
    let (reply_tx, reply_rx) = mpsc::channel();
    handle
        .inbox
        .try_enqueue(Message::RequestLpm {
            request: LpmRequest { max_rules },
            reply: reply_tx,
        })
        .map_err(|_| ManagerError::RingFull)?;
    reply_rx.recv().map_err(|_| ManagerError::RingFull)?
}

/// Request a flow table, blocking for the controller's reply (`REQUEST_FT`).
pub fn request_ft(handle: &NfHandle, max_flows: u32) -> Result<(), ManagerError> {
    let (reply_tx, reply_rx) = mpsc::channel();
    handle
        .inbox
        .try_enqueue(Message::RequestFt {
            request: FtRequest { max_flows },
            reply: reply_tx,
        })
        .map_err(|_| ManagerError::RingFull)?;
    reply_rx.recv().map_err(|_| ManagerError::RingFull)?
}

/// Advanced mode: bypass [`run`] and poll for control messages directly,
/// used by NFs that drive their own burst dequeue/dispatch/tx-flush loop
/// (e.g. a parallel dispatcher staging packets to several destinations at
/// once via `PacketAction::Parallel`).
pub fn poll_stop(handle: &mut NfHandle) -> bool {
    matches!(handle.msg.try_dequeue(), Some(Message::Stop { .. }))
}
