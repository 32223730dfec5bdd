//! The control-message dispatcher (C6).
//!
//! Drains the shared inbox in one bulk dequeue per tick and routes each
//! message by type, in the order dequeued. No reordering, no blocking.
//! Every reply channel gets exactly one send, success or failure, so a
//! caller blocked on `Receiver::recv()` is never left hanging.

use log::{debug, warn};

use onvm_proto::Message;

use crate::lifecycle::LifecycleCtx;
use crate::manager::{Manager, TableHandle};

impl Manager {
    /// Drain up to one bulk dequeue's worth of messages (`MAX_NFS`, per
    /// `spec.md` §4.6) and dispatch each. Returns how many were processed.
    pub fn drain_inbox(&mut self) -> usize {
        let batch = self.inbox_rx.dequeue_burst(self.config.max_nfs as usize);
        let n = batch.len();
        for message in batch {
            self.dispatch_one(message);
        }
        n
    }

    fn dispatch_one(&mut self, message: Message) {
        debug!("dispatch: {}", message.kind());
        match message {
            Message::RequestLpm { request, reply } => {
                self.lpm_tables.push(TableHandle {
                    capacity: request.max_rules,
                });
                let _ = reply.send(Ok(()));
            }
            Message::RequestFt { request, reply } => {
                self.ft_tables.push(TableHandle {
                    capacity: request.max_flows,
                });
                let _ = reply.send(Ok(()));
            }
            Message::NfStarting { request, reply } => {
                let inbox = self.inbox_tx.clone();
                let mut ctx = self.lifecycle_ctx();
                let outcome = ctx.admit(request, inbox);
                match outcome {
                    Ok(outcome) => {
                        let _ = reply.send(Ok(outcome.handle));
                    }
                    Err(e) => {
                        warn!("admit failed: {e}");
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Message::NfReady { instance_id } => {
                let mut ctx = self.lifecycle_ctx();
                if let Err(e) = ctx.ready(instance_id) {
                    warn!("ready({instance_id}) failed: {e}");
                }
            }
            Message::NfStopping { instance_id } => {
                let mut ctx = self.lifecycle_ctx();
                if let Err(e) = ctx.stop(instance_id) {
                    warn!("stop({instance_id}) failed: {e}");
                }
            }
            Message::Forward { dest_id, kind, data } => {
                if let Err(e) = self.send_to(dest_id, Message::Forward { dest_id, kind, data }) {
                    warn!("forward to {dest_id} failed: {e}");
                }
            }
            // Stop / Scale / ChangeCore are controller-to-NF messages;
            // they never arrive on the inbox (only an NF's own msg ring),
            // so seeing one here is a logic error upstream, not a crash.
            Message::Stop { .. } | Message::Scale { .. } | Message::ChangeCore { .. } => {
                warn!("dispatcher received a controller-to-NF message on the inbox: {}", message.kind());
            }
        }
    }

    pub(crate) fn lifecycle_ctx(&mut self) -> LifecycleCtx<'_> {
        LifecycleCtx {
            registry: &mut self.registry,
            services: &mut self.services,
            cores: &mut self.cores,
            packet_pool: &mut self.packet_pool,
            config: &self.config,
        }
    }

    /// Admit a new NF directly, bypassing the inbox. For boot manifests
    /// and test harnesses standing in for a real NF process.
    pub fn admit(
        &mut self,
        req: onvm_proto::AdmitRequest,
    ) -> Result<onvm_proto::NfHandle, onvm_proto::ManagerError> {
        let inbox = self.inbox_tx.clone();
        self.lifecycle_ctx().admit(req, inbox).map(|o| o.handle)
    }

    pub fn ready(&mut self, instance_id: u16) -> Result<(), onvm_proto::ManagerError> {
        self.lifecycle_ctx().ready(instance_id)
    }

    pub fn sleep(&mut self, instance_id: u16) -> Result<(), onvm_proto::ManagerError> {
        self.lifecycle_ctx().sleep(instance_id)
    }

    pub fn wake(&mut self, parent_id: u16) -> Result<u16, onvm_proto::ManagerError> {
        self.lifecycle_ctx().wake(parent_id)
    }

    pub fn stop(&mut self, instance_id: u16) -> Result<(), onvm_proto::ManagerError> {
        self.lifecycle_ctx().stop(instance_id)
    }

    /// Send a control message directly to instance `dest_id`'s msg ring
    /// (`send(dest_id, type, payload)` in `spec.md` §4.6).
    pub fn send_to(&self, dest_id: u16, message: Message) -> Result<(), onvm_proto::ManagerError> {
        let slot = self
            .registry
            .get(dest_id)
            .ok_or(onvm_proto::ManagerError::InvalidTransition)?;
        let rings = slot
            .rings
            .as_ref()
            .ok_or(onvm_proto::ManagerError::InvalidTransition)?;
        rings
            .msg_producer
            .try_enqueue(message)
            .map_err(|_| onvm_proto::ManagerError::RingFull)
    }
}
