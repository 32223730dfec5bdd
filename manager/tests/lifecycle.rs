//! Admission/stop scenarios from `spec.md` §8, driven entirely through the
//! public `Manager` surface (this file is a separate crate from `manager`'s
//! lib, so it only ever sees what `dispatch.rs` exposes).

use manager::{Manager, ManagerConfig, NfStatus};
use onvm_proto::{AdmitRequest, CoreRequest};

fn req(service_id: u16, handle_rate: u32, tag: &str) -> AdmitRequest {
    AdmitRequest {
        service_id,
        handle_rate,
        tag: tag.to_string(),
        instance_id: None,
        core_request: CoreRequest::Shared,
        core_hint: None,
        time_to_live: None,
        pkt_limit: None,
        parent_id: None,
    }
}

/// S1. Admit/stop roundtrip.
#[test]
fn admit_stop_roundtrip() {
    let mut mgr = Manager::new(ManagerConfig::default());

    let handle = mgr.admit(req(5, 1_000_000, "s1")).unwrap();
    let id = handle.instance_id;
    assert_eq!(id, 1);
    mgr.ready(id).unwrap();

    assert_eq!(mgr.registry().get(id).unwrap().status, NfStatus::Running);
    assert_eq!(mgr.services().count(5), 1);
    assert_eq!(mgr.services().list(5), &[1]);

    mgr.stop(id).unwrap();
    assert_eq!(mgr.registry().get(id).unwrap().status, NfStatus::Empty);
    assert_eq!(mgr.services().count(5), 0);
    assert_eq!(mgr.num_nfs(), 0);
}

/// Invariant 8: idempotent stop.
#[test]
fn stop_is_idempotent() {
    let mut mgr = Manager::new(ManagerConfig::default());
    let id = mgr.admit(req(1, 100, "idem")).unwrap().instance_id;
    mgr.ready(id).unwrap();

    mgr.stop(id).unwrap();
    mgr.stop(id).unwrap(); // second stop on an already-free slot: no-op

    assert_eq!(mgr.registry().get(id).unwrap().status, NfStatus::Empty);
    assert_eq!(mgr.num_nfs(), 0);
}

/// S6. Id rotation: fill {1,2,3} out of a 4-slot table, free 2, the next
/// admit reuses the hole instead of wrapping to 4 (which doesn't even
/// exist in this table).
#[test]
fn id_rotation_reuses_freed_hole() {
    let mut config = ManagerConfig::default();
    config.max_nfs = 4;
    let mut mgr = Manager::new(config);

    let a = mgr.admit(req(0, 1, "a")).unwrap().instance_id;
    let b = mgr.admit(req(0, 1, "b")).unwrap().instance_id;
    let c = mgr.admit(req(0, 1, "c")).unwrap().instance_id;
    assert_eq!((a, b, c), (1, 2, 3));

    mgr.stop(b).unwrap();
    let reused = mgr.admit(req(0, 1, "d")).unwrap().instance_id;
    assert_eq!(reused, 2);
}

/// Invariant 5 / S8-adjacent: a parent may not be stopped while it still
/// has live children.
#[test]
fn parent_stop_rejected_with_live_children() {
    let mut mgr = Manager::new(ManagerConfig::default());
    let parent_id = mgr.admit(req(3, 1_000, "parent")).unwrap().instance_id;
    mgr.ready(parent_id).unwrap();

    let mut child_req = req(3, 1_000, "child");
    child_req.parent_id = Some(parent_id);
    let child_id = mgr.admit(child_req).unwrap().instance_id;
    mgr.ready(child_id).unwrap();

    assert_eq!(mgr.stop(parent_id), Err(onvm_proto::ManagerError::InvalidTransition));

    mgr.stop(child_id).unwrap();
    mgr.stop(parent_id).unwrap(); // now permitted: children_cnt reached 0
}

/// Invariant 6 (controller half): `stop()` drains whatever the NF left
/// sitting in `tx`, the ring whose consumer the controller actually
/// holds, returning every buffer to the mempool. (The `rx` half of this
/// invariant is the NF's own responsibility, covered by `nf_sdk`'s tests:
/// `rx`'s consumer lives inside the `NfHandle`, not the controller.)
#[test]
fn stop_drains_tx_and_frees_buffers() {
    let mut mgr = Manager::new(ManagerConfig::default());
    let free_before = mgr.packet_pool_free_count();

    let mut handle = mgr.admit(req(2, 1_000, "drain")).unwrap();
    let id = handle.instance_id;
    mgr.ready(id).unwrap();

    // Stand in for the NF having produced some outgoing traffic before
    // teardown: push real pool-backed buffers (via inject_packet's rx path,
    // then hand them straight to tx as if the NF forwarded them unchanged).
    for _ in 0..5 {
        mgr.inject_packet(id, onvm_proto::PacketMeta::new()).unwrap();
    }
    let staged = handle.rx.dequeue_burst(5);
    assert_eq!(staged.len(), 5);
    for (buf, meta) in staged {
        handle.tx.try_enqueue((buf, meta)).unwrap();
    }
    assert_eq!(mgr.packet_pool_free_count(), free_before - 5);

    mgr.stop(id).unwrap();
    assert_eq!(mgr.packet_pool_free_count(), free_before);
}

/// §6: `send_msg`'s relay path. An NF has no direct handle to another NF's
/// msg ring, so the dispatcher relays `Message::Forward` from the inbox
/// onto the named `dest_id`'s ring verbatim.
#[test]
fn forward_relays_to_named_destination() {
    let mut mgr = Manager::new(ManagerConfig::default());
    let sender = mgr.admit(req(1, 100, "sender")).unwrap();
    mgr.ready(sender.instance_id).unwrap();
    let mut receiver = mgr.admit(req(1, 100, "receiver")).unwrap();
    mgr.ready(receiver.instance_id).unwrap();

    sender
        .inbox
        .try_enqueue(onvm_proto::Message::Forward {
            dest_id: receiver.instance_id,
            kind: 7,
            data: vec![1, 2, 3],
        })
        .unwrap();
    mgr.drain_inbox();

    match receiver.msg.try_dequeue() {
        Some(onvm_proto::Message::Forward { dest_id, kind, data }) => {
            assert_eq!(dest_id, receiver.instance_id);
            assert_eq!(kind, 7);
            assert_eq!(data, vec![1, 2, 3]);
        }
        Some(other) => panic!("expected a relayed Forward, got {}", other.kind()),
        None => panic!("expected a relayed Forward, got nothing"),
    }
}

/// §4.5 step 9: stopping the lone NF on a core reassigns the lowest-id
/// instance from the most-loaded other core onto it, via `CHANGE_CORE`.
#[test]
fn core_reassignment_moves_lowest_id_instance_onto_freed_core() {
    let mut config = ManagerConfig::default();
    config.max_cores = 2;
    config.shutdown_core_reassignment = true;
    let mut mgr = Manager::new(config);

    let mut req_a = req(1, 100, "a");
    req_a.core_hint = Some(0);
    let mut handle_a = mgr.admit(req_a).unwrap();
    mgr.ready(handle_a.instance_id).unwrap();

    let mut req_b = req(1, 100, "b");
    req_b.core_hint = Some(0);
    let mut handle_b = mgr.admit(req_b).unwrap();
    mgr.ready(handle_b.instance_id).unwrap();

    let mut req_c = req(1, 100, "c");
    req_c.core_hint = Some(1);
    let handle_c = mgr.admit(req_c).unwrap();
    mgr.ready(handle_c.instance_id).unwrap();

    mgr.stop(handle_c.instance_id).unwrap();

    let lowest = handle_a.instance_id.min(handle_b.instance_id);
    assert_eq!(mgr.registry().get(lowest).unwrap().core_id, Some(1));

    let moved = if lowest == handle_a.instance_id { &mut handle_a } else { &mut handle_b };
    match moved.msg.try_dequeue() {
        Some(onvm_proto::Message::ChangeCore { instance_id, core_id }) => {
            assert_eq!(instance_id, lowest);
            assert_eq!(core_id, 1);
        }
        Some(other) => panic!("expected CHANGE_CORE, got {}", other.kind()),
        None => panic!("expected CHANGE_CORE, got nothing"),
    }
}

/// Invariant 2/3: service-map contiguity and `num_nfs` bookkeeping across
/// several concurrent live NFs on the same service.
#[test]
fn service_map_stays_contiguous_across_removals() {
    let mut mgr = Manager::new(ManagerConfig::default());
    let ids: Vec<u16> = (0..4)
        .map(|i| {
            let id = mgr.admit(req(7, 1_000, &format!("n{i}"))).unwrap().instance_id;
            mgr.ready(id).unwrap();
            id
        })
        .collect();

    assert_eq!(mgr.services().list(7), ids.as_slice());
    assert_eq!(mgr.num_nfs(), 4);

    mgr.stop(ids[1]).unwrap();
    let remaining: Vec<u16> = mgr.services().list(7).to_vec();
    assert_eq!(remaining, vec![ids[0], ids[2], ids[3]]);
    assert_eq!(mgr.services().count(7), 3);
    assert_eq!(mgr.num_nfs(), 3);
}
