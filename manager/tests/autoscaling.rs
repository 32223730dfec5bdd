//! Autoscaling decision-loop scenarios from `spec.md` §8.

use manager::{Manager, ManagerConfig};
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

fn admit_ready(mgr: &mut Manager, service_id: u16, handle_rate: u32, tag: &str) -> u16 {
    let id = mgr.admit(req(service_id, handle_rate, tag)).unwrap().instance_id;
    mgr.ready(id).unwrap();
    id
}

/// S2. Threshold scale-up: one parent, pps above H, no children yet.
#[test]
fn threshold_scale_up_sends_one_scale() {
    let mut mgr = Manager::new(ManagerConfig::default());
    let parent = admit_ready(&mut mgr, 5, 1_000_000, "parent");

    mgr.registry().get(parent).unwrap().counters.record_rx(1_500_000);
    let report = mgr.tick(1.0);

    assert_eq!(report.scales, 1);
    assert_eq!(report.wakes, 0);
    assert!(mgr.registry().get(parent).unwrap().wait_flag);
}

/// §4.7: `wait_flag` only serializes the scale-up it was set for. Once the
/// spawned child actually admits, the parent is free to scale again on a
/// later tick instead of being stuck deaf to further SCALE/sleep decisions.
#[test]
fn wait_flag_clears_once_pending_child_admits() {
    let mut mgr = Manager::new(ManagerConfig::default());
    let parent = admit_ready(&mut mgr, 5, 1_000_000, "parent");

    mgr.registry().get(parent).unwrap().counters.record_rx(1_500_000);
    let report = mgr.tick(1.0);
    assert_eq!(report.scales, 1);
    assert!(mgr.registry().get(parent).unwrap().wait_flag);

    let mut child_req = req(5, 1_000_000, "child");
    child_req.parent_id = Some(parent);
    let child = mgr.admit(child_req).unwrap().instance_id;
    mgr.ready(child).unwrap();
    assert!(!mgr.registry().get(parent).unwrap().wait_flag);

    mgr.registry().get(parent).unwrap().counters.record_rx(3_000_000);
    let report = mgr.tick(1.0);
    assert_eq!(report.scales, 1);
}

/// S3. Wake preferred over spawn when a sleeper is available.
#[test]
fn wake_preferred_over_spawn() {
    let mut mgr = Manager::new(ManagerConfig::default());
    let parent = admit_ready(&mut mgr, 5, 1_000_000, "parent");
    let child = admit_ready(&mut mgr, 5, 1_000_000, "child");
    mgr.sleep(child).unwrap();

    mgr.registry().get(parent).unwrap().counters.record_rx(1_500_000);
    let report = mgr.tick(1.0);

    assert_eq!(report.wakes, 1);
    assert_eq!(report.scales, 0);
    assert_eq!(mgr.services().list(5), &[parent, child]);
}

/// S4. Grace period: nine quiet ticks after a scale-up hold wait_counter
/// above zero and take no sleep action; the tenth sleeps the last entry.
#[test]
fn grace_period_delays_sleep_by_ten_ticks() {
    let mut mgr = Manager::new(ManagerConfig::default());
    let parent = admit_ready(&mut mgr, 5, 1_000_000, "parent");
    let second = admit_ready(&mut mgr, 5, 1_000_000, "second");

    // Force a scale-up tick first so wait_counter is seeded to 10.
    mgr.registry().get(parent).unwrap().counters.record_rx(2_500_000);
    let report = mgr.tick(1.0);
    assert_eq!(report.scales, 1);
    assert_eq!(mgr.registry().get(parent).unwrap().wait_counter, 10);

    // Ten quiet ticks: rx stays flat (well below L). Each tick with
    // wait_counter > 0 only decrements it and takes no further action, so
    // the last entry is not slept until the counter has actually reached 0.
    for _ in 0..10 {
        let r = mgr.tick(1.0);
        assert_eq!(r.sleeps, 0);
    }
    assert_eq!(mgr.registry().get(parent).unwrap().wait_counter, 0);
    assert_eq!(mgr.services().count(5), 2);

    // The next tick finds wait_counter already at 0: the last entry sleeps.
    let report = mgr.tick(1.0);
    assert_eq!(report.sleeps, 1);
    assert_eq!(mgr.services().list(5), &[parent]);
    assert!(mgr.registry().get(second).unwrap().sleep_flag);
}

/// S5. Permanent reclamation: a sleeper idle for 10 ticks at the head of
/// the parent's sleep stack gets stopped; the parent's sleep list shrinks.
#[test]
fn permanent_reclamation_after_ten_idle_ticks() {
    let mut mgr = Manager::new(ManagerConfig::default());
    let parent = admit_ready(&mut mgr, 1, 1_000, "parent");
    let sleeper = admit_ready(&mut mgr, 1, 1_000, "sleeper");
    mgr.sleep(sleeper).unwrap();
    assert_eq!(mgr.registry().get(parent).unwrap().sleep_instance, vec![sleeper]);

    // sleeper produces no rx while asleep; parent's rate is irrelevant here
    // (service_pps accounting only drives scale/sleep, not reclamation).
    let mut last_report = manager::TickReport::default();
    for _ in 0..10 {
        last_report = mgr.tick(1.0);
    }

    assert_eq!(last_report.permanent_stops, 1);
    assert!(mgr.registry().get(sleeper).unwrap().status == manager::NfStatus::Empty);
    assert!(mgr.registry().get(parent).unwrap().sleep_instance.is_empty());
}

/// Invariant 7: hysteresis. Constant in-band traffic between L and H
/// produces zero scale/sleep actions over many ticks.
#[test]
fn hysteresis_band_is_quiet() {
    let mut mgr = Manager::new(ManagerConfig::default());
    let parent = admit_ready(&mut mgr, 5, 1_000_000, "parent");
    let second = admit_ready(&mut mgr, 5, 1_000_000, "second");
    // k=2: H = 2_000_000, L = 1_000_000. Keep pps comfortably inside.
    let per_tick_rx = 1_500_000u64;

    for _ in 0..100 {
        mgr.registry().get(parent).unwrap().counters.record_rx(per_tick_rx);
        mgr.registry().get(second).unwrap().counters.record_rx(0);
        let report = mgr.tick(1.0);
        assert_eq!(report.scales, 0);
        assert_eq!(report.sleeps, 0);
        assert_eq!(report.wakes, 0);
    }
}

/// §3: an NF admitted with a `pkt_limit` gets a cooperative STOP once its
/// rx counter reaches that bound, via the same tick that drives scaling.
#[test]
fn pkt_limit_expiry_sends_stop_and_counts_expiration() {
    let mut mgr = Manager::new(ManagerConfig::default());
    let mut limited_req = req(9, 1_000, "capped");
    limited_req.pkt_limit = Some(3);
    let mut handle = mgr.admit(limited_req).unwrap();
    let id = handle.instance_id;
    mgr.ready(id).unwrap();

    mgr.registry().get(id).unwrap().counters.record_rx(2);
    let report = mgr.tick(1.0);
    assert_eq!(report.expirations, 0);
    assert!(handle.msg.try_dequeue().is_none());

    mgr.registry().get(id).unwrap().counters.record_rx(1);
    let report = mgr.tick(1.0);
    assert_eq!(report.expirations, 1);
    assert!(matches!(
        handle.msg.try_dequeue(),
        Some(onvm_proto::Message::Stop { instance_id }) if instance_id == id
    ));
}

/// Invariant 9: wake-before-spawn even across repeated ticks with multiple
/// sleepers queued. SCALE never fires while `sleep_count > 0`.
#[test]
fn wake_before_spawn_drains_sleep_stack_first() {
    let mut mgr = Manager::new(ManagerConfig::default());
    let parent = admit_ready(&mut mgr, 5, 1_000_000, "parent");
    let a = admit_ready(&mut mgr, 5, 1_000_000, "a");
    let b = admit_ready(&mut mgr, 5, 1_000_000, "b");
    mgr.sleep(a).unwrap();
    mgr.sleep(b).unwrap();
    assert_eq!(mgr.registry().get(parent).unwrap().sleep_instance, vec![a, b]);

    mgr.registry().get(parent).unwrap().counters.record_rx(5_000_000);
    let first = mgr.tick(1.0);
    assert_eq!(first.wakes, 1);
    assert_eq!(first.scales, 0);
    // invariant 10: wake pops the most recently slept (b), not a.
    assert_eq!(mgr.registry().get(parent).unwrap().sleep_instance, vec![a]);

    mgr.registry().get(parent).unwrap().counters.record_rx(5_000_000);
    let second_tick = mgr.tick(1.0);
    assert_eq!(second_tick.wakes, 1);
    assert_eq!(second_tick.scales, 0);
    assert!(mgr.registry().get(parent).unwrap().sleep_instance.is_empty());
}
