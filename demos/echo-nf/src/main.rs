//! Smallest possible NF: everything that arrives on `rx` goes straight back
//! out port 0. Demonstrates `nf_sdk::init`/`nf_ready`/`run`/`stop` end to end
//! against an embedded `Manager`.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use manager::{Manager, ManagerConfig};
use onvm_proto::{AdmitRequest, CoreRequest, PacketAction, PacketMeta};

/// `nf_sdk::init` blocks on its reply channel until the controller's
/// `drain_inbox` processes `NF_STARTING`, which only happens if something
/// else is polling the inbox concurrently. So the NF runs on its own
/// thread from the start, and the controller loop lives on `main`,
/// handed the instance id back over a plain `mpsc` channel once admission
/// completes.
fn main() {
    env_logger::init();

    let mut mgr = Manager::new(ManagerConfig::default());
    let inbox = mgr.inbox();
    let (id_tx, id_rx) = mpsc::channel();

    let worker = thread::spawn(move || {
        let req = AdmitRequest {
            service_id: 1,
            handle_rate: 100_000,
            tag: "echo-nf".to_string(),
            instance_id: None,
            core_request: CoreRequest::Shared,
            core_hint: None,
            time_to_live: None,
            pkt_limit: None,
            parent_id: None,
        };

        let mut ctx = nf_sdk::init_local_ctx();
        let args: Vec<String> = std::env::args().collect();
        let (mut handle, _arg_offset) =
            nf_sdk::init(&args, &mut ctx, inbox, req).expect("echo-nf: admission failed");
        nf_sdk::nf_ready(&handle);
        id_tx.send(handle.instance_id).expect("main thread gone");

        nf_sdk::run(&mut handle, &mut ctx, |_pkt, meta, _ctx| {
            meta.action = PacketAction::Out(0);
        });
        nf_sdk::stop(&ctx, &mut handle);
    });

    // Drive the control plane until the worker reports its instance id,
    // i.e. until its NF_STARTING has actually been dispatched.
    let instance_id = loop {
        mgr.drain_inbox();
        if let Ok(id) = id_rx.try_recv() {
            break id;
        }
        thread::sleep(Duration::from_millis(1));
    };

    for _ in 0..5 {
        let _ = mgr.inject_packet(instance_id, PacketMeta::new());
        thread::sleep(Duration::from_millis(10));
        mgr.drain_inbox();
        mgr.tick(0.01);
    }

    mgr.send_to(instance_id, onvm_proto::Message::Stop { instance_id })
        .expect("send STOP");
    worker.join().expect("echo-nf worker panicked");
    mgr.drain_inbox(); // processes the NF_STOPPING this NF just sent
}
