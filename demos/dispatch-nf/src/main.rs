//! Advanced-mode NF: drives its own burst loop instead of `nf_sdk::run`,
//! and marks every packet for parallel delivery to two destinations (ports
//! 2 and 3) rather than a single next hop. Demonstrates `PacketAction::Parallel`
//! plus `PacketFlags` together, and `nf_sdk::poll_stop` for NFs that can't
//! fit the handler-closure shape `run()` assumes.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use log::info;

use manager::{Manager, ManagerConfig};
use onvm_proto::{AdmitRequest, CoreRequest, PacketAction, PacketFlags, PacketMeta};

/// Destinations 2 and 3, combined into the bitmask `PacketAction::Parallel`
/// expects: one bit per destination id.
const PARALLEL_DESTS: u64 = (1 << 2) | (1 << 3);

#[derive(Parser, Debug)]
#[command(name = "dispatch-nf")]
struct Args {
    /// Packets between each status print.
    #[arg(short = 'p', long, default_value_t = 1000)]
    print_delay: u64,
}

fn dispatch_packet_meta(meta: &mut PacketMeta) {
    meta.flags.insert(PacketFlags::PAYLOAD_READ | PacketFlags::PAYLOAD_WRITE);
    meta.action = PacketAction::Parallel(PARALLEL_DESTS);
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut mgr = Manager::new(ManagerConfig::default());
    let inbox = mgr.inbox();
    let (id_tx, id_rx) = mpsc::channel();

    let print_delay = args.print_delay;
    let worker = thread::spawn(move || {
        let req = AdmitRequest {
            service_id: 2,
            handle_rate: 10_000_000,
            tag: "dispatch-nf".to_string(),
            instance_id: None,
            core_request: CoreRequest::Shared,
            core_hint: None,
            time_to_live: None,
            pkt_limit: None,
            parent_id: None,
        };

        let mut ctx = nf_sdk::init_local_ctx();
        let argv: Vec<String> = std::env::args().collect();
        let (mut handle, _arg_offset) =
            nf_sdk::init(&argv, &mut ctx, inbox, req).expect("dispatch-nf: admission failed");
        nf_sdk::nf_ready(&handle);
        id_tx.send(handle.instance_id).expect("main thread gone");

        let mut processed: u64 = 0;
        loop {
            if nf_sdk::poll_stop(&mut handle) {
                info!("dispatch-nf: received STOP, exiting");
                break;
            }
            let batch = handle.rx.dequeue_burst(32);
            if batch.is_empty() {
                thread::sleep(Duration::from_micros(100));
                continue;
            }
            for (pkt, mut meta) in batch {
                dispatch_packet_meta(&mut meta);
                nf_sdk::return_pkt(&handle, pkt, meta);
                processed += 1;
                if processed % print_delay == 0 {
                    info!("dispatch-nf: processed {processed} packets");
                }
            }
        }
        nf_sdk::stop(&ctx, &mut handle);
    });

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
    worker.join().expect("dispatch-nf worker panicked");
    mgr.drain_inbox();
}
