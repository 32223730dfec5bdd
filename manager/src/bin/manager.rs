//! The `onvm-manager` binary: boots a [`manager::Manager`], optionally
//! pre-admits NFs from a JSON manifest (the original's `-F <CONFIG_FILE.json>`
//! flag), then runs the dispatch+autoscale loop until interrupted.

use std::fs;
use std::thread;
use std::time::Duration;

use clap::Parser;
use log::{info, warn};

use manager::config::{Manifest, ManagerConfig};
use manager::Manager;
use onvm_proto::{AdmitRequest, CoreRequest};

/// NF lifecycle and autoscaling control plane.
#[derive(Parser, Debug)]
#[command(name = "onvm-manager", version, about)]
struct Args {
    /// Controller tick interval, in seconds.
    #[arg(long, default_value_t = ManagerConfig::default().tick_interval_secs)]
    tick_interval_secs: f64,

    /// NF table size (id 0 is reserved).
    #[arg(long, default_value_t = ManagerConfig::default().max_nfs)]
    max_nfs: u16,

    /// Service id upper bound.
    #[arg(long, default_value_t = ManagerConfig::default().max_services)]
    max_services: u16,

    /// Per-service live-instance capacity.
    #[arg(long, default_value_t = ManagerConfig::default().max_nfs_per_service)]
    max_nfs_per_service: usize,

    /// Per-parent fan-out cap.
    #[arg(long, default_value_t = ManagerConfig::default().max_child)]
    max_child: usize,

    /// Number of CPU cores tracked by the core allocator.
    #[arg(long, default_value_t = ManagerConfig::default().max_cores)]
    max_cores: u16,

    /// rx/tx ring capacity, in packet slots.
    #[arg(long, default_value_t = ManagerConfig::default().nf_queue_ringsize)]
    nf_queue_ringsize: usize,

    /// Per-NF control-message ring capacity.
    #[arg(long, default_value_t = ManagerConfig::default().nf_msg_queue_size)]
    nf_msg_queue_size: usize,

    /// Reassign an NF onto a neighboring core when a core goes empty.
    #[arg(long, default_value_t = ManagerConfig::default().shutdown_core_reassignment)]
    shutdown_core_reassignment: bool,

    /// Optional JSON manifest of NFs to pre-admit at boot.
    #[arg(short = 'F', long)]
    manifest: Option<std::path::PathBuf>,

    /// Exit after this many ticks instead of running forever (0 = forever).
    #[arg(long, default_value_t = 0)]
    max_ticks: u64,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = ManagerConfig {
        max_nfs: args.max_nfs,
        max_services: args.max_services,
        max_nfs_per_service: args.max_nfs_per_service,
        max_child: args.max_child,
        max_cores: args.max_cores,
        nf_queue_ringsize: args.nf_queue_ringsize,
        nf_msg_queue_size: args.nf_msg_queue_size,
        tick_interval_secs: args.tick_interval_secs,
        shutdown_core_reassignment: args.shutdown_core_reassignment,
        ..ManagerConfig::default()
    };

    let mut mgr = Manager::new(config);
    info!("onvm-manager booted: max_nfs={} max_services={}", mgr.config().max_nfs, mgr.config().max_services);

    if let Some(path) = &args.manifest {
        match fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<Manifest>(&text) {
                Ok(manifest) => preadmit(&mut mgr, manifest),
                Err(e) => warn!("failed to parse manifest {}: {e}", path.display()),
            },
            Err(e) => warn!("failed to read manifest {}: {e}", path.display()),
        }
    }

    let tick_interval = Duration::from_secs_f64(mgr.config().tick_interval_secs.max(0.001));
    let mut ticks = 0u64;
    loop {
        mgr.drain_inbox();
        let report = mgr.tick(mgr.config().tick_interval_secs);
        if report.scales > 0 || report.sleeps > 0 || report.wakes > 0 || report.permanent_stops > 0 {
            info!("tick {ticks}: {report:?}");
        }
        ticks += 1;
        if args.max_ticks != 0 && ticks >= args.max_ticks {
            break;
        }
        thread::sleep(tick_interval);
    }
}

fn preadmit(mgr: &mut Manager, manifest: Manifest) {
    for entry in manifest.nfs {
        let req = AdmitRequest {
            service_id: entry.service_id,
            handle_rate: entry.handle_rate,
            tag: entry.tag.clone(),
            instance_id: entry.instance_id,
            core_request: if entry.dedicated_core.is_some() {
                CoreRequest::Dedicated
            } else {
                CoreRequest::Shared
            },
            core_hint: entry.dedicated_core,
            time_to_live: None,
            pkt_limit: None,
            parent_id: None,
        };
        match mgr.admit(req) {
            Ok(handle) => info!("pre-admitted {} as instance {}", entry.tag, handle.instance_id),
            Err(e) => warn!("failed to pre-admit {}: {e}", entry.tag),
        }
    }
}
