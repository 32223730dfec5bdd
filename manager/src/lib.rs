//! The NF lifecycle and autoscaling control plane.
//!
//! [`Manager`] is the single owned value holding every sub-table: the NF
//! registry (C3), the service map (C4), the core allocator (C2), and the
//! shared packet/message pools. Everything else in this crate is either a
//! method on `Manager` or a free function taking a borrowed slice of its
//! state; there are no free-standing globals.

pub mod autoscale;
pub mod config;
pub mod core_alloc;
pub mod dispatch;
pub mod lifecycle;
pub mod manager;
pub mod registry;
pub mod service_map;
pub mod supervision;

pub use autoscale::TickReport;
pub use config::ManagerConfig;
pub use manager::Manager;
pub use registry::NfStatus;
pub use supervision::{BackpressureHook, NoopBackpressure};
