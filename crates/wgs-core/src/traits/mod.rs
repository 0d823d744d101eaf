//! Collaborator trait definitions
//!
//! Everything the supervisor drives but does not implement itself: the
//! station driver, the tunnel packet engine, the throughput generator, the
//! clock source, and the persistent settings store.

mod link;
mod platform;
mod tunnel;
mod workload;

pub use link::{LinkDriver, LinkEventSender};
pub use platform::{SettingsStore, TimeSource};
pub use tunnel::TunnelService;
pub use workload::WorkloadService;
