//! wgs-agent: link, tunnel and workload supervision
//!
//! The agent brings a station link up with bounded retries, starts a secure
//! tunnel to a single peer once the link has an address, waits for the peer
//! to answer, and independently keeps a throughput workload cycling on a
//! fixed cadence. Fatal boot failures are reported to the caller instead of
//! terminating the process.

pub mod host;
pub mod link;
pub mod sequencer;
pub mod signal;
pub mod tunnel;
pub mod workload;

pub use sequencer::{BootError, BootOutcome, Collaborators, RunningSystem, Sequencer};
pub use signal::{SignalBoard, SignalError, SignalWatcher, Signals};
