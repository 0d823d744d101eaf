//! Throughput workload supervision

mod supervisor;

pub use supervisor::{WorkloadExit, WorkloadSupervisor};
