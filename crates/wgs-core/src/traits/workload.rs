//! Throughput workload trait

use async_trait::async_trait;

use crate::config::WorkloadConfig;
use crate::error::WorkloadError;

/// Abstraction over the traffic generator
///
/// A successful `start` only means the workload was launched; it may still
/// fail on its own later without the caller noticing.
#[async_trait]
pub trait WorkloadService: Send + Sync {
    /// Launch a workload run
    async fn start(&self, config: &WorkloadConfig) -> Result<(), WorkloadError>;

    /// Stop the current run
    async fn stop(&self) -> Result<(), WorkloadError>;
}
