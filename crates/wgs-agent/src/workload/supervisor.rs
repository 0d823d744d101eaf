//! Periodic restart supervision of the throughput workload
//!
//! Gated only on link-up: tunnel state never affects this task. Once the link
//! is up the workload is started and then stopped and restarted on a fixed
//! cadence for as long as the process lives.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use wgs_core::config::{Cadence, WorkloadConfig};
use wgs_core::traits::WorkloadService;

use crate::signal::{SignalError, SignalWatcher, Signals};

/// Why the supervisor returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadExit {
    /// Cancellation was requested after `restarts` restarts
    Cancelled { restarts: u64 },
    /// The signal board disappeared before link-up
    SignalBoardUnavailable,
}

/// Keeps the workload running on its restart cadence
pub struct WorkloadSupervisor {
    service: Arc<dyn WorkloadService>,
    config: WorkloadConfig,
    cadence: Cadence,
}

impl WorkloadSupervisor {
    /// Cadence parameters are fixed here and never change afterwards
    pub fn new(service: Arc<dyn WorkloadService>, config: WorkloadConfig) -> Self {
        let cadence = config.cadence();
        Self {
            service,
            config,
            cadence,
        }
    }

    /// Run on its own task
    pub fn spawn(self, watcher: SignalWatcher, cancel: CancellationToken) -> JoinHandle<WorkloadExit> {
        tokio::spawn(self.run(watcher, cancel))
    }

    /// Wait for link-up, start the workload, then restart it every
    /// `run + reset_pad` (+ drain pause) until cancelled
    pub async fn run(self, mut watcher: SignalWatcher, cancel: CancellationToken) -> WorkloadExit {
        let waited = tokio::select! {
            _ = cancel.cancelled() => return WorkloadExit::Cancelled { restarts: 0 },
            waited = watcher.wait_any(Signals::LINK_UP, None) => waited,
        };
        if let Err(SignalError::Closed) = waited {
            tracing::error!("Signal board not initialized, workload supervisor stopping");
            return WorkloadExit::SignalBoardUnavailable;
        }

        tracing::info!(
            "Link up, starting {:?} workload (restart every {:?})",
            self.config.role,
            self.cadence.hold()
        );
        self.start_workload().await;

        let mut restarts = 0u64;
        loop {
            if !pause(self.cadence.hold(), &cancel).await {
                break;
            }
            tracing::info!("Stopping workload");
            self.stop_workload().await;

            if !pause(self.cadence.drain, &cancel).await {
                return WorkloadExit::Cancelled { restarts };
            }
            tracing::info!("Starting workload");
            self.start_workload().await;
            restarts += 1;
        }

        self.stop_workload().await;
        WorkloadExit::Cancelled { restarts }
    }

    async fn start_workload(&self) {
        if let Err(e) = self.service.start(&self.config).await {
            tracing::error!("Workload start failed: {}", e);
        }
    }

    async fn stop_workload(&self) {
        if let Err(e) = self.service.stop().await {
            tracing::warn!("Workload stop failed: {}", e);
        }
    }
}

/// Sleep unless cancelled first; returns false on cancellation
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
