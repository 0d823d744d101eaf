//! Boot sequencing
//!
//! Deterministic order: settings store, signal board, link, workload
//! supervisor, time sync, tunnel, peer liveness. Fatal failures are returned
//! unlogged as [`BootOutcome::Halted`]; reporting them and deciding what
//! happens next is up to the caller.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use wgs_core::config::SupervisorConfig;
use wgs_core::error::{LinkError, StoreError, TunnelError};
use wgs_core::settings::{init_with_recovery, StoreInit};
use wgs_core::time::{format_at_offset, format_utc};
use wgs_core::traits::{LinkDriver, SettingsStore, TimeSource, TunnelService, WorkloadService};
use wgs_core::LinkState;

use crate::link::{LinkSupervisor, LINK_EVENT_CHANNEL_CAPACITY};
use crate::signal::{SignalBoard, Signals};
use crate::tunnel::{PeerWaitOutcome, TunnelBootstrapper, TunnelSession};
use crate::workload::{WorkloadExit, WorkloadSupervisor};

/// Tick of the steady-state idle loop
const IDLE_TICK: Duration = Duration::from_secs(10);

/// Unrecoverable boot failures
#[derive(Debug, Error)]
pub enum BootError {
    /// The settings store could not be opened, even after an erase
    #[error("Settings store unusable: {0}")]
    Settings(#[from] StoreError),

    /// The link driver rejected configuration or failed to start
    #[error("Link driver failed: {0}")]
    Driver(#[from] LinkError),

    /// Association retries were exhausted
    #[error("Failed to connect to SSID {ssid} after {retries} retries")]
    LinkFailed { ssid: String, retries: u32 },

    /// Tunnel configuration or connect failure
    #[error("WireGuard setup failed: {0}")]
    Tunnel(#[from] TunnelError),

    /// The configured peer-wait bound elapsed
    #[error("Peer did not come up within {0:?}")]
    PeerTimeout(Duration),
}

/// External services the sequencer drives
pub struct Collaborators<T> {
    pub settings: Arc<dyn SettingsStore>,
    pub link: Arc<dyn LinkDriver>,
    pub tunnel: T,
    pub workload: Arc<dyn WorkloadService>,
    pub clock: Arc<dyn TimeSource>,
}

/// Everything that keeps running after a successful boot
pub struct RunningSystem<C> {
    /// The connected tunnel
    pub session: TunnelSession<C>,
    /// Board shared with the background tasks
    pub board: Arc<SignalBoard>,
    /// Link supervisor task (keeps handling link loss)
    pub link_task: JoinHandle<LinkState>,
    /// Workload supervisor task; the default wiring never joins it
    pub workload_task: JoinHandle<WorkloadExit>,
}

/// Terminal result of a boot attempt
pub enum BootOutcome<C> {
    /// Steady state reached: link up, tunnel connected, peer answering
    Running(RunningSystem<C>),
    /// A fatal failure; background tasks already launched keep running
    Halted(BootError),
    /// Cancelled before reaching steady state
    Cancelled,
}

/// Top-level boot control flow
pub struct Sequencer<T: TunnelService> {
    config: SupervisorConfig,
    settings: Arc<dyn SettingsStore>,
    link: Arc<dyn LinkDriver>,
    tunnel: TunnelBootstrapper<T>,
    workload: Arc<dyn WorkloadService>,
    clock: Arc<dyn TimeSource>,
}

impl<T: TunnelService> Sequencer<T> {
    pub fn new(config: SupervisorConfig, collaborators: Collaborators<T>) -> Self {
        Self {
            config,
            settings: collaborators.settings,
            link: collaborators.link,
            tunnel: TunnelBootstrapper::new(collaborators.tunnel),
            workload: collaborators.workload,
            clock: collaborators.clock,
        }
    }

    /// Run the boot sequence to steady state or to the first fatal failure
    pub async fn run(self, cancel: CancellationToken) -> BootOutcome<T::Context> {
        match init_with_recovery(self.settings.as_ref()) {
            Ok(StoreInit::Ready) => tracing::debug!("Settings store ready"),
            Ok(StoreInit::Recovered) => tracing::warn!("Settings store was erased and recreated"),
            Err(e) => return BootOutcome::Halted(BootError::Settings(e)),
        }

        let board = Arc::new(SignalBoard::new());
        tracing::info!("Signal board created");

        let link_task = match self.establish_link(&board, &cancel).await {
            Ok(Some(task)) => task,
            Ok(None) => return BootOutcome::Cancelled,
            Err(e) => return BootOutcome::Halted(e),
        };

        let workload_task = WorkloadSupervisor::new(
            Arc::clone(&self.workload),
            self.config.workload.clone(),
        )
        .spawn(board.subscribe(), cancel.child_token());

        if !self.sync_time(&cancel).await {
            return BootOutcome::Cancelled;
        }

        let session = match self.tunnel.bring_up(&self.config.tunnel).await {
            Ok(session) => session,
            Err(e) => return BootOutcome::Halted(BootError::Tunnel(e)),
        };

        let waited = self
            .tunnel
            .wait_for_peer(&session, &self.config.peer_wait, &cancel)
            .await;
        match waited {
            PeerWaitOutcome::Up { polls } => {
                tracing::info!(
                    "Boot complete: peer {} up after {} polls",
                    session.endpoint(),
                    polls
                );
                BootOutcome::Running(RunningSystem {
                    session,
                    board,
                    link_task,
                    workload_task,
                })
            }
            PeerWaitOutcome::TimedOut { .. } => BootOutcome::Halted(BootError::PeerTimeout(
                self.config.peer_wait.max_wait.unwrap_or_default(),
            )),
            PeerWaitOutcome::Cancelled => BootOutcome::Cancelled,
        }
    }

    /// Configure and start the driver, then block until the link supervisor
    /// raises `LINK_UP` or `LINK_FAILED`. `Ok(None)` means cancelled.
    async fn establish_link(
        &self,
        board: &Arc<SignalBoard>,
        cancel: &CancellationToken,
    ) -> Result<Option<JoinHandle<LinkState>>, BootError> {
        let link_config = &self.config.link;
        self.link.configure(link_config).await?;
        tracing::debug!(
            "Station configured for SSID {} ({:?})",
            link_config.ssid,
            link_config.effective_security()
        );

        let (events_tx, events_rx) = mpsc::channel(LINK_EVENT_CHANNEL_CAPACITY);
        let supervisor = LinkSupervisor::new(link_config, Arc::clone(&self.link), Arc::clone(board));
        let link_task = tokio::spawn(supervisor.run(events_rx, cancel.child_token()));

        if let Err(e) = self.link.start(events_tx).await {
            link_task.abort();
            return Err(BootError::Driver(e));
        }
        tracing::info!("Station started, waiting for link");

        let woke = tokio::select! {
            _ = cancel.cancelled() => return Ok(None),
            woke = board.wait_any(Signals::LINK_UP | Signals::LINK_FAILED, None) => woke,
        };

        if woke.contains(Signals::LINK_UP) {
            tracing::info!("Connected to AP SSID {}", link_config.ssid);
            Ok(Some(link_task))
        } else {
            Err(BootError::LinkFailed {
                ssid: link_config.ssid.clone(),
                retries: link_config.max_retries,
            })
        }
    }

    /// Best-effort clock sync; returns false only if cancelled
    async fn sync_time(&self, cancel: &CancellationToken) -> bool {
        if !self.config.time_sync.enabled {
            tracing::debug!("Time sync disabled");
            return true;
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return false,
            result = self.clock.obtain_time() => result,
        };
        match result {
            Ok(now) => match self.config.time_sync.utc_offset() {
                Ok(offset) => tracing::info!("Current time is {}", format_at_offset(now, offset)),
                Err(e) => tracing::info!("Current time is {} ({})", format_utc(now), e),
            },
            Err(e) => tracing::warn!("Time sync failed, continuing without it: {}", e),
        }
        true
    }
}

/// Idle in place until cancelled
pub async fn idle_until_cancelled(cancel: &CancellationToken) {
    let mut ticker = tokio::time::interval(IDLE_TICK);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => tracing::trace!("Idle"),
        }
    }
}
