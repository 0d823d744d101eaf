//! Link supervisor task
//!
//! Consumes driver events from a channel, runs them through the
//! [`LinkStateMachine`], and carries out the resulting actions against the
//! driver and the signal board.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use wgs_core::config::LinkConfig;
use wgs_core::traits::LinkDriver;
use wgs_core::{LinkEvent, LinkState};

use super::reconnect::ExponentialBackoff;
use super::state::{LinkAction, LinkStateMachine};
use crate::signal::{SignalBoard, Signals};

/// Channel capacity for driver events.
///
/// Drivers emit at most a handful of events per association attempt, and the
/// supervisor handles each one without blocking on I/O except for the
/// optional reconnect delay.
pub const LINK_EVENT_CHANNEL_CAPACITY: usize = 32;

/// Drives association with bounded retries and publishes the outcome
pub struct LinkSupervisor {
    machine: LinkStateMachine,
    driver: Arc<dyn LinkDriver>,
    board: Arc<SignalBoard>,
    backoff: ExponentialBackoff,
    ssid: String,
}

impl LinkSupervisor {
    /// Create a supervisor for one boot session
    pub fn new(config: &LinkConfig, driver: Arc<dyn LinkDriver>, board: Arc<SignalBoard>) -> Self {
        Self {
            machine: LinkStateMachine::new(config.max_retries),
            driver,
            board,
            backoff: ExponentialBackoff::from_config(&config.retry_backoff),
            ssid: config.ssid.clone(),
        }
    }

    /// Current state
    pub fn state(&self) -> LinkState {
        self.machine.state()
    }

    /// Process events until the channel closes or `cancel` fires.
    ///
    /// Keeps running after link-up so that later link loss is retried too.
    /// Returns the final state.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<LinkEvent>,
        cancel: CancellationToken,
    ) -> LinkState {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Link supervisor cancelled in state {}", self.machine.state());
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => event,
                    None => {
                        tracing::debug!("Link event channel closed");
                        break;
                    }
                },
            };

            self.dispatch(event, &cancel).await;
        }

        self.machine.state()
    }

    /// Handle one event plus any events synthesized while acting on it
    async fn dispatch(&mut self, event: LinkEvent, cancel: &CancellationToken) {
        let mut pending = Some(event);
        while let Some(event) = pending.take() {
            tracing::debug!("Link event: {} (state {})", event, self.machine.state());
            let action = self.machine.handle(event);
            pending = self.apply(action, cancel).await;
        }
    }

    /// Carry out an action; returns a synthetic event if a connect request
    /// could not be issued
    async fn apply(&mut self, action: LinkAction, cancel: &CancellationToken) -> Option<LinkEvent> {
        match action {
            LinkAction::Connect => {
                tracing::info!("Associating with SSID {}", self.ssid);
                self.request_connect().await
            }

            LinkAction::Retry { attempt } => {
                tracing::info!("Connect to the AP failed");
                let delay = self.backoff.next_delay();
                if !delay.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => return None,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                tracing::info!(
                    "Retry to connect to the AP ({}/{})",
                    attempt,
                    self.machine.max_retries()
                );
                self.request_connect().await
            }

            LinkAction::RaiseLinkUp { address } => {
                tracing::info!("Got address {} on SSID {}", address, self.ssid);
                self.backoff.reset();
                self.board.set(Signals::LINK_UP);
                None
            }

            LinkAction::Restored { address } => {
                tracing::info!("Link restored, got address {}", address);
                self.backoff.reset();
                None
            }

            LinkAction::RaiseLinkFailed => {
                tracing::error!(
                    "Failed to connect to SSID {} after {} retries",
                    self.ssid,
                    self.machine.max_retries()
                );
                self.board.set(Signals::LINK_FAILED);
                None
            }

            LinkAction::GiveUp => {
                tracing::error!(
                    "Link to SSID {} lost and not recovered after {} retries",
                    self.ssid,
                    self.machine.max_retries()
                );
                None
            }

            LinkAction::Ignore => None,
        }
    }

    async fn request_connect(&self) -> Option<LinkEvent> {
        match self.driver.connect().await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("Connect request rejected by driver: {}", e);
                Some(LinkEvent::Disconnected { reason: None })
            }
        }
    }
}
