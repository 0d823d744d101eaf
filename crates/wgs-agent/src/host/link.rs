//! Probe-based link driver

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use wgs_core::config::LinkConfig;
use wgs_core::error::LinkError;
use wgs_core::traits::{LinkDriver, LinkEventSender};
use wgs_core::LinkEvent;

#[derive(Default)]
struct ProbeState {
    probe_address: Option<String>,
    connect_timeout: Duration,
    events: Option<LinkEventSender>,
}

/// Treats a successful TCP dial to the probe address as association.
///
/// Each `connect` spawns one dial; the outcome arrives on the event channel
/// as `AddressAcquired` (with the local address of the probe socket) or
/// `Disconnected`.
#[derive(Default)]
pub struct ProbeLinkDriver {
    state: Mutex<ProbeState>,
}

impl ProbeLinkDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ProbeState>, LinkError> {
        self.state
            .lock()
            .map_err(|_| LinkError::Start("driver state poisoned".to_string()))
    }
}

#[async_trait]
impl LinkDriver for ProbeLinkDriver {
    async fn configure(&self, config: &LinkConfig) -> Result<(), LinkError> {
        if config.probe_address.trim().is_empty() {
            return Err(LinkError::Configure("probe_address is empty".to_string()));
        }
        if config.pmf_required && !config.pmf_capable {
            return Err(LinkError::Configure(
                "pmf_required set without pmf_capable".to_string(),
            ));
        }

        tracing::debug!(
            "Probe link for SSID {} via {} (security {:?})",
            config.ssid,
            config.probe_address,
            config.effective_security()
        );

        let mut state = self.lock()?;
        state.probe_address = Some(config.probe_address.clone());
        state.connect_timeout = config.connect_timeout;
        Ok(())
    }

    async fn start(&self, events: LinkEventSender) -> Result<(), LinkError> {
        {
            let mut state = self.lock()?;
            if state.probe_address.is_none() {
                return Err(LinkError::Start("driver not configured".to_string()));
            }
            state.events = Some(events.clone());
        }

        events
            .send(LinkEvent::SessionStarted)
            .await
            .map_err(|_| LinkError::EventChannelClosed)
    }

    async fn connect(&self) -> Result<(), LinkError> {
        let (address, timeout, events) = {
            let state = self.lock()?;
            match (&state.probe_address, &state.events) {
                (Some(address), Some(events)) => {
                    (address.clone(), state.connect_timeout, events.clone())
                }
                _ => return Err(LinkError::Connect("driver not started".to_string())),
            }
        };

        tokio::spawn(async move {
            let event = match tokio::time::timeout(timeout, TcpStream::connect(&address)).await {
                Ok(Ok(stream)) => match stream.local_addr() {
                    Ok(local) => LinkEvent::AddressAcquired { address: local.ip() },
                    Err(e) => {
                        tracing::debug!("Probe socket has no local address: {}", e);
                        LinkEvent::Disconnected { reason: None }
                    }
                },
                Ok(Err(e)) => {
                    tracing::debug!("Probe {} failed: {}", address, e);
                    LinkEvent::Disconnected {
                        reason: e.raw_os_error().and_then(|code| u16::try_from(code).ok()),
                    }
                }
                Err(_) => {
                    tracing::debug!("Probe {} timed out after {:?}", address, timeout);
                    LinkEvent::Disconnected { reason: None }
                }
            };

            if events.send(event).await.is_err() {
                tracing::debug!("Link event channel closed before probe result");
            }
        });

        Ok(())
    }
}
