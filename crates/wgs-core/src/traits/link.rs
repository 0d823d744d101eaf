//! Link-layer driver trait

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::types::LinkEvent;

/// Sending half handed to the driver for asynchronous event delivery
pub type LinkEventSender = mpsc::Sender<LinkEvent>;

/// Abstraction over the station driver
///
/// Outcomes of `start` and `connect` are reported later as [`LinkEvent`]s on
/// the sender passed to `start`, never through the return value.
#[async_trait]
pub trait LinkDriver: Send + Sync {
    /// Apply credentials and security policy
    async fn configure(&self, config: &LinkConfig) -> Result<(), LinkError>;

    /// Bring the station interface up; emits `SessionStarted` when ready
    async fn start(&self, events: LinkEventSender) -> Result<(), LinkError>;

    /// Request association; emits `AddressAcquired` or `Disconnected`
    async fn connect(&self) -> Result<(), LinkError>;
}
