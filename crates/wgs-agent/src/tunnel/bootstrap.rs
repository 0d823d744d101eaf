//! Tunnel bring-up and peer liveness
//!
//! Configures the tunnel service once the link is up, starts the handshake,
//! and polls the service until the remote peer has actually answered.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use wgs_core::config::{PeerWaitConfig, TunnelConfig};
use wgs_core::error::TunnelError;
use wgs_core::traits::TunnelService;

/// A configured and connected tunnel.
///
/// Owned by whoever brought it up; consumed by
/// [`TunnelBootstrapper::teardown`].
pub struct TunnelSession<C> {
    ctx: C,
    endpoint: String,
    established_at: Instant,
}

impl<C> TunnelSession<C> {
    /// Service context for this tunnel
    pub fn context(&self) -> &C {
        &self.ctx
    }

    /// Peer endpoint as `host:port`
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Time since the handshake was started
    pub fn age(&self) -> Duration {
        self.established_at.elapsed()
    }
}

/// How waiting for the peer ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerWaitOutcome {
    /// The peer answered
    Up { polls: u64 },
    /// The configured bound elapsed first
    TimedOut { polls: u64 },
    /// Cancellation was requested
    Cancelled,
}

/// Brings the tunnel up over an established link
pub struct TunnelBootstrapper<S> {
    service: S,
}

impl<S: TunnelService> TunnelBootstrapper<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    /// The underlying tunnel service
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Validate the configuration, initialize the service, and start the
    /// handshake with the peer.
    ///
    /// Fails with [`TunnelError::Config`] for absent or malformed fields and
    /// with [`TunnelError::Connect`] when the service cannot connect.
    pub async fn bring_up(
        &self,
        config: &TunnelConfig,
    ) -> Result<TunnelSession<S::Context>, TunnelError> {
        config.validate()?;

        tracing::info!("Initializing WireGuard");
        let mut ctx = self.service.init(config).await.map_err(|e| {
            tracing::error!("Tunnel init: {}", e);
            e
        })?;

        tracing::info!("Connecting to the peer at {}", config.endpoint_address());
        self.service.connect(&mut ctx).await.map_err(|e| {
            tracing::error!("Tunnel connect: {}", e);
            match e {
                TunnelError::Config(_) | TunnelError::Connect(_) => e,
                other => TunnelError::Connect(other.to_string()),
            }
        })?;

        Ok(TunnelSession {
            ctx,
            endpoint: config.endpoint_address(),
            established_at: Instant::now(),
        })
    }

    /// Single non-blocking check of peer liveness.
    ///
    /// Status errors are logged and read as "not up yet".
    pub async fn poll_peer_liveness(&self, session: &TunnelSession<S::Context>) -> bool {
        match self.service.peer_is_up(&session.ctx).await {
            Ok(up) => up,
            Err(e) => {
                tracing::debug!("Peer status check failed: {}", e);
                false
            }
        }
    }

    /// Poll the peer every `policy.interval` until it is up, the optional
    /// `policy.max_wait` elapses, or `cancel` fires.
    ///
    /// Without `max_wait` this only returns once the peer has answered.
    pub async fn wait_for_peer(
        &self,
        session: &TunnelSession<S::Context>,
        policy: &PeerWaitConfig,
        cancel: &CancellationToken,
    ) -> PeerWaitOutcome {
        let deadline = policy.max_wait.map(|bound| Instant::now() + bound);
        let mut polls = 0u64;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return PeerWaitOutcome::Cancelled,
                _ = tokio::time::sleep(policy.interval) => {}
            }

            polls += 1;
            if self.poll_peer_liveness(session).await {
                tracing::info!("Peer is up");
                return PeerWaitOutcome::Up { polls };
            }
            tracing::info!("Peer is down");

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    tracing::warn!(
                        "Peer {} did not answer within {:?}",
                        session.endpoint,
                        policy.max_wait.unwrap_or_default()
                    );
                    return PeerWaitOutcome::TimedOut { polls };
                }
            }
        }
    }

    /// Disconnect and invalidate the session
    pub async fn teardown(&self, session: TunnelSession<S::Context>) -> Result<(), TunnelError> {
        tracing::info!(
            "Tearing down tunnel to {} after {:?}",
            session.endpoint,
            session.age()
        );
        self.service.disconnect(session.ctx).await
    }
}
