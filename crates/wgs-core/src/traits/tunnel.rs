//! Tunnel service trait

use async_trait::async_trait;

use crate::config::TunnelConfig;
use crate::error::TunnelError;

/// Abstraction over the secure tunnel packet engine
#[async_trait]
pub trait TunnelService: Send + Sync {
    /// Per-tunnel state returned by `init`
    type Context: Send + Sync;

    /// Configure the tunnel interface and peer
    async fn init(&self, config: &TunnelConfig) -> Result<Self::Context, TunnelError>;

    /// Start the handshake with the peer
    async fn connect(&self, ctx: &mut Self::Context) -> Result<(), TunnelError>;

    /// Whether the peer has exchanged traffic recently
    async fn peer_is_up(&self, ctx: &Self::Context) -> Result<bool, TunnelError>;

    /// Tear the tunnel down
    async fn disconnect(&self, ctx: Self::Context) -> Result<(), TunnelError>;
}
