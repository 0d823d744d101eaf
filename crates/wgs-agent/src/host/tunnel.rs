//! UDP reachability tunnel
//!
//! Stands in for the packet engine on hosts without one: it owns the listen
//! socket, sends an initiation datagram and persistent keepalives to the peer
//! endpoint, and tracks when the endpoint last sent anything back. It performs
//! no handshake cryptography.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use wgs_core::config::TunnelConfig;
use wgs_core::error::TunnelError;
use wgs_core::time::{current_time_millis, elapsed_since};
use wgs_core::traits::TunnelService;

/// A peer counts as up if it sent a datagram within this window
pub const PEER_LIVENESS_WINDOW: Duration = Duration::from_secs(180);

const MSG_INITIATION: [u8; 4] = [1, 0, 0, 0];
const MSG_KEEPALIVE: [u8; 4] = [4, 0, 0, 0];

/// State of one probe tunnel
pub struct UdpTunnelContext {
    socket: Arc<UdpSocket>,
    endpoint: String,
    keepalive: Option<Duration>,
    peer: Option<SocketAddr>,
    last_rx_millis: Arc<AtomicU64>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl UdpTunnelContext {
    /// Bound listen address
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }
}

/// [`TunnelService`] backed by a plain UDP socket
#[derive(Debug, Clone)]
pub struct UdpProbeTunnel {
    liveness_window: Duration,
}

impl Default for UdpProbeTunnel {
    fn default() -> Self {
        Self {
            liveness_window: PEER_LIVENESS_WINDOW,
        }
    }
}

impl UdpProbeTunnel {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TunnelService for UdpProbeTunnel {
    type Context = UdpTunnelContext;

    async fn init(&self, config: &TunnelConfig) -> Result<UdpTunnelContext, TunnelError> {
        let bind = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| TunnelError::Init(format!("bind {}: {}", bind, e)))?;

        tracing::debug!(
            "Tunnel interface {}/{} listening on {}",
            config.local_address,
            config.prefix_len(),
            bind
        );

        Ok(UdpTunnelContext {
            socket: Arc::new(socket),
            endpoint: config.endpoint_address(),
            keepalive: config.keepalive(),
            peer: None,
            last_rx_millis: Arc::new(AtomicU64::new(0)),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }

    async fn connect(&self, ctx: &mut UdpTunnelContext) -> Result<(), TunnelError> {
        let peer = tokio::net::lookup_host(&ctx.endpoint)
            .await
            .map_err(|e| TunnelError::Connect(format!("resolve {}: {}", ctx.endpoint, e)))?
            .find(|addr| addr.is_ipv4())
            .ok_or_else(|| TunnelError::Connect(format!("no IPv4 address for {}", ctx.endpoint)))?;

        ctx.socket
            .send_to(&MSG_INITIATION, peer)
            .await
            .map_err(|e| TunnelError::Connect(format!("send to {}: {}", peer, e)))?;
        tracing::debug!("Initiation sent to {} from {:?}", peer, ctx.local_addr());

        ctx.peer = Some(peer);
        ctx.tasks.push(tokio::spawn(receive_loop(
            Arc::clone(&ctx.socket),
            peer,
            Arc::clone(&ctx.last_rx_millis),
            ctx.cancel.clone(),
        )));
        if let Some(every) = ctx.keepalive {
            ctx.tasks.push(tokio::spawn(keepalive_loop(
                Arc::clone(&ctx.socket),
                peer,
                every,
                ctx.cancel.clone(),
            )));
        }

        Ok(())
    }

    async fn peer_is_up(&self, ctx: &UdpTunnelContext) -> Result<bool, TunnelError> {
        if ctx.peer.is_none() {
            return Err(TunnelError::Status("tunnel not connected".to_string()));
        }
        let last = ctx.last_rx_millis.load(Ordering::Relaxed);
        Ok(last != 0 && elapsed_since(last) < self.liveness_window)
    }

    async fn disconnect(&self, ctx: UdpTunnelContext) -> Result<(), TunnelError> {
        ctx.cancel.cancel();
        for task in ctx.tasks {
            if let Err(e) = task.await {
                return Err(TunnelError::Teardown(e.to_string()));
            }
        }
        Ok(())
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    last_rx_millis: Arc<AtomicU64>,
    cancel: CancellationToken,
) {
    let mut buf = [0u8; 2048];
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => return,
            received = socket.recv_from(&mut buf) => received,
        };
        match received {
            Ok((len, from)) if from == peer => {
                tracing::trace!("{} bytes from peer", len);
                last_rx_millis.store(current_time_millis(), Ordering::Relaxed);
            }
            Ok((_, from)) => tracing::trace!("Dropping datagram from {}", from),
            Err(e) => tracing::debug!("Tunnel receive error: {}", e),
        }
    }
}

async fn keepalive_loop(
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                if let Err(e) = socket.send_to(&MSG_KEEPALIVE, peer).await {
                    tracing::debug!("Keepalive to {} failed: {}", peer, e);
                }
            }
        }
    }
}
