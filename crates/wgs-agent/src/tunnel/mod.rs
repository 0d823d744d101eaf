//! Secure tunnel bring-up

mod bootstrap;

pub use bootstrap::{PeerWaitOutcome, TunnelBootstrapper, TunnelSession};
