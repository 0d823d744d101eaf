//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Events reported by the link-layer driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The station interface is up and ready to associate
    SessionStarted,
    /// Association was lost or could not be established
    Disconnected {
        /// Driver-specific reason code, if any
        reason: Option<u16>,
    },
    /// The station obtained a network address
    AddressAcquired {
        /// The assigned address
        address: IpAddr,
    },
}

impl fmt::Display for LinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkEvent::SessionStarted => write!(f, "session-started"),
            LinkEvent::Disconnected { reason: Some(code) } => {
                write!(f, "disconnected (reason {})", code)
            }
            LinkEvent::Disconnected { reason: None } => write!(f, "disconnected"),
            LinkEvent::AddressAcquired { address } => write!(f, "address-acquired {}", address),
        }
    }
}

/// Link supervisor state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// Driver not started yet
    Idle,
    /// A connect request is outstanding
    Connecting,
    /// An address has been acquired
    Connected,
    /// Retries exhausted
    Failed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Idle => write!(f, "idle"),
            LinkState::Connecting => write!(f, "connecting"),
            LinkState::Connected => write!(f, "connected"),
            LinkState::Failed => write!(f, "failed"),
        }
    }
}
