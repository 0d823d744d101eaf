//! Link-layer (station) configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};

/// Minimum security mode the station accepts from an access point
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityPolicy {
    /// No authentication
    Open,
    /// WPA2 personal
    Wpa2Psk,
    /// WPA3 personal
    Wpa3Sae,
}

/// Configuration for the link supervisor and the station driver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Network name to associate with
    pub ssid: String,

    /// Pre-shared passphrase (empty for open networks)
    pub password: String,

    /// Weakest security mode to accept
    pub security: SecurityPolicy,

    /// Advertise protected management frame support
    pub pmf_capable: bool,

    /// Refuse access points without protected management frames
    pub pmf_required: bool,

    /// Reconnect attempts after the first one before the link is declared failed
    pub max_retries: u32,

    /// Pacing between reconnect attempts
    pub retry_backoff: BackoffConfig,

    /// Address the host link driver dials to confirm association
    pub probe_address: String,

    /// How long a single association attempt may take
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
            security: SecurityPolicy::Wpa2Psk,
            pmf_capable: true,
            pmf_required: false,
            max_retries: 5,
            retry_backoff: BackoffConfig::default(),
            probe_address: "1.1.1.1:53".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl LinkConfig {
    /// Security threshold actually applied to the driver.
    ///
    /// A configured password implies at least WPA2-PSK so the station never
    /// falls back to deprecated modes; without one the network must be open.
    pub fn effective_security(&self) -> SecurityPolicy {
        if self.password.is_empty() {
            SecurityPolicy::Open
        } else {
            self.security.max(SecurityPolicy::Wpa2Psk)
        }
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Initial delay (zero reconnects immediately)
    #[serde(with = "duration_millis")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_millis")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::ZERO,
            max: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}
