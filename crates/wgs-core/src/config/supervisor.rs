//! Top-level supervisor configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use time::UtcOffset;

use super::serde_utils::{duration_secs, option_duration_secs};
use super::{LinkConfig, TunnelConfig, WorkloadConfig};
use crate::error::ConfigError;

/// Configuration for the whole boot-and-run sequence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Station link
    pub link: LinkConfig,

    /// Secure tunnel
    pub tunnel: TunnelConfig,

    /// Throughput workload
    pub workload: WorkloadConfig,

    /// Best-effort clock synchronization
    pub time_sync: TimeSyncConfig,

    /// Persistent settings store
    pub settings: SettingsConfig,

    /// Peer liveness polling
    pub peer_wait: PeerWaitConfig,

    /// What the binary does after a fatal boot failure
    pub fatal_policy: FatalPolicy,
}

/// Clock synchronization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSyncConfig {
    /// Skip time synchronization entirely when false
    pub enabled: bool,

    /// SNTP server as `host:port`
    pub server: String,

    /// Number of queries before giving up
    pub attempts: u32,

    /// How long to wait for each reply
    #[serde(with = "duration_secs")]
    pub reply_timeout: Duration,

    /// Pause between attempts
    #[serde(with = "duration_secs")]
    pub retry_delay: Duration,

    /// Minutes east of UTC used when logging the synced time
    pub utc_offset_minutes: i32,
}

impl TimeSyncConfig {
    /// Offset for reporting the synced time
    pub fn utc_offset(&self) -> Result<UtcOffset, ConfigError> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(|secs| UtcOffset::from_whole_seconds(secs).ok())
            .ok_or_else(|| {
                ConfigError::malformed(
                    "time_sync.utc_offset_minutes",
                    format!("{} is not a valid offset", self.utc_offset_minutes),
                )
            })
    }
}

impl Default for TimeSyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            server: "pool.ntp.org:123".to_string(),
            attempts: 10,
            reply_timeout: Duration::from_secs(2),
            retry_delay: Duration::from_secs(2),
            utc_offset_minutes: 0,
        }
    }
}

/// Persistent settings store location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Directory holding the store
    pub path: PathBuf,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            path: super::default_config_dir().join("settings"),
        }
    }
}

/// Peer liveness polling policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerWaitConfig {
    /// Time between polls
    #[serde(with = "duration_secs")]
    pub interval: Duration,

    /// Give up after this long; absent means poll until the peer answers
    #[serde(
        with = "option_duration_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_wait: Option<Duration>,
}

impl Default for PeerWaitConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_wait: None,
        }
    }
}

/// Reaction to a fatal boot failure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FatalPolicy {
    /// Stay alive doing nothing until externally reset
    #[default]
    Halt,
    /// Exit the process with a failure status
    Exit,
}
