//! Core error types for wgs

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the wgs ecosystem
#[derive(Error, Debug)]
pub enum WgsError {
    /// Link-layer error
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    /// Tunnel error
    #[error("Tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    /// Workload error
    #[error("Workload error: {0}")]
    Workload(#[from] WorkloadError),

    /// Time synchronization error
    #[error("Time sync error: {0}")]
    TimeSync(#[from] TimeSyncError),

    /// Settings store error
    #[error("Settings store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Link driver errors
#[derive(Error, Debug)]
pub enum LinkError {
    /// The driver rejected the station configuration
    #[error("Driver rejected configuration: {0}")]
    Configure(String),

    /// The driver could not be started
    #[error("Driver failed to start: {0}")]
    Start(String),

    /// A connect request could not be issued
    #[error("Connect request failed: {0}")]
    Connect(String),

    /// The event channel to the link supervisor is gone
    #[error("Link event channel closed")]
    EventChannelClosed,
}

/// Tunnel service errors
#[derive(Error, Debug)]
pub enum TunnelError {
    /// Required tunnel configuration is absent or malformed
    #[error("Invalid tunnel configuration: {0}")]
    Config(#[from] ConfigError),

    /// The service could not be initialized with the configuration
    #[error("Tunnel init failed: {0}")]
    Init(String),

    /// The service reported a failure while connecting to the peer
    #[error("Tunnel connect failed: {0}")]
    Connect(String),

    /// The service could not report peer status
    #[error("Peer status unavailable: {0}")]
    Status(String),

    /// Teardown failed
    #[error("Tunnel teardown failed: {0}")]
    Teardown(String),
}

/// Workload service errors
#[derive(Error, Debug)]
pub enum WorkloadError {
    /// A workload is already running
    #[error("Workload already running")]
    AlreadyRunning,

    /// No workload is running
    #[error("Workload not running")]
    NotRunning,

    /// The requested workload mode is not supported by this service
    #[error("Unsupported workload: {0}")]
    Unsupported(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Time synchronization errors
#[derive(Error, Debug)]
pub enum TimeSyncError {
    /// No valid reply after all attempts
    #[error("No time reply after {attempts} attempts")]
    Exhausted { attempts: u32 },

    /// Server reply could not be used
    #[error("Invalid time reply: {0}")]
    InvalidReply(String),

    /// Server address did not resolve
    #[error("Cannot resolve time server {0}")]
    Resolve(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistent settings store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store has no free space left
    #[error("Settings store has no free pages")]
    Exhausted,

    /// The store was written by an incompatible format version
    #[error("Settings store version {found} is incompatible (expected {expected})")]
    Incompatible { found: String, expected: u32 },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether an erase-and-reinit can recover from this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StoreError::Exhausted | StoreError::Incompatible { .. })
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Field is present but unusable
    #[error("Malformed field {field}: {reason}")]
    Malformed { field: String, reason: String },
}

impl ConfigError {
    pub(crate) fn malformed(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::Malformed {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
