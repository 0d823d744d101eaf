//! Platform services: clock and persistent settings

use async_trait::async_trait;
use std::time::SystemTime;

use crate::error::{StoreError, TimeSyncError};

/// Source of wall-clock time
#[async_trait]
pub trait TimeSource: Send + Sync {
    /// Obtain the current time from an authoritative source
    async fn obtain_time(&self) -> Result<SystemTime, TimeSyncError>;
}

/// Persistent settings store
pub trait SettingsStore: Send + Sync {
    /// Open the store, creating it if needed
    fn init(&self) -> Result<(), StoreError>;

    /// Wipe the store
    fn erase(&self) -> Result<(), StoreError>;
}
