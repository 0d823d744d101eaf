//! Throughput workload configuration

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Pause between stopping the workload and starting it again
pub const DRAIN_PAUSE: Duration = Duration::from_secs(1);

/// Default buffer length when none is configured
const DEFAULT_BUFFER_LEN: usize = 16 * 1024;

/// Which side of the measurement this device plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadRole {
    /// Accept connections and count received bytes
    Server,
    /// Connect to the collector and send
    Client,
}

/// Transport used for the measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadProtocol {
    Tcp,
    Udp,
}

/// Configuration for the throughput workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Server or client side
    pub role: WorkloadRole,

    /// Transport protocol
    pub protocol: WorkloadProtocol,

    /// Local address
    pub source_ip: IpAddr,

    /// Local port
    pub source_port: u16,

    /// Remote collector address
    pub destination_ip: IpAddr,

    /// Remote collector port
    pub destination_port: u16,

    /// Send/receive buffer length in bytes (zero picks the default)
    pub buffer_len: usize,

    /// Reporting interval
    #[serde(with = "duration_secs")]
    pub interval: Duration,

    /// Total run time of one workload cycle
    #[serde(with = "duration_secs")]
    pub time: Duration,

    /// Extra time added to `time` before the supervisor restarts the workload
    #[serde(with = "duration_secs")]
    pub reset_pad: Duration,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            role: WorkloadRole::Server,
            protocol: WorkloadProtocol::Tcp,
            source_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            source_port: 5001,
            destination_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            destination_port: 5001,
            buffer_len: 0,
            interval: Duration::from_secs(3),
            time: Duration::from_secs(30),
            reset_pad: Duration::from_secs(5),
        }
    }
}

impl WorkloadConfig {
    /// Local socket address
    pub fn source(&self) -> SocketAddr {
        SocketAddr::new(self.source_ip, self.source_port)
    }

    /// Remote socket address
    pub fn destination(&self) -> SocketAddr {
        SocketAddr::new(self.destination_ip, self.destination_port)
    }

    /// Buffer length, falling back to the default
    pub fn buffer_len(&self) -> usize {
        if self.buffer_len == 0 {
            DEFAULT_BUFFER_LEN
        } else {
            self.buffer_len
        }
    }

    /// Restart cadence derived from this configuration
    pub fn cadence(&self) -> Cadence {
        Cadence {
            run: self.time,
            reset_pad: self.reset_pad,
            drain: DRAIN_PAUSE,
        }
    }
}

/// Immutable restart cadence of the workload supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    /// How long the workload runs
    pub run: Duration,
    /// Slack added before the restart
    pub reset_pad: Duration,
    /// Pause between stop and start
    pub drain: Duration,
}

impl Cadence {
    /// Time the supervisor sleeps before each stop
    pub fn hold(&self) -> Duration {
        self.run + self.reset_pad
    }

    /// Full restart period
    pub fn period(&self) -> Duration {
        self.hold() + self.drain
    }
}
