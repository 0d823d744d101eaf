//! Host implementations of the collaborator traits
//!
//! These let the agent run on an ordinary machine: association is confirmed
//! by dialing a probe address, the tunnel is a UDP reachability probe against
//! the peer endpoint, and the workload is a small TCP throughput generator.

mod iperf;
mod link;
mod sntp;
mod tunnel;

pub use iperf::{IperfService, WorkloadReport};
pub use link::ProbeLinkDriver;
pub use sntp::SntpClient;
pub use tunnel::{UdpProbeTunnel, UdpTunnelContext, PEER_LIVENESS_WINDOW};
