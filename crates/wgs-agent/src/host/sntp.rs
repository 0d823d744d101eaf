//! SNTP (RFC 4330) time source

use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::net::UdpSocket;

use wgs_core::config::TimeSyncConfig;
use wgs_core::error::TimeSyncError;
use wgs_core::traits::TimeSource;

const PACKET_LEN: usize = 48;
/// Seconds between 1900-01-01 and 1970-01-01
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;
/// LI = 0, VN = 4, Mode = 3 (client)
const CLIENT_REQUEST: u8 = 0b00_100_011;
const MODE_SERVER: u8 = 4;
const MODE_BROADCAST: u8 = 5;

/// Queries one SNTP server with bounded attempts
#[derive(Debug, Clone)]
pub struct SntpClient {
    server: String,
    attempts: u32,
    reply_timeout: Duration,
    retry_delay: Duration,
}

impl SntpClient {
    pub fn new(config: &TimeSyncConfig) -> Self {
        Self {
            server: config.server.clone(),
            attempts: config.attempts.max(1),
            reply_timeout: config.reply_timeout,
            retry_delay: config.retry_delay,
        }
    }

    async fn resolve(&self) -> Result<SocketAddr, TimeSyncError> {
        tokio::net::lookup_host(&self.server)
            .await
            .map_err(|e| TimeSyncError::Resolve(format!("{}: {}", self.server, e)))?
            .next()
            .ok_or_else(|| TimeSyncError::Resolve(self.server.clone()))
    }

    async fn query(&self, socket: &UdpSocket) -> Result<SystemTime, TimeSyncError> {
        let mut request = [0u8; PACKET_LEN];
        request[0] = CLIENT_REQUEST;
        socket.send(&request).await?;

        let mut reply = [0u8; PACKET_LEN];
        let len = tokio::time::timeout(self.reply_timeout, socket.recv(&mut reply))
            .await
            .map_err(|_| TimeSyncError::InvalidReply("timed out".to_string()))??;
        parse_reply(&reply[..len])
    }
}

#[async_trait]
impl TimeSource for SntpClient {
    async fn obtain_time(&self) -> Result<SystemTime, TimeSyncError> {
        let server = self.resolve().await?;
        let bind: SocketAddr = if server.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(server).await?;

        for attempt in 1..=self.attempts {
            match self.query(&socket).await {
                Ok(now) => return Ok(now),
                Err(e) => {
                    tracing::info!(
                        "Waiting for system time to be set... ({}/{}): {}",
                        attempt,
                        self.attempts,
                        e
                    );
                }
            }
            if attempt < self.attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(TimeSyncError::Exhausted {
            attempts: self.attempts,
        })
    }
}

/// Extract the transmit timestamp from a server reply
fn parse_reply(packet: &[u8]) -> Result<SystemTime, TimeSyncError> {
    if packet.len() < PACKET_LEN {
        return Err(TimeSyncError::InvalidReply(format!(
            "short packet ({} bytes)",
            packet.len()
        )));
    }

    let mode = packet[0] & 0b111;
    if mode != MODE_SERVER && mode != MODE_BROADCAST {
        return Err(TimeSyncError::InvalidReply(format!("unexpected mode {}", mode)));
    }
    if packet[1] == 0 {
        return Err(TimeSyncError::InvalidReply("kiss-o'-death".to_string()));
    }

    let secs = u64::from(u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]));
    let frac = u64::from(u32::from_be_bytes([packet[44], packet[45], packet[46], packet[47]]));
    if secs == 0 && frac == 0 {
        return Err(TimeSyncError::InvalidReply("zero transmit timestamp".to_string()));
    }

    // Era 0 ends in 2036; values below the offset belong to era 1
    let unix_secs = if secs >= NTP_UNIX_OFFSET {
        secs - NTP_UNIX_OFFSET
    } else {
        secs + (1u64 << 32) - NTP_UNIX_OFFSET
    };
    let nanos = (frac * 1_000_000_000) >> 32;
    Ok(UNIX_EPOCH + Duration::new(unix_secs, nanos as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_reply(unix_secs: u64, frac: u32) -> [u8; PACKET_LEN] {
        let mut packet = [0u8; PACKET_LEN];
        packet[0] = 0b00_100_100;
        packet[1] = 2;
        let ntp = (unix_secs + NTP_UNIX_OFFSET) as u32;
        packet[40..44].copy_from_slice(&ntp.to_be_bytes());
        packet[44..48].copy_from_slice(&frac.to_be_bytes());
        packet
    }

    fn config(server: String) -> TimeSyncConfig {
        TimeSyncConfig {
            server,
            attempts: 2,
            reply_timeout: Duration::from_millis(100),
            retry_delay: Duration::from_millis(10),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_transmit_timestamp() {
        let at = parse_reply(&server_reply(1_700_000_000, 1 << 31)).unwrap();
        assert_eq!(
            at.duration_since(UNIX_EPOCH).unwrap(),
            Duration::new(1_700_000_000, 500_000_000)
        );
    }

    #[test]
    fn test_parse_rejects_client_mode_and_kod() {
        let mut packet = server_reply(1_700_000_000, 0);
        packet[0] = CLIENT_REQUEST;
        assert!(parse_reply(&packet).is_err());

        let mut packet = server_reply(1_700_000_000, 0);
        packet[1] = 0;
        assert!(parse_reply(&packet).is_err());

        assert!(parse_reply(&packet[..20]).is_err());
    }

    #[tokio::test]
    async fn test_obtain_time_from_local_server() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let address = server.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let mut buf = [0u8; PACKET_LEN];
            let (_, from) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(buf[0] & 0b111, 3);
            server
                .send_to(&server_reply(1_600_000_000, 0), from)
                .await
                .unwrap();
        });

        let now = SntpClient::new(&config(address)).obtain_time().await.unwrap();
        assert_eq!(
            now.duration_since(UNIX_EPOCH).unwrap().as_secs(),
            1_600_000_000
        );
    }

    #[tokio::test]
    async fn test_silent_server_exhausts_attempts() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let address = server.local_addr().unwrap().to_string();

        let result = SntpClient::new(&config(address)).obtain_time().await;
        assert!(matches!(
            result,
            Err(TimeSyncError::Exhausted { attempts: 2 })
        ));
        drop(server);
    }
}
