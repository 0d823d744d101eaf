//! Tunnel configuration and validation

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use super::serde_utils::duration_secs;
use crate::error::ConfigError;

/// Encoded length of a 32-byte key in padded base64
const KEY_ENCODED_LEN: usize = 44;

/// Configuration handed to the tunnel service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Local identity (private) key, base64
    pub private_key: String,

    /// Local UDP port for the tunnel
    pub listen_port: u16,

    /// Peer public key, base64
    pub peer_public_key: String,

    /// Optional pre-shared key, base64 (empty means none)
    pub preshared_key: String,

    /// Address assigned to the local tunnel interface
    pub local_address: Ipv4Addr,

    /// Netmask of the allowed range
    pub local_netmask: Ipv4Addr,

    /// Peer endpoint host name or address
    pub endpoint: String,

    /// Peer endpoint port
    pub port: u16,

    /// Persistent keepalive interval (zero disables keepalives)
    #[serde(with = "duration_secs")]
    pub persistent_keepalive: Duration,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            private_key: String::new(),
            listen_port: 51820,
            peer_public_key: String::new(),
            preshared_key: String::new(),
            local_address: Ipv4Addr::new(192, 168, 4, 58),
            local_netmask: Ipv4Addr::new(255, 255, 255, 0),
            endpoint: String::new(),
            port: 51820,
            persistent_keepalive: Duration::ZERO,
        }
    }
}

impl TunnelConfig {
    /// The pre-shared key, if one is configured
    pub fn preshared_key(&self) -> Option<&str> {
        if self.preshared_key.is_empty() {
            None
        } else {
            Some(self.preshared_key.as_str())
        }
    }

    /// Keepalive interval, if enabled
    pub fn keepalive(&self) -> Option<Duration> {
        if self.persistent_keepalive.is_zero() {
            None
        } else {
            Some(self.persistent_keepalive)
        }
    }

    /// Peer endpoint as `host:port` (IPv6 hosts are bracketed)
    pub fn endpoint_address(&self) -> String {
        if self.endpoint.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]:{}", self.endpoint, self.port)
        } else {
            format!("{}:{}", self.endpoint, self.port)
        }
    }

    /// Set the endpoint from `host` or `host:port`.
    ///
    /// A bare IPv6 address is taken as a host; a trailing `:port` must parse
    /// as a port number.
    pub fn set_endpoint(&mut self, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        if value.parse::<Ipv6Addr>().is_ok() {
            self.endpoint = value.to_string();
            return Ok(());
        }
        match value.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    ConfigError::malformed("endpoint", format!("invalid port in {:?}", value))
                })?;
                self.endpoint = host.trim_start_matches('[').trim_end_matches(']').to_string();
                self.port = port;
            }
            None => self.endpoint = value.to_string(),
        }
        Ok(())
    }

    /// Prefix length of the allowed range
    pub fn prefix_len(&self) -> u32 {
        u32::from(self.local_netmask).count_ones()
    }

    /// Check that every field the tunnel needs is present and well-formed
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_key("private_key", &self.private_key)?;
        validate_key("peer_public_key", &self.peer_public_key)?;
        if let Some(psk) = self.preshared_key() {
            validate_key("preshared_key", psk)?;
        }

        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingField("endpoint".to_string()));
        }
        if self.endpoint.contains(char::is_whitespace) {
            return Err(ConfigError::malformed("endpoint", "contains whitespace"));
        }
        if self.endpoint.contains(':') && self.endpoint.parse::<Ipv6Addr>().is_err() {
            return Err(ConfigError::malformed(
                "endpoint",
                "must be a host name or address without a port",
            ));
        }
        if self.port == 0 {
            return Err(ConfigError::malformed("port", "must be non-zero"));
        }

        if self.local_address.is_unspecified() {
            return Err(ConfigError::MissingField("local_address".to_string()));
        }
        let mask = u32::from(self.local_netmask);
        if mask.leading_ones() + mask.trailing_zeros() != 32 {
            return Err(ConfigError::malformed(
                "local_netmask",
                format!("{} is not a contiguous mask", self.local_netmask),
            ));
        }

        Ok(())
    }
}

/// Keys are 32 bytes encoded as padded base64
fn validate_key(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::MissingField(field.to_string()));
    }
    let (body, pad) = value.split_at(value.len().saturating_sub(1));
    let well_formed = value.len() == KEY_ENCODED_LEN
        && pad == "="
        && body
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/');
    if !well_formed {
        return Err(ConfigError::malformed(
            field,
            "expected a 32-byte base64 key",
        ));
    }
    Ok(())
}
