//! Connection settings.

use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use docwire_common::{DocwireError, Result, protocol::DEFAULT_MAX_MESSAGE_SIZE};
use serde::{Deserialize, Serialize};

/// A server address.
///
/// # Example
/// ```rust
/// use docwire_client::Host;
///
/// let host: Host = "db.example.com".parse().unwrap();
/// assert_eq!(host.port, 27017);
/// assert_eq!(host.to_string(), "db.example.com:27017");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Host {
    pub hostname: String,
    pub port: u16,
}

impl Host {
    pub const DEFAULT_PORT: u16 = 27017;

    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }

    /// Parse `host`, `host:port`, `[v6addr]` or `[v6addr]:port`.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || DocwireError::Configuration(format!("invalid host address '{input}'"));

        let (hostname, port) = if let Some(rest) = input.strip_prefix('[') {
            let (addr, after) = rest.split_once(']').ok_or_else(invalid)?;
            match after {
                "" => (addr, None),
                _ => (addr, Some(after.strip_prefix(':').ok_or_else(invalid)?)),
            }
        } else {
            // An IPv6 address needs brackets to tell it apart from a port.
            if input.matches(':').count() > 1 {
                return Err(invalid());
            }
            match input.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (input, None),
            }
        };

        if hostname.is_empty() {
            return Err(invalid());
        }
        let port = match port {
            Some(port) => port.parse().map_err(|_| invalid())?,
            None => Self::DEFAULT_PORT,
        };
        Ok(Self::new(hostname, port))
    }
}

impl FromStr for Host {
    type Err = DocwireError;

    fn from_str(s: &str) -> Result<Self> {
        Host::parse(s)
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hostname.contains(':') {
            write!(f, "[{}]:{}", self.hostname, self.port)
        } else {
            write!(f, "{}:{}", self.hostname, self.port)
        }
    }
}

/// TLS trust settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsSettings {
    /// PEM file holding the trusted root certificates.
    pub ca_path: PathBuf,
    /// Name to verify the server certificate against. Defaults to the
    /// hostname being connected to.
    #[serde(default)]
    pub server_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub connect_timeout_ms: u64,
    /// How long a request waits for its reply, the handshake included.
    pub query_timeout_ms: u64,
    pub tls: Option<TlsSettings>,
    /// Reported to the server in the handshake's client metadata.
    pub app_name: Option<String>,
    /// Sent as the `saslSupportedMechs` hint.
    pub user: Option<String>,
    /// Largest incoming message the framer will accept.
    pub max_message_size: usize,
    /// Append a CRC-32C checksum to outgoing messages.
    pub checksum: bool,
}

impl ConnectionSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            query_timeout_ms: 30_000,
            tls: None,
            app_name: None,
            user: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            checksum: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_parsing() {
        assert_eq!(Host::parse("localhost").unwrap(), Host::new("localhost", 27017));
        assert_eq!(Host::parse("db:1234").unwrap(), Host::new("db", 1234));
        assert_eq!(Host::parse("[::1]").unwrap(), Host::new("::1", 27017));
        assert_eq!(Host::parse("[::1]:9").unwrap(), Host::new("::1", 9));
        assert_eq!(Host::new("::1", 9).to_string(), "[::1]:9");

        for bad in ["", ":80", "db:port", "db:70000", "[::1", "[::1]x", "::1", "fe80::1:27017"] {
            assert!(
                matches!(Host::parse(bad), Err(DocwireError::Configuration(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_settings_defaults() {
        let settings = ConnectionSettings::default();
        assert_eq!(settings.connect_timeout(), Duration::from_secs(5));
        assert_eq!(settings.query_timeout(), Duration::from_secs(30));
        assert_eq!(settings.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        assert!(settings.tls.is_none());
    }
}
