//! docwire client library
//!
//! Connections, logical sessions and command execution on top of the
//! `docwire-common` codec and framing layers. Supports both plain TCP and
//! TLS transports.
//!
//! # Example
//!
//! ```no_run
//! use docwire_client::{ConnectionBuilder, Database, RawCommand};
//! use docwire_common::Document;
//!
//! #[tokio::main]
//! async fn main() -> docwire_common::Result<()> {
//!     let connection = ConnectionBuilder::new("localhost:27017")
//!         .with_app_name("inventory")
//!         .build()
//!         .await?;
//!     println!("max wire version {}", connection.handshake().max_wire_version);
//!
//!     let ping = RawCommand(Document::new().with("ping", 1));
//!     let reply = connection.run_command(&ping, &Database::admin()).await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```

use std::{path::PathBuf, time::Duration};

use docwire_common::Result;

pub use command::{
    AdministrativeCommand, Command, Database, DatabaseCommand, RawCommand, Transaction,
    TransactableCommand,
};
pub use connection::Connection;
pub use handshake::{Handshake, Hello};
pub use session::{Session, SessionId, SessionOwner};
pub use settings::{ConnectionSettings, Host, TlsSettings};
pub use transport::Stream;

mod command;
mod connection;
mod handshake;
mod session;
mod settings;
mod transport;

/// Builder for configuring and opening a [`Connection`].
///
/// # Example
///
/// ```no_run
/// use docwire_client::ConnectionBuilder;
///
/// #[tokio::main]
/// async fn main() -> docwire_common::Result<()> {
///     let connection = ConnectionBuilder::new("db.internal:27017")
///         .with_tls("ca.pem")
///         .with_user("reporting")
///         .build()
///         .await?;
///     Ok(())
/// }
/// ```
pub struct ConnectionBuilder {
    addr: String,
    settings: ConnectionSettings,
}

impl ConnectionBuilder {
    /// Create a new builder for the given `host[:port]` address.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            settings: ConnectionSettings::default(),
        }
    }

    /// Replace every setting at once.
    pub fn with_settings(mut self, settings: ConnectionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use TLS, trusting the roots in the PEM file at `ca_path`.
    pub fn with_tls(mut self, ca_path: impl Into<PathBuf>) -> Self {
        let server_name = self.settings.tls.take().and_then(|tls| tls.server_name);
        self.settings.tls = Some(TlsSettings {
            ca_path: ca_path.into(),
            server_name,
        });
        self
    }

    /// Verify the server certificate against `name` instead of the
    /// hostname. Has no effect without [`with_tls`](Self::with_tls).
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        if let Some(tls) = self.settings.tls.as_mut() {
            tls.server_name = Some(name.into());
        }
        self
    }

    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.settings.app_name = Some(name.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.settings.user = Some(user.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.settings.connect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Bound how long each request waits for its reply.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.settings.query_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.settings.max_message_size = max;
        self
    }

    /// Append a CRC-32C checksum to every outgoing message.
    pub fn with_checksum(mut self, checksum: bool) -> Self {
        self.settings.checksum = checksum;
        self
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Connect and perform the handshake.
    pub async fn build(self) -> Result<Connection> {
        let host = Host::parse(&self.addr)?;
        Connection::connect(host, &self.settings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_builder_settings() {
        let builder = ConnectionBuilder::new("db:1")
            .with_server_name("ignored")
            .with_tls("ca.pem")
            .with_server_name("db.internal")
            .with_app_name("app")
            .with_user("alice")
            .with_connect_timeout(Duration::from_secs(2))
            .with_query_timeout(Duration::from_millis(750))
            .with_max_message_size(1024)
            .with_checksum(true);

        let settings = builder.settings();
        let tls = settings.tls.as_ref().unwrap();
        assert_eq!(tls.ca_path, Path::new("ca.pem"));
        assert_eq!(tls.server_name.as_deref(), Some("db.internal"));
        assert_eq!(settings.app_name.as_deref(), Some("app"));
        assert_eq!(settings.user.as_deref(), Some("alice"));
        assert_eq!(settings.connect_timeout(), Duration::from_secs(2));
        assert_eq!(settings.query_timeout(), Duration::from_millis(750));
        assert_eq!(settings.max_message_size, 1024);
        assert!(settings.checksum);
    }

    #[tokio::test]
    async fn test_build_rejects_bad_address() {
        let result = ConnectionBuilder::new("db:notaport").build().await;
        assert!(matches!(
            result,
            Err(docwire_common::DocwireError::Configuration(_))
        ));
    }
}
