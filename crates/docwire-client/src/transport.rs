//! Byte transport: TCP with optional TLS.

use std::{
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use docwire_common::{DocwireError, Result, TransportError};
use rustls::pki_types::{CertificateDer, ServerName, pem::PemObject};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::TcpStream,
};
use tokio_rustls::{TlsConnector, client::TlsStream};
use tracing::debug;

use crate::settings::{ConnectionSettings, Host, TlsSettings};

/// Stream type that can be either plain TCP or TLS-wrapped.
pub enum Stream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Stream {
    /// Open a TCP connection to `host`, completing the TLS handshake first
    /// if the settings ask for it.
    pub async fn connect(host: &Host, settings: &ConnectionSettings) -> Result<Self> {
        let tcp = tokio::time::timeout(
            settings.connect_timeout(),
            TcpStream::connect((host.hostname.as_str(), host.port)),
        )
        .await
        .map_err(|_| TransportError::ConnectTimeout(host.to_string()))?
        .map_err(|e| TransportError::Connect {
            host: host.to_string(),
            reason: e.to_string(),
        })?;

        tcp.set_nodelay(true)?;

        match &settings.tls {
            Some(tls) => {
                let stream = wrap_tls(tcp, host, tls).await?;
                debug!(%host, "TLS handshake complete");
                Ok(Stream::Tls(Box::new(stream)))
            }
            None => Ok(Stream::Plain(tcp)),
        }
    }
}

async fn wrap_tls(tcp: TcpStream, host: &Host, tls: &TlsSettings) -> Result<TlsStream<TcpStream>> {
    let name = tls.server_name.as_deref().unwrap_or(&host.hostname);
    let server_name = ServerName::try_from(name.to_string())
        .map_err(|_| TransportError::Tls(format!("invalid server name: {name}")))?;

    let connector = TlsConnector::from(Arc::new(client_config(tls)?));
    connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| TransportError::Tls(format!("TLS handshake failed: {e}")).into())
}

fn client_config(tls: &TlsSettings) -> Result<rustls::ClientConfig> {
    let path = tls.ca_path.display();
    let certs = CertificateDer::pem_file_iter(&tls.ca_path)
        .and_then(|iter| iter.collect::<std::result::Result<Vec<_>, _>>())
        .map_err(|e| {
            DocwireError::Configuration(format!("failed to load certificates from {path}: {e}"))
        })?;

    if certs.is_empty() {
        return Err(DocwireError::Configuration(format!(
            "no certificates found in {path}"
        )));
    }

    let mut roots = rustls::RootCertStore::empty();
    for cert in certs {
        roots
            .add(cert)
            .map_err(|e| DocwireError::Configuration(format!("invalid CA certificate: {e}")))?;
    }

    Ok(rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth())
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_flush(cx),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_ca_file_is_configuration_error() {
        let tls = TlsSettings {
            ca_path: PathBuf::from("/nonexistent/docwire-ca.pem"),
            server_name: None,
        };
        assert!(matches!(
            client_config(&tls),
            Err(DocwireError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = Stream::connect(&Host::new("127.0.0.1", port), &ConnectionSettings::default()).await;
        assert!(matches!(
            result,
            Err(DocwireError::Transport(TransportError::Connect { .. }))
        ));
    }
}
