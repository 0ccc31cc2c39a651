//! TLS stream establishment.
//!
//! The pool never opens sockets itself; it asks a [`Connector`] for a ready
//! byte stream. [`TlsConnector`] is the production implementation, tests
//! substitute in-memory streams.
//!
//! # Handshake profile
//!
//! - TLS 1.3 only, `TLS_AES_128_GCM_SHA256`, `X25519`
//! - ALPN `http/1.1`, SNI set to the pool host
//! - `TCP_NODELAY` and `SO_KEEPALIVE` on the underlying socket
//! - Certificate validation off unless strict TLS is configured

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, ring};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{trace, warn};

use crate::error::{Error, Result};

use super::options::PoolOptions;

// ============================================================================
// Constants
// ============================================================================

/// Idle time before TCP keep-alive starts, and the gap between keep-alive packets.
const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

// ============================================================================
// Types
// ============================================================================

/// Byte stream usable as a pooled connection.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Type-erased connected stream.
pub type BoxedTransport = Box<dyn Transport>;

// ============================================================================
// Connector
// ============================================================================

/// Opens one connected, handshaken stream to the remote host.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connects and completes any handshake.
    ///
    /// The pool applies its own handshake timeout around this call.
    async fn connect(&self) -> Result<BoxedTransport>;
}

// ============================================================================
// TlsConnector
// ============================================================================

/// TCP + TLS 1.3 connector.
pub struct TlsConnector {
    /// Remote host, also the SNI name.
    host: String,
    /// Remote port.
    port: u16,
    /// Parsed SNI name.
    server_name: ServerName<'static>,
    /// Shared rustls connector.
    inner: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    /// Builds a connector from pool options.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the host is not a valid server name
    /// - [`Error::Tls`] if the rustls configuration is rejected
    pub fn new(options: &PoolOptions) -> Result<Self> {
        let server_name = ServerName::try_from(options.host.clone())
            .map_err(|e| Error::config(format!("Invalid host '{}': {e}", options.host)))?;

        let config = client_config(options.insecure_tls)?;

        Ok(Self {
            host: options.host.clone(),
            port: options.port,
            server_name,
            inner: tokio_rustls::TlsConnector::from(Arc::new(config)),
        })
    }
}

#[async_trait]
impl Connector for TlsConnector {
    async fn connect(&self) -> Result<BoxedTransport> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port)).await?;
        configure_socket(&tcp)?;

        let tls = self
            .inner
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(|e| Error::connection(format!("TLS handshake failed: {e}")))?;

        trace!(host = %self.host, "TLS handshake completed");
        Ok(Box::new(tls))
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Disables Nagle and turns on TCP keep-alive.
///
/// A keep-alive failure is logged and the socket is still used.
fn configure_socket(tcp: &TcpStream) -> Result<()> {
    tcp.set_nodelay(true)?;

    let keepalive = socket2::TcpKeepalive::new()
        .with_time(TCP_KEEPALIVE_INTERVAL)
        .with_interval(TCP_KEEPALIVE_INTERVAL);

    if let Err(e) = socket2::SockRef::from(tcp).set_tcp_keepalive(&keepalive) {
        warn!(error = %e, "Failed to enable TCP keep-alive");
    }
    Ok(())
}

/// Runs `connector.connect()` bounded by `limit`.
pub(crate) async fn connect_with_timeout(
    connector: &dyn Connector,
    limit: Duration,
) -> Result<BoxedTransport> {
    match timeout(limit, connector.connect()).await {
        Ok(result) => result,
        Err(_) => Err(Error::connection_timeout(limit.as_millis() as u64)),
    }
}

/// Builds the fixed TLS 1.3 client profile.
fn client_config(insecure: bool) -> Result<ClientConfig> {
    let provider = Arc::new(CryptoProvider {
        cipher_suites: vec![ring::cipher_suite::TLS13_AES_128_GCM_SHA256],
        kx_groups: vec![ring::kx_group::X25519],
        ..ring::default_provider()
    });

    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_protocol_versions(&[&rustls::version::TLS13])?;

    let mut config = if insecure {
        warn!("Server certificate validation is disabled");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier { provider }))
            .with_no_client_auth()
    } else {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    };

    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    config.enable_sni = true;

    Ok(config)
}

// ============================================================================
// NoVerifier
// ============================================================================

/// Accepts any server certificate.
///
/// Only installed when `insecure_tls` is set.
#[derive(Debug)]
struct NoVerifier {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowConnector;

    #[async_trait]
    impl Connector for SlowConnector {
        async fn connect(&self) -> Result<BoxedTransport> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let (a, _b) = tokio::io::duplex(64);
            Ok(Box::new(a))
        }
    }

    #[test]
    fn test_insecure_config_builds() {
        let config = client_config(true).expect("insecure config");
        assert_eq!(config.alpn_protocols, vec![b"http/1.1".to_vec()]);
    }

    #[test]
    fn test_strict_config_builds() {
        let config = client_config(false).expect("strict config");
        assert_eq!(config.alpn_protocols, vec![b"http/1.1".to_vec()]);
    }

    #[test]
    fn test_connector_rejects_bad_host() {
        let options = PoolOptions::new().with_host("not a host name");
        assert!(TlsConnector::new(&options).is_err());
    }

    #[test]
    fn test_connector_from_default_options() {
        assert!(TlsConnector::new(&PoolOptions::new()).is_ok());
    }

    #[tokio::test]
    async fn test_socket_gets_nodelay_and_keepalive() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let tcp = TcpStream::connect(addr).await.expect("connect");

        configure_socket(&tcp).expect("configure");

        assert!(tcp.nodelay().expect("nodelay"));
        assert!(socket2::SockRef::from(&tcp).keepalive().expect("keepalive"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout() {
        let err = connect_with_timeout(&SlowConnector, Duration::from_secs(3))
            .await
            .err()
            .expect("timeout");
        assert!(matches!(err, Error::ConnectionTimeout { timeout_ms: 3000 }));
    }
}
