//! TLS transport built on rustls.

use crate::config::{TlsOptions, TransportConfig};
use crate::frame::{Frame, FrameDecoder, PROTOCOL_HEADER};
use crate::stream::{with_deadline, FramedStream};
use crate::tcp::connect_tcp;
use crate::transport::{Transport, TransportError, TransportResult};
use async_trait::async_trait;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{aws_lc_rs, CryptoProvider};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

fn invalid_config(message: String) -> TransportError {
    TransportError::InvalidConfig { message }
}

fn load_certificates(path: &Path) -> TransportResult<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_file_iter(path)
        .and_then(|iter| iter.collect::<Result<Vec<_>, _>>())
        .map_err(|e| {
            invalid_config(format!(
                "Failed to read certificates from {}: {:?}",
                path.display(),
                e
            ))
        })?;

    if certs.is_empty() {
        return Err(invalid_config(format!(
            "No certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> TransportResult<PrivateKeyDer<'static>> {
    PrivateKeyDer::from_pem_file(path).map_err(|e| {
        invalid_config(format!(
            "Failed to read private key from {}: {:?}",
            path.display(),
            e
        ))
    })
}

fn root_store(options: &TlsOptions) -> TransportResult<RootCertStore> {
    let Some(ca_file) = &options.ca_file else {
        return Ok(RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        });
    };

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(load_certificates(ca_file)?);
    if added == 0 {
        return Err(invalid_config(format!(
            "No usable CA certificates in {}",
            ca_file.display()
        )));
    }
    debug!(
        "Loaded {} CA certificates from {} ({} ignored)",
        added,
        ca_file.display(),
        ignored
    );
    Ok(roots)
}

/// Build the rustls client configuration described by `options`.
pub fn build_client_config(options: &TlsOptions) -> TransportResult<ClientConfig> {
    options.validate().map_err(invalid_config)?;

    let provider = Arc::new(aws_lc_rs::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::Tls(e.to_string()))?;

    let builder = if options.verify_peer {
        builder.with_root_certificates(root_store(options)?)
    } else {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
    };

    match (&options.cert_file, &options.key_file) {
        (Some(cert_file), Some(key_file)) => builder
            .with_client_auth_cert(load_certificates(cert_file)?, load_private_key(key_file)?)
            .map_err(|e| TransportError::Tls(e.to_string())),
        _ => Ok(builder.with_no_client_auth()),
    }
}

/// The name presented for SNI: the configured override, else the host.
pub fn server_name(options: &TlsOptions, host: &str) -> TransportResult<ServerName<'static>> {
    let name = options.server_name.as_deref().unwrap_or(host);
    ServerName::try_from(name.to_string())
        .map_err(|_| invalid_config(format!("'{}' is not a valid TLS server name", name)))
}

/// Certificate verifier used when `verify_peer` is off. Signatures are still
/// checked so the handshake itself stays sound.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// TCP transport wrapped in TLS. The handshake runs as part of `connect`,
/// before the protocol header is sent.
pub struct TlsTransport {
    config: TransportConfig,
    host: String,
    port: u16,
    connector: TlsConnector,
    server_name: ServerName<'static>,
    stream: Option<FramedStream<TlsStream<TcpStream>>>,
    peer: Option<SocketAddr>,
}

impl TlsTransport {
    pub fn new(config: TransportConfig) -> TransportResult<Self> {
        config
            .validate()
            .map_err(|message| TransportError::InvalidConfig { message })?;
        let options = config.tls.clone().unwrap_or_default();
        let (host, port) = config.host_port()?;

        let client_config = build_client_config(&options)?;
        let server_name = server_name(&options, &host)?;

        Ok(Self {
            config,
            host,
            port,
            connector: TlsConnector::from(Arc::new(client_config)),
            server_name,
            stream: None,
            peer: None,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn stream_mut(&mut self) -> TransportResult<&mut FramedStream<TlsStream<TcpStream>>> {
        self.stream.as_mut().ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl Transport for TlsTransport {
    async fn connect(&mut self) -> TransportResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        let tcp = connect_tcp(
            &self.host,
            self.port,
            &self.config.socket_settings,
            self.config.connect_timeout,
        )
        .await?;
        let peer = tcp.peer_addr().ok();

        let connector = self.connector.clone();
        let server_name = self.server_name.clone();
        let tls = with_deadline(self.config.connect_timeout, "TLS handshake", async move {
            connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| TransportError::Tls(format!("handshake failed: {}", e)))
        })
        .await?;

        if let Some(version) = tls.get_ref().1.protocol_version() {
            debug!("Negotiated {:?} with {}:{}", version, self.host, self.port);
        }

        let mut stream = FramedStream::new(tls, FrameDecoder::new(self.config.max_frame_size))
            .with_raise_on_initial_interrupt(self.config.raise_on_initial_interrupt);
        stream
            .write_all(PROTOCOL_HEADER, self.config.write_timeout)
            .await?;

        info!("Connected to {}:{} over tls", self.host, self.port);
        self.stream = Some(stream);
        self.peer = peer;
        Ok(())
    }

    async fn read_frame(&mut self) -> TransportResult<Frame> {
        let timeout = self.config.read_timeout;
        self.read_frame_within(timeout).await
    }

    async fn read_frame_within(&mut self, timeout: Option<Duration>) -> TransportResult<Frame> {
        let timeout = timeout.or(self.config.read_timeout);
        self.stream_mut()?.read_frame(timeout).await
    }

    async fn write(&mut self, bytes: &[u8]) -> TransportResult<()> {
        let timeout = self.config.write_timeout;
        self.stream_mut()?.write_all(bytes, timeout).await
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.peer = None;
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        // Shutting down a rustls stream sends close_notify before the TCP FIN.
        let result = stream.shutdown(self.config.write_timeout).await;
        info!("Closed tls connection to {}:{}", self.host, self.port);
        result
    }

    fn is_connected(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_connected())
    }

    fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn transport_name(&self) -> &'static str {
        "tls"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AMQPS_PORT;
    use std::io::Write;

    fn dns_name(name: &ServerName<'_>) -> String {
        match name {
            ServerName::DnsName(dns) => dns.as_ref().to_string(),
            other => panic!("expected a DNS name, got {:?}", other),
        }
    }

    #[test]
    fn test_server_name_defaults_to_host() {
        let name = server_name(&TlsOptions::default(), "broker.example.com").unwrap();
        assert_eq!(dns_name(&name), "broker.example.com");

        let options = TlsOptions::new().with_server_name("rabbit.internal");
        let name = server_name(&options, "10.0.0.5").unwrap();
        assert_eq!(dns_name(&name), "rabbit.internal");

        let ip = server_name(&TlsOptions::default(), "10.0.0.5").unwrap();
        assert!(matches!(ip, ServerName::IpAddress(_)));

        assert!(server_name(&TlsOptions::default(), "not a name!").is_err());
    }

    #[test]
    fn test_build_client_config_with_default_roots() {
        assert!(build_client_config(&TlsOptions::default()).is_ok());
        assert!(build_client_config(&TlsOptions::new().with_verify_peer(false)).is_ok());
    }

    #[test]
    fn test_build_client_config_with_ca_file() {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let mut ca_file = tempfile::NamedTempFile::new().unwrap();
        ca_file.write_all(certified.cert.pem().as_bytes()).unwrap();

        let options = TlsOptions::new().with_ca_file(ca_file.path());
        assert!(build_client_config(&options).is_ok());
    }

    #[test]
    fn test_build_client_config_rejects_bad_files() {
        let mut empty = tempfile::NamedTempFile::new().unwrap();
        empty.write_all(b"not a certificate").unwrap();
        let options = TlsOptions::new().with_ca_file(empty.path());
        assert!(matches!(
            build_client_config(&options),
            Err(TransportError::InvalidConfig { .. })
        ));

        let options = TlsOptions::new().with_ca_file("/nonexistent/ca.pem");
        assert!(matches!(
            build_client_config(&options),
            Err(TransportError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_build_client_config_with_client_cert() {
        let certified = rcgen::generate_simple_self_signed(vec!["client".to_string()]).unwrap();
        let mut cert_file = tempfile::NamedTempFile::new().unwrap();
        cert_file.write_all(certified.cert.pem().as_bytes()).unwrap();
        let mut key_file = tempfile::NamedTempFile::new().unwrap();
        key_file
            .write_all(certified.key_pair.serialize_pem().as_bytes())
            .unwrap();

        let options = TlsOptions::new()
            .with_verify_peer(false)
            .with_client_cert(cert_file.path(), key_file.path());
        assert!(build_client_config(&options).is_ok());

        let mismatched = TlsOptions::new()
            .with_verify_peer(false)
            .with_client_cert(cert_file.path(), "/nonexistent/client.key");
        assert!(matches!(
            build_client_config(&mismatched),
            Err(TransportError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_tls_transport_uses_amqps_port() {
        let config = TransportConfig::new()
            .with_host("broker")
            .with_tls(TlsOptions::default());
        let transport = TlsTransport::new(config).unwrap();
        assert_eq!(transport.host(), "broker");
        assert_eq!(transport.port(), AMQPS_PORT);
        assert!(!transport.is_connected());
        assert_eq!(transport.transport_name(), "tls");
    }
}
