use crate::config::TransportConfig;
use crate::frame::Frame;
use crate::tcp::TcpTransport;
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Socket closed")]
    ConnectionClosed,

    #[error("Transport is not connected")]
    NotConnected,

    #[error("Unexpected frame: {0}")]
    UnexpectedFrame(String),

    #[error("Frame payload of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: u64, max: u64 },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Could not connect to {host}:{port}: {reason}")]
    ConnectFailed {
        host: String,
        port: u16,
        reason: String,
    },
}

impl TransportError {
    /// Whether the error leaves the connection unusable.
    ///
    /// Timeouts, interrupted calls and malformed frame trailers keep the
    /// connection open; everything else coming off the socket drops it.
    pub fn is_fatal(&self) -> bool {
        match self {
            TransportError::Io(err) => !matches!(
                err.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            TransportError::Timeout { .. } | TransportError::UnexpectedFrame(_) => false,
            _ => true,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::Timeout { .. } => true,
            TransportError::Io(err) => err.kind() == io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// A connection to a broker that moves whole frames in and raw bytes out.
#[async_trait]
pub trait Transport: Send {
    /// Open the socket, apply socket settings, run any handshake and send the
    /// protocol header.
    async fn connect(&mut self) -> TransportResult<()>;

    /// Read one frame, bounded by the configured read timeout.
    async fn read_frame(&mut self) -> TransportResult<Frame>;

    /// Read one frame with `timeout` in place of the configured read timeout.
    /// `None` keeps the configured timeout. The override lasts for this call
    /// only.
    async fn read_frame_within(&mut self, timeout: Option<Duration>) -> TransportResult<Frame>;

    /// Write every byte of `bytes`, bounded by the configured write timeout.
    async fn write(&mut self, bytes: &[u8]) -> TransportResult<()>;

    async fn write_frame(&mut self, frame: &Frame) -> TransportResult<()> {
        let bytes = frame.encode()?;
        self.write(&bytes).await
    }

    /// Shut the connection down. Closing twice is a no-op.
    async fn close(&mut self) -> TransportResult<()>;

    fn is_connected(&self) -> bool;

    fn peer(&self) -> Option<SocketAddr>;

    fn transport_name(&self) -> &'static str;
}

/// Build the transport `config` asks for: TLS when `config.tls` is set,
/// plain TCP otherwise. The returned transport is not yet connected.
pub fn create_transport(config: TransportConfig) -> TransportResult<Box<dyn Transport>> {
    if config.tls.is_some() {
        return create_tls_transport(config);
    }
    Ok(Box::new(TcpTransport::new(config)?))
}

#[cfg(feature = "tls")]
fn create_tls_transport(config: TransportConfig) -> TransportResult<Box<dyn Transport>> {
    Ok(Box::new(crate::tls::TlsTransport::new(config)?))
}

#[cfg(not(feature = "tls"))]
fn create_tls_transport(_config: TransportConfig) -> TransportResult<Box<dyn Transport>> {
    Err(TransportError::InvalidConfig {
        message: "TLS was requested but this build has no TLS support".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameType;

    struct MockTransport {
        connected: bool,
        written: Vec<u8>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn connect(&mut self) -> TransportResult<()> {
            self.connected = true;
            Ok(())
        }

        async fn read_frame(&mut self) -> TransportResult<Frame> {
            self.read_frame_within(None).await
        }

        async fn read_frame_within(&mut self, _timeout: Option<Duration>) -> TransportResult<Frame> {
            Ok(Frame::heartbeat())
        }

        async fn write(&mut self, bytes: &[u8]) -> TransportResult<()> {
            self.written.extend_from_slice(bytes);
            Ok(())
        }

        async fn close(&mut self) -> TransportResult<()> {
            self.connected = false;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn peer(&self) -> Option<SocketAddr> {
            None
        }

        fn transport_name(&self) -> &'static str {
            "mock"
        }
    }

    #[tokio::test]
    async fn test_write_frame_default_encodes() {
        let mut transport = MockTransport {
            connected: false,
            written: Vec::new(),
        };
        transport.connect().await.unwrap();
        assert!(transport.is_connected());

        let frame = Frame::new(FrameType::Body, 2, &b"hi"[..]);
        transport.write_frame(&frame).await.unwrap();
        assert_eq!(transport.written, frame.encode().unwrap().to_vec());

        let read = transport.read_frame().await.unwrap();
        assert_eq!(read.kind(), FrameType::Heartbeat);

        transport.close().await.unwrap();
        assert!(!transport.is_connected());
        assert_eq!(transport.transport_name(), "mock");
    }

    #[test]
    fn test_error_fatality() {
        assert!(!TransportError::Timeout {
            operation: "read",
            after: Duration::from_secs(1)
        }
        .is_fatal());
        assert!(!TransportError::UnexpectedFrame("bad".to_string()).is_fatal());
        assert!(!TransportError::Io(io::Error::from(io::ErrorKind::Interrupted)).is_fatal());
        assert!(!TransportError::Io(io::Error::from(io::ErrorKind::WouldBlock)).is_fatal());

        assert!(TransportError::ConnectionClosed.is_fatal());
        assert!(TransportError::Io(io::Error::from(io::ErrorKind::ConnectionReset)).is_fatal());
        assert!(TransportError::FrameTooLarge { size: 10, max: 1 }.is_fatal());
    }

    #[test]
    fn test_timeout_detection() {
        assert!(TransportError::Timeout {
            operation: "write",
            after: Duration::from_millis(5)
        }
        .is_timeout());
        assert!(TransportError::Io(io::Error::from(io::ErrorKind::TimedOut)).is_timeout());
        assert!(!TransportError::ConnectionClosed.is_timeout());
    }

    #[test]
    fn test_create_transport_selects_tcp() {
        let transport = create_transport(TransportConfig::new().with_host("127.0.0.1:5672")).unwrap();
        assert_eq!(transport.transport_name(), "tcp");
        assert!(!transport.is_connected());
        assert!(transport.peer().is_none());
    }

    #[cfg(feature = "tls")]
    #[test]
    fn test_create_transport_selects_tls() {
        let config = TransportConfig::new()
            .with_host("127.0.0.1")
            .with_tls(crate::config::TlsOptions::default());
        let transport = create_transport(config).unwrap();
        assert_eq!(transport.transport_name(), "tls");
    }

    #[test]
    fn test_create_transport_rejects_invalid_config() {
        let result = create_transport(TransportConfig::new().with_host(""));
        assert!(matches!(result, Err(TransportError::InvalidConfig { .. })));
    }
}
