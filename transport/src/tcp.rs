use crate::config::{SocketSettings, TransportConfig};
use crate::frame::{Frame, FrameDecoder, PROTOCOL_HEADER};
use crate::stream::{with_deadline, FramedStream};
use crate::transport::{Transport, TransportError, TransportResult};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tracing::{debug, info, warn};

/// Resolve `host` and connect to the first address that accepts, trying them
/// in resolver order. `timeout` bounds resolution and each attempt separately.
pub async fn connect_tcp(
    host: &str,
    port: u16,
    settings: &SocketSettings,
    timeout: Option<Duration>,
) -> TransportResult<TcpStream> {
    let connect_failed = |reason: String| TransportError::ConnectFailed {
        host: host.to_string(),
        port,
        reason,
    };

    let addrs: Vec<SocketAddr> = with_deadline(timeout, "resolve", async {
        Ok::<_, TransportError>(lookup_host((host, port)).await?.collect())
    })
    .await
    .map_err(|e| connect_failed(e.to_string()))?;

    if addrs.is_empty() {
        return Err(connect_failed("no addresses resolved".to_string()));
    }

    connect_any(host, port, addrs, settings, timeout).await
}

/// Try `addrs` in order, returning the first stream that connects or a
/// [`TransportError::ConnectFailed`] carrying the last failure.
async fn connect_any(
    host: &str,
    port: u16,
    addrs: Vec<SocketAddr>,
    settings: &SocketSettings,
    timeout: Option<Duration>,
) -> TransportResult<TcpStream> {
    let mut last_error = None;
    for addr in addrs {
        debug!("Connecting to {}", addr);
        match connect_addr(addr, settings, timeout).await {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                warn!("Connection to {} failed: {}", addr, err);
                last_error = Some(err);
            }
        }
    }

    let reason = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no address accepted the connection".to_string());
    Err(TransportError::ConnectFailed {
        host: host.to_string(),
        port,
        reason,
    })
}

async fn connect_addr(
    addr: SocketAddr,
    settings: &SocketSettings,
    timeout: Option<Duration>,
) -> TransportResult<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    apply_socket_settings(&socket, settings)?;

    let stream = with_deadline(timeout, "connect", async move {
        Ok::<_, TransportError>(socket.connect(addr).await?)
    })
    .await?;
    stream.set_nodelay(settings.nodelay)?;
    Ok(stream)
}

fn apply_socket_settings(socket: &TcpSocket, settings: &SocketSettings) -> TransportResult<()> {
    socket.set_keepalive(settings.keepalive)?;
    if let Some(linger) = settings.linger {
        socket.set_linger(Some(linger))?;
    }
    if let Some(size) = settings.send_buffer_size {
        socket.set_send_buffer_size(size)?;
    }
    if let Some(size) = settings.recv_buffer_size {
        socket.set_recv_buffer_size(size)?;
    }
    Ok(())
}

/// Plain TCP transport.
pub struct TcpTransport {
    config: TransportConfig,
    host: String,
    port: u16,
    stream: Option<FramedStream<TcpStream>>,
    peer: Option<SocketAddr>,
}

impl TcpTransport {
    pub fn new(config: TransportConfig) -> TransportResult<Self> {
        config
            .validate()
            .map_err(|message| TransportError::InvalidConfig { message })?;
        let (host, port) = config.host_port()?;

        Ok(Self {
            config,
            host,
            port,
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

    fn stream_mut(&mut self) -> TransportResult<&mut FramedStream<TcpStream>> {
        self.stream.as_mut().ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl Transport for TcpTransport {
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

        let mut stream = FramedStream::new(tcp, FrameDecoder::new(self.config.max_frame_size))
            .with_raise_on_initial_interrupt(self.config.raise_on_initial_interrupt);
        stream
            .write_all(PROTOCOL_HEADER, self.config.write_timeout)
            .await?;

        info!("Connected to {}:{} over tcp", self.host, self.port);
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
        let result = stream.shutdown(self.config.write_timeout).await;
        info!("Closed tcp connection to {}:{}", self.host, self.port);
        result
    }

    fn is_connected(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_connected())
    }

    fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn transport_name(&self) -> &'static str {
        "tcp"
    }
}
