use crate::address::{to_host_port, AMQPS_PORT, AMQP_PORT};
use crate::frame::DEFAULT_MAX_FRAME_SIZE;
use crate::transport::{TransportError, TransportResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// TCP-level options applied to the socket before it connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketSettings {
    pub nodelay: bool,
    pub keepalive: bool,
    pub linger: Option<Duration>,
    pub send_buffer_size: Option<u32>,
    pub recv_buffer_size: Option<u32>,
}

impl Default for SocketSettings {
    fn default() -> Self {
        Self {
            nodelay: true,
            keepalive: true,
            linger: None,
            send_buffer_size: None,
            recv_buffer_size: None,
        }
    }
}

impl SocketSettings {
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn with_keepalive(mut self, keepalive: bool) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = Some(linger);
        self
    }

    pub fn with_send_buffer_size(mut self, size: u32) -> Self {
        self.send_buffer_size = Some(size);
        self
    }

    pub fn with_recv_buffer_size(mut self, size: u32) -> Self {
        self.recv_buffer_size = Some(size);
        self
    }
}

/// TLS client options. Present on a [`TransportConfig`] means "connect over TLS".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsOptions {
    /// PEM bundle of trusted roots. The bundled web PKI roots are used when unset.
    pub ca_file: Option<PathBuf>,
    /// PEM certificate chain presented for client authentication.
    pub cert_file: Option<PathBuf>,
    /// PEM private key matching `cert_file`.
    pub key_file: Option<PathBuf>,
    /// Name sent for SNI and checked against the certificate. Defaults to the host.
    pub server_name: Option<String>,
    /// When false the server certificate is accepted without any verification.
    pub verify_peer: bool,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            ca_file: None,
            cert_file: None,
            key_file: None,
            server_name: None,
            verify_peer: true,
        }
    }
}

impl TlsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(path.into());
        self
    }

    pub fn with_client_cert(
        mut self,
        cert_file: impl Into<PathBuf>,
        key_file: impl Into<PathBuf>,
    ) -> Self {
        self.cert_file = Some(cert_file.into());
        self.key_file = Some(key_file.into());
        self
    }

    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = Some(server_name.into());
        self
    }

    pub fn with_verify_peer(mut self, verify_peer: bool) -> Self {
        self.verify_peer = verify_peer;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.cert_file.is_some() != self.key_file.is_some() {
            return Err("Client certificate and key must be given together".to_string());
        }

        if let Some(server_name) = &self.server_name {
            if server_name.trim().is_empty() {
                return Err("Server name cannot be empty".to_string());
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Broker address, `host`, `host:port` or `[v6]:port`.
    pub host: String,
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub socket_settings: SocketSettings,
    pub tls: Option<TlsOptions>,
    pub max_frame_size: Option<u32>,
    /// Surface an interrupted read instead of retrying it while no byte of
    /// the next frame header has arrived yet.
    pub raise_on_initial_interrupt: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: format!("localhost:{}", AMQP_PORT),
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            socket_settings: SocketSettings::default(),
            tls: None,
            max_frame_size: Some(DEFAULT_MAX_FRAME_SIZE),
            raise_on_initial_interrupt: false,
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(contents: &str) -> TransportResult<Self> {
        let config: TransportConfig =
            toml::from_str(contents).map_err(|e| TransportError::InvalidConfig {
                message: format!("Failed to parse transport config: {}", e),
            })?;
        config
            .validate()
            .map_err(|message| TransportError::InvalidConfig { message })?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> TransportResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| TransportError::InvalidConfig {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn with_socket_settings(mut self, settings: SocketSettings) -> Self {
        self.socket_settings = settings;
        self
    }

    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: Option<u32>) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn with_raise_on_initial_interrupt(mut self, raise: bool) -> Self {
        self.raise_on_initial_interrupt = raise;
        self
    }

    pub fn default_port(&self) -> u16 {
        if self.tls.is_some() {
            AMQPS_PORT
        } else {
            AMQP_PORT
        }
    }

    /// Host and port the transport will connect to.
    pub fn host_port(&self) -> TransportResult<(String, u16)> {
        to_host_port(&self.host, self.default_port())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("Host cannot be empty".to_string());
        }

        self.host_port().map_err(|e| e.to_string())?;

        for (name, timeout) in [
            ("Connect", self.connect_timeout),
            ("Read", self.read_timeout),
            ("Write", self.write_timeout),
        ] {
            if let Some(timeout) = timeout {
                if timeout.is_zero() {
                    return Err(format!("{} timeout must be greater than 0", name));
                }
            }
        }

        if self.max_frame_size == Some(0) {
            return Err("Max frame size must be greater than 0".to_string());
        }

        if let Some(tls) = &self.tls {
            tls.validate()?;
        }

        Ok(())
    }
}
