use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use transport::{TlsOptions, TransportConfig, TransportResult};

#[derive(Args, Debug, Clone)]
pub struct ConnectArgs {
    /// Broker address (host, host:port or [v6]:port); overrides the config file
    #[arg(long)]
    pub host: Option<String>,
    /// TOML transport configuration to start from
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Connect over TLS
    #[arg(long)]
    pub tls: bool,
    /// PEM file of trusted CA certificates (implies --tls)
    #[arg(long)]
    pub ca_file: Option<PathBuf>,
    /// Skip server certificate verification (implies --tls)
    #[arg(long)]
    pub insecure: bool,
    /// Number of frames to read before closing
    #[arg(short, long, default_value = "1")]
    pub frames: usize,
    /// Seconds to wait for connect and for each frame [default: config file, else 10]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,
}

/// Applied when neither `--timeout` nor the config file sets one.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

impl ConnectArgs {
    /// Merge the command line over the config file (or the defaults).
    pub fn to_config(&self) -> TransportResult<TransportConfig> {
        let mut config = match &self.config {
            Some(path) => TransportConfig::from_file(path)?,
            None => TransportConfig::default(),
        };

        if let Some(host) = &self.host {
            config.host = host.clone();
        }

        if self.tls || self.ca_file.is_some() || self.insecure {
            let mut tls = config.tls.take().unwrap_or_default();
            if let Some(ca_file) = &self.ca_file {
                tls.ca_file = Some(ca_file.clone());
            }
            if self.insecure {
                tls.verify_peer = false;
            }
            config.tls = Some(tls);
        }

        match self.timeout {
            Some(secs) => {
                let timeout = Duration::from_secs(secs);
                config.connect_timeout = Some(timeout);
                config.read_timeout = Some(timeout);
            }
            None => {
                config.connect_timeout.get_or_insert(DEFAULT_TIMEOUT);
                config.read_timeout.get_or_insert(DEFAULT_TIMEOUT);
            }
        }

        Ok(config)
    }
}

/// Human-readable TLS mode for the startup log line.
pub fn describe_tls(options: Option<&TlsOptions>) -> String {
    match options {
        None => "off".to_string(),
        Some(tls) if !tls.verify_peer => "on (unverified)".to_string(),
        Some(tls) => match &tls.ca_file {
            Some(ca) => format!("on (ca: {})", ca.display()),
            None => "on (system roots)".to_string(),
        },
    }
}
