//! AMQP socket transport.
//!
//! Opens a TCP or TLS connection to a broker, sends the protocol header and
//! then moves whole frames in and raw bytes out. Channel and method handling
//! belong to the layer above.
//!
//! ```no_run
//! use transport::prelude::*;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TransportConfig::new()
//!     .with_host("localhost:5672")
//!     .with_read_timeout(Duration::from_secs(5));
//!
//! let mut transport = create_transport(config)?;
//! transport.connect().await?;
//! let frame = transport.read_frame().await?;
//! println!("{} frame on channel {}", frame.kind(), frame.channel);
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod config;
pub mod frame;
pub mod stream;
pub mod tcp;
#[cfg(feature = "tls")]
pub mod tls;
pub mod transport;

pub use address::{to_host_port, AMQPS_PORT, AMQP_PORT};
pub use config::{SocketSettings, TlsOptions, TransportConfig};
pub use frame::{Frame, FrameDecoder, FrameType, FRAME_END, FRAME_HEADER_SIZE, PROTOCOL_HEADER};
pub use stream::FramedStream;
pub use tcp::TcpTransport;
pub use transport::{create_transport, Transport, TransportError, TransportResult};

#[cfg(feature = "tls")]
pub use tls::TlsTransport;

pub mod prelude {
    pub use crate::address::*;
    pub use crate::config::*;
    pub use crate::frame::*;
    pub use crate::tcp::*;
    pub use crate::transport::*;

    #[cfg(feature = "tls")]
    pub use crate::tls::*;
}
