//! Frame-level reads and writes over any async byte stream.
//!
//! [`FramedStream`] owns the read buffer and the connected flag shared by the
//! TCP and TLS transports.

use crate::frame::{Frame, FrameDecoder};
use crate::transport::{TransportError, TransportResult};
use bytes::BytesMut;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

const READ_CHUNK: usize = 16 * 1024;

/// Run `operation`, failing with [`TransportError::Timeout`] if it does not
/// finish within `timeout`. `None` waits forever.
pub(crate) async fn with_deadline<T, F>(
    timeout: Option<Duration>,
    operation: &'static str,
    fut: F,
) -> TransportResult<T>
where
    F: Future<Output = TransportResult<T>>,
{
    match timeout {
        Some(after) => tokio::time::timeout(after, fut)
            .await
            .map_err(|_| TransportError::Timeout { operation, after })?,
        None => fut.await,
    }
}

pub struct FramedStream<S> {
    stream: S,
    buffer: BytesMut,
    decoder: FrameDecoder,
    raise_on_initial_interrupt: bool,
    connected: bool,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, decoder: FrameDecoder) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            decoder,
            raise_on_initial_interrupt: false,
            connected: true,
        }
    }

    pub fn with_raise_on_initial_interrupt(mut self, raise: bool) -> Self {
        self.raise_on_initial_interrupt = raise;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Bytes received but not yet returned as part of a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Read the next frame. A timeout leaves any partial frame buffered for
    /// the next call.
    pub async fn read_frame(&mut self, timeout: Option<Duration>) -> TransportResult<Frame> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        let result = with_deadline(timeout, "read", self.fill_frame()).await;
        match result {
            Ok(frame) => {
                debug!(
                    "Read frame type={} channel={} size={}",
                    frame.kind(),
                    frame.channel,
                    frame.payload.len()
                );
                Ok(frame)
            }
            Err(err) => Err(self.observe(err)),
        }
    }

    pub async fn write_all(&mut self, bytes: &[u8], timeout: Option<Duration>) -> TransportResult<()> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        let stream = &mut self.stream;
        let result = with_deadline(timeout, "write", async move {
            stream.write_all(bytes).await?;
            stream.flush().await?;
            Ok::<(), TransportError>(())
        })
        .await;

        match result {
            Ok(()) => {
                debug!("Wrote {} bytes", bytes.len());
                Ok(())
            }
            Err(err) => Err(self.observe(err)),
        }
    }

    /// Flush and shut down the write side. The stream is marked disconnected
    /// whatever the outcome.
    pub async fn shutdown(&mut self, timeout: Option<Duration>) -> TransportResult<()> {
        let was_connected = std::mem::replace(&mut self.connected, false);
        if !was_connected {
            return Ok(());
        }

        let stream = &mut self.stream;
        let result = with_deadline(timeout, "shutdown", async move {
            stream.shutdown().await?;
            Ok::<(), TransportError>(())
        })
        .await;

        match result {
            Err(TransportError::Io(err))
                if matches!(
                    err.kind(),
                    io::ErrorKind::NotConnected
                        | io::ErrorKind::BrokenPipe
                        | io::ErrorKind::ConnectionReset
                ) =>
            {
                debug!("Peer already gone during shutdown: {}", err);
                Ok(())
            }
            other => other,
        }
    }

    async fn fill_frame(&mut self) -> TransportResult<Frame> {
        loop {
            if let Some(frame) = self.decoder.decode(&mut self.buffer)? {
                return Ok(frame);
            }

            if self.buffer.capacity() - self.buffer.len() < READ_CHUNK {
                self.buffer.reserve(READ_CHUNK);
            }

            match self.stream.read_buf(&mut self.buffer).await {
                Ok(0) => return Err(TransportError::ConnectionClosed),
                Ok(_) => {}
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                    ) =>
                {
                    if self.raise_on_initial_interrupt
                        && !FrameDecoder::header_complete(&self.buffer)
                    {
                        return Err(TransportError::Io(err));
                    }
                    continue;
                }
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(TransportError::ConnectionClosed);
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn observe(&mut self, err: TransportError) -> TransportError {
        if err.is_fatal() {
            if self.connected {
                warn!("Connection lost: {}", err);
            }
            self.connected = false;
        } else {
            debug!("Recoverable transport error: {}", err);
        }
        err
    }
}
