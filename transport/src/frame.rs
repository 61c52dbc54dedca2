//! AMQP frame codec.
//!
//! A frame on the wire is `type:u8 channel:u16 size:u32 payload[size] 0xCE`,
//! all integers big-endian.

use crate::transport::{TransportError, TransportResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

/// Length of the fixed frame header (type, channel, size).
pub const FRAME_HEADER_SIZE: usize = 7;

/// Octet that terminates every frame.
pub const FRAME_END: u8 = 0xCE;

/// Sent once, right after the socket is connected.
pub const PROTOCOL_HEADER: &[u8; 8] = b"AMQP\x01\x01\x00\x09";

/// Default upper bound on a declared payload size.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// Most the decoder will grow the buffer by ahead of arriving bytes.
const MAX_RESERVE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Method,
    Header,
    Body,
    Heartbeat,
    Other(u8),
}

impl From<u8> for FrameType {
    fn from(value: u8) -> Self {
        match value {
            1 => FrameType::Method,
            2 => FrameType::Header,
            3 => FrameType::Body,
            8 => FrameType::Heartbeat,
            other => FrameType::Other(other),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(value: FrameType) -> Self {
        match value {
            FrameType::Method => 1,
            FrameType::Header => 2,
            FrameType::Body => 3,
            FrameType::Heartbeat => 8,
            FrameType::Other(other) => other,
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameType::Method => write!(f, "METHOD"),
            FrameType::Header => write!(f, "HEADER"),
            FrameType::Body => write!(f, "BODY"),
            FrameType::Heartbeat => write!(f, "HEARTBEAT"),
            FrameType::Other(value) => write!(f, "UNKNOWN({})", value),
        }
    }
}

/// A single frame as read off the wire. The transport does not interpret
/// the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: u8,
    pub channel: u16,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(frame_type: impl Into<u8>, channel: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type: frame_type.into(),
            channel,
            payload: payload.into(),
        }
    }

    pub fn heartbeat() -> Self {
        Self::new(FrameType::Heartbeat, 0, Bytes::new())
    }

    pub fn kind(&self) -> FrameType {
        FrameType::from(self.frame_type)
    }

    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len() + 1
    }

    /// Serialize the frame, including header and end octet.
    pub fn encode(&self) -> TransportResult<Bytes> {
        let size = u32::try_from(self.payload.len()).map_err(|_| TransportError::FrameTooLarge {
            size: self.payload.len() as u64,
            max: u64::from(u32::MAX),
        })?;

        let mut dst = BytesMut::with_capacity(self.encoded_len());
        dst.put_u8(self.frame_type);
        dst.put_u16(self.channel);
        dst.put_u32(size);
        dst.put_slice(&self.payload);
        dst.put_u8(FRAME_END);
        Ok(dst.freeze())
    }
}

/// Incremental frame decoder.
///
/// Bytes stay in the caller's buffer until a complete frame is present, so
/// an interrupted read never loses a partially received frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    max_frame_size: Option<u32>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(Some(DEFAULT_MAX_FRAME_SIZE))
    }
}

impl FrameDecoder {
    pub fn new(max_frame_size: Option<u32>) -> Self {
        Self { max_frame_size }
    }

    /// Whether `buf` holds at least a full frame header.
    pub fn header_complete(buf: &BytesMut) -> bool {
        buf.len() >= FRAME_HEADER_SIZE
    }

    /// Take one frame off the front of `buf`.
    ///
    /// Returns `Ok(None)` without consuming anything while the frame is
    /// incomplete. A frame with a bad end octet is consumed and reported as
    /// [`TransportError::UnexpectedFrame`].
    pub fn decode(&self, buf: &mut BytesMut) -> TransportResult<Option<Frame>> {
        if !Self::header_complete(buf) {
            return Ok(None);
        }

        let frame_type = buf[0];
        let channel = u16::from_be_bytes([buf[1], buf[2]]);
        let size = u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]);

        if let Some(max) = self.max_frame_size {
            if size > max {
                return Err(TransportError::FrameTooLarge {
                    size: u64::from(size),
                    max: u64::from(max),
                });
            }
        }

        let total = FRAME_HEADER_SIZE + size as usize + 1;
        if buf.len() < total {
            buf.reserve((total - buf.len()).min(MAX_RESERVE));
            return Ok(None);
        }

        let mut frame = buf.split_to(total);
        frame.advance(FRAME_HEADER_SIZE);
        let end = frame[frame.len() - 1];
        frame.truncate(frame.len() - 1);

        if end != FRAME_END {
            return Err(TransportError::UnexpectedFrame(format!(
                "Received {:#04x} while expecting 0xce",
                end
            )));
        }

        Ok(Some(Frame {
            frame_type,
            channel,
            payload: frame.freeze(),
        }))
    }
}
