//! In-process broker stand-ins for the integration tests.

#![allow(dead_code)]

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use transport::{Frame, FrameType, PROTOCOL_HEADER};

pub async fn bind_local() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    (listener, address)
}

/// Read the 8-byte protocol header a client sends after connecting.
pub async fn expect_protocol_header<S: AsyncRead + Unpin>(stream: &mut S) {
    let mut header = [0u8; 8];
    stream.read_exact(&mut header).await.unwrap();
    assert_eq!(&header, PROTOCOL_HEADER);
}

/// Read one encoded frame off a raw stream.
pub async fn read_raw_frame<S: AsyncRead + Unpin>(stream: &mut S) -> (u8, u16, Vec<u8>, u8) {
    let mut header = [0u8; 7];
    stream.read_exact(&mut header).await.unwrap();
    let size = u32::from_be_bytes([header[3], header[4], header[5], header[6]]) as usize;
    let mut payload = vec![0u8; size];
    stream.read_exact(&mut payload).await.unwrap();
    let end = stream.read_u8().await.unwrap();
    (
        header[0],
        u16::from_be_bytes([header[1], header[2]]),
        payload,
        end,
    )
}

pub fn start_frame() -> Vec<u8> {
    Frame::new(FrameType::Method, 0, &b"\x00\x0a\x00\x0aconnection.start"[..])
        .encode()
        .unwrap()
        .to_vec()
}
