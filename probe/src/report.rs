use transport::{Frame, TransportConfig};

const PREVIEW_BYTES: usize = 16;

/// One-line summary of a frame: index, type, channel, size and a hex preview.
pub fn describe_frame(index: usize, frame: &Frame) -> String {
    let preview: Vec<String> = frame
        .payload
        .iter()
        .take(PREVIEW_BYTES)
        .map(|b| format!("{:02x}", b))
        .collect();
    let ellipsis = if frame.payload.len() > PREVIEW_BYTES {
        " ..."
    } else {
        ""
    };

    format!(
        "frame #{}: type={}({}) channel={} size={} payload=[{}{}]",
        index,
        frame.kind(),
        frame.frame_type,
        frame.channel,
        frame.payload.len(),
        preview.join(" "),
        ellipsis
    )
}

pub fn describe_config(config: &TransportConfig) -> Vec<String> {
    let mut lines = vec![format!("host: {}", config.host)];
    match config.host_port() {
        Ok((host, port)) => lines.push(format!("resolves to: {} port {}", host, port)),
        Err(e) => lines.push(format!("address error: {}", e)),
    }
    lines.push(format!("transport: {}", if config.tls.is_some() { "tls" } else { "tcp" }));
    if let Some(timeout) = config.connect_timeout {
        lines.push(format!("connect timeout: {:?}", timeout));
    }
    if let Some(timeout) = config.read_timeout {
        lines.push(format!("read timeout: {:?}", timeout));
    }
    if let Some(timeout) = config.write_timeout {
        lines.push(format!("write timeout: {:?}", timeout));
    }
    match config.max_frame_size {
        Some(max) => lines.push(format!("max frame size: {}", max)),
        None => lines.push("max frame size: unbounded".to_string()),
    }
    lines
}
