//! Broker address parsing.
//!
//! Accepts `host`, `host:port`, `[v6-literal]` and `[v6-literal]:port`
//! (RFC 2732 bracket form).

use crate::transport::{TransportError, TransportResult};

/// Default port for plain AMQP connections.
pub const AMQP_PORT: u16 = 5672;

/// Default port for AMQP over TLS.
pub const AMQPS_PORT: u16 = 5671;

/// Split a broker address into host and port, falling back to `default_port`
/// when the address names no port.
///
/// A bare IPv6 address without brackets is split at its last colon, so
/// callers must bracket IPv6 literals.
pub fn to_host_port(address: &str, default_port: u16) -> TransportResult<(String, u16)> {
    let address = address.trim();

    let (host, port) = if let Some((host, port)) = split_ipv6_literal(address)? {
        let port = match port {
            Some(port) => parse_port(address, port)?,
            None => default_port,
        };
        (host.to_string(), port)
    } else if let Some((host, port)) = address.rsplit_once(':') {
        (host.to_string(), parse_port(address, port)?)
    } else {
        (address.to_string(), default_port)
    };

    if host.is_empty() {
        return Err(TransportError::InvalidAddress(format!(
            "'{}' has an empty host",
            address
        )));
    }

    Ok((host, port))
}

/// `[v6]` or `[v6]:port`, where the bracketed part holds only hex digits,
/// colons and dots. Anything after `]` other than `:port` is rejected.
fn split_ipv6_literal(address: &str) -> TransportResult<Option<(&str, Option<&str>)>> {
    let Some((host, rest)) = address
        .strip_prefix('[')
        .and_then(|inner| inner.split_once(']'))
    else {
        return Ok(None);
    };
    if host.is_empty()
        || !host
            .chars()
            .all(|c| c.is_ascii_hexdigit() || c == ':' || c == '.')
    {
        return Ok(None);
    }

    if rest.is_empty() {
        return Ok(Some((host, None)));
    }
    match rest.strip_prefix(':') {
        Some(port) => Ok(Some((host, Some(port)))),
        None => Err(TransportError::InvalidAddress(format!(
            "'{}' has trailing characters after ']'",
            address
        ))),
    }
}

fn parse_port(address: &str, port: &str) -> TransportResult<u16> {
    port.parse::<u16>().map_err(|_| {
        TransportError::InvalidAddress(format!("'{}' has an invalid port '{}'", address, port))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_without_port_uses_default() {
        let (host, port) = to_host_port("rabbit.local", AMQP_PORT).unwrap();
        assert_eq!(host, "rabbit.local");
        assert_eq!(port, 5672);

        let (_, port) = to_host_port("rabbit.local", AMQPS_PORT).unwrap();
        assert_eq!(port, 5671);
    }

    #[test]
    fn test_host_with_port() {
        let (host, port) = to_host_port("127.0.0.1:5673", AMQP_PORT).unwrap();
        assert_eq!(host, "127.0.0.1");
        assert_eq!(port, 5673);
    }

    #[test]
    fn test_bracketed_ipv6() {
        let (host, port) = to_host_port("[fe80::1]:5432", AMQP_PORT).unwrap();
        assert_eq!(host, "fe80::1");
        assert_eq!(port, 5432);

        let (host, port) = to_host_port("[::1]", AMQP_PORT).unwrap();
        assert_eq!(host, "::1");
        assert_eq!(port, AMQP_PORT);
    }

    #[test]
    fn test_bare_ipv6_splits_on_last_colon() {
        let (host, port) = to_host_port("fe80::1", AMQP_PORT).unwrap();
        assert_eq!(host, "fe80:");
        assert_eq!(port, 1);
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(matches!(
            to_host_port("localhost:amqp", AMQP_PORT),
            Err(TransportError::InvalidAddress(_))
        ));
        assert!(matches!(
            to_host_port("localhost:70000", AMQP_PORT),
            Err(TransportError::InvalidAddress(_))
        ));
        assert!(matches!(
            to_host_port(":5672", AMQP_PORT),
            Err(TransportError::InvalidAddress(_))
        ));
        assert!(matches!(
            to_host_port("", AMQP_PORT),
            Err(TransportError::InvalidAddress(_))
        ));
        assert!(matches!(
            to_host_port("[::1]:5672junk", AMQP_PORT),
            Err(TransportError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_trailing_characters_after_bracket() {
        match to_host_port("[::1]junk", AMQP_PORT) {
            Err(TransportError::InvalidAddress(message)) => {
                assert_eq!(message, "'[::1]junk' has trailing characters after ']'");
            }
            other => panic!("expected InvalidAddress, got {:?}", other),
        }
    }
}
