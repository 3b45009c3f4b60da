//! Plugin handshake line.
//!
//! A plugin started with the `serve` argument prints exactly one line to
//! stdout before anything else:
//!
//! ```text
//! 1|1|tcp|127.0.0.1:<port>|grpc
//! ```
//!
//! Fields: core protocol version, plugin protocol version, transport,
//! endpoint, rpc kind. Whitespace around the line is tolerated; anything
//! else is a handshake failure.

use thiserror::Error;

/// Core protocol version this engine speaks.
pub const CORE_PROTOCOL_VERSION: u32 = 1;
/// Plugin protocol version this engine speaks.
pub const PLUGIN_PROTOCOL_VERSION: u32 = 1;
/// The only supported transport.
pub const TRANSPORT_TCP: &str = "tcp";
/// The only supported rpc kind.
pub const RPC_KIND_GRPC: &str = "grpc";

/// Parsed handshake line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub core_protocol: u32,
    pub plugin_protocol: u32,
    pub transport: String,
    /// `ip:port` to dial.
    pub endpoint: String,
    pub rpc_kind: String,
}

/// Malformed or unsupported handshake line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeParseError {
    #[error("handshake line is empty")]
    Empty,
    #[error("handshake line has {found} fields, expected 5")]
    FieldCount { found: usize },
    #[error("handshake field '{field}' is not a number: '{value}'")]
    BadVersion { field: &'static str, value: String },
    #[error("unsupported core protocol version {found}, expected {expected}")]
    CoreProtocol { found: u32, expected: u32 },
    #[error("unsupported plugin protocol version {found}, expected {expected}")]
    PluginProtocol { found: u32, expected: u32 },
    #[error("unsupported transport '{found}', expected '{expected}'")]
    Transport { found: String, expected: &'static str },
    #[error("unsupported rpc kind '{found}', expected '{expected}'")]
    RpcKind { found: String, expected: &'static str },
    #[error("handshake endpoint '{endpoint}' is not host:port")]
    Endpoint { endpoint: String },
}

impl Handshake {
    /// Parse and validate one handshake line.
    pub fn parse(line: &str) -> Result<Self, HandshakeParseError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(HandshakeParseError::Empty);
        }

        let fields: Vec<&str> = trimmed.split('|').map(str::trim).collect();
        if fields.len() != 5 {
            return Err(HandshakeParseError::FieldCount { found: fields.len() });
        }

        let core_protocol: u32 = fields[0].parse().map_err(|_| HandshakeParseError::BadVersion {
            field: "core protocol",
            value: fields[0].to_string(),
        })?;
        let plugin_protocol: u32 = fields[1].parse().map_err(|_| HandshakeParseError::BadVersion {
            field: "plugin protocol",
            value: fields[1].to_string(),
        })?;

        if core_protocol != CORE_PROTOCOL_VERSION {
            return Err(HandshakeParseError::CoreProtocol {
                found: core_protocol,
                expected: CORE_PROTOCOL_VERSION,
            });
        }
        if plugin_protocol != PLUGIN_PROTOCOL_VERSION {
            return Err(HandshakeParseError::PluginProtocol {
                found: plugin_protocol,
                expected: PLUGIN_PROTOCOL_VERSION,
            });
        }
        if fields[2] != TRANSPORT_TCP {
            return Err(HandshakeParseError::Transport {
                found: fields[2].to_string(),
                expected: TRANSPORT_TCP,
            });
        }
        if fields[4] != RPC_KIND_GRPC {
            return Err(HandshakeParseError::RpcKind {
                found: fields[4].to_string(),
                expected: RPC_KIND_GRPC,
            });
        }

        let endpoint = fields[3].to_string();
        let (host, port) = endpoint.rsplit_once(':').ok_or(HandshakeParseError::Endpoint {
            endpoint: endpoint.clone(),
        })?;
        if host.is_empty() || port.parse::<u16>().is_err() {
            return Err(HandshakeParseError::Endpoint { endpoint });
        }

        Ok(Self {
            core_protocol,
            plugin_protocol,
            transport: fields[2].to_string(),
            endpoint,
            rpc_kind: fields[4].to_string(),
        })
    }

    /// `http://` URI for dialing the endpoint.
    pub fn dial_uri(&self) -> String {
        format!("http://{}", self.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_line() {
        let handshake = Handshake::parse("1|1|tcp|127.0.0.1:42123|grpc\n").expect("parse");
        assert_eq!(handshake.core_protocol, 1);
        assert_eq!(handshake.plugin_protocol, 1);
        assert_eq!(handshake.endpoint, "127.0.0.1:42123");
        assert_eq!(handshake.dial_uri(), "http://127.0.0.1:42123");
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        let handshake = Handshake::parse("  1|1|tcp|127.0.0.1:9000|grpc  \n").expect("parse");
        assert_eq!(handshake.endpoint, "127.0.0.1:9000");
    }

    #[test]
    fn rejects_missing_fields() {
        assert!(matches!(
            Handshake::parse("1|1|tcp|127.0.0.1:9000"),
            Err(HandshakeParseError::FieldCount { found: 4 })
        ));
        assert!(matches!(Handshake::parse("   "), Err(HandshakeParseError::Empty)));
    }

    #[test]
    fn rejects_unsupported_transport_and_rpc_kind() {
        assert!(matches!(
            Handshake::parse("1|1|unix|/tmp/sock.sock:1|grpc"),
            Err(HandshakeParseError::Transport { .. })
        ));
        assert!(matches!(
            Handshake::parse("1|1|tcp|127.0.0.1:9000|jsonrpc"),
            Err(HandshakeParseError::RpcKind { .. })
        ));
    }

    #[test]
    fn rejects_protocol_mismatches_and_bad_endpoints() {
        assert!(matches!(
            Handshake::parse("2|1|tcp|127.0.0.1:9000|grpc"),
            Err(HandshakeParseError::CoreProtocol { found: 2, .. })
        ));
        assert!(matches!(
            Handshake::parse("1|x|tcp|127.0.0.1:9000|grpc"),
            Err(HandshakeParseError::BadVersion { .. })
        ));
        assert!(matches!(
            Handshake::parse("1|1|tcp|localhost|grpc"),
            Err(HandshakeParseError::Endpoint { .. })
        ));
    }
}
