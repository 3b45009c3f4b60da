//! Wire contract between the Corynth engine and plugin processes.
//!
//! Three pieces: the handshake line a plugin prints on startup, the gRPC
//! message/client definitions mirrored from `proto/plugin.proto`, and the
//! codec translating engine values to and from the wire `Value`.

pub mod codec;
pub mod handshake;
pub mod pb;

pub use codec::{decode_outputs, decode_value, encode_params, encode_value};
pub use handshake::{Handshake, HandshakeParseError};
pub use pb::plugin_client::PluginClient;
