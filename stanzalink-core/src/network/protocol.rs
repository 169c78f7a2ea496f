//! Protocol Layer
//!
//! Stanza serialization, length framing and correlation id generation.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::error::NetworkError;
use super::message::{Stanza, PROTOCOL_VERSION};

/// Maximum frame size (1 MB).
pub const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Frame header size (4 bytes length prefix).
pub const FRAME_HEADER_SIZE: usize = 4;

/// Length of ids for fire-and-forget signals.
pub const SIGNAL_ID_LEN: usize = 8;

/// Length of ids for identified request/response exchanges.
pub const REQUEST_ID_LEN: usize = 12;

/// Kind of correlation id to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    /// Presence and other signals that are never answered.
    Signal,
    /// Requests that are matched against a response.
    Request,
}

/// Generates a random alphanumeric correlation id.
pub fn generate_id(kind: IdKind) -> String {
    let len = match kind {
        IdKind::Signal => SIGNAL_ID_LEN,
        IdKind::Request => REQUEST_ID_LEN,
    };
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Converts between stanzas and opaque frame bytes.
///
/// Implementations must be stateless and must report malformed input as
/// [`NetworkError::InvalidMessage`] rather than panicking.
pub trait StanzaCodec: Send + Sync {
    /// Serializes a stanza into a frame body.
    fn encode(&self, stanza: &Stanza) -> Result<Vec<u8>, NetworkError>;

    /// Deserializes a frame body into a stanza.
    fn decode(&self, data: &[u8]) -> Result<Stanza, NetworkError>;

    /// Returns the key used to match a frame to outstanding requests.
    ///
    /// Variants without an id get a throwaway id so every frame has one.
    fn correlation_id(&self, stanza: &Stanza) -> String {
        stanza
            .id()
            .map(str::to_owned)
            .unwrap_or_else(|| generate_id(IdKind::Signal))
    }
}

#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    version: u8,
    stanza: Stanza,
}

/// Versioned JSON codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl StanzaCodec for JsonCodec {
    fn encode(&self, stanza: &Stanza) -> Result<Vec<u8>, NetworkError> {
        let envelope = WireEnvelope {
            version: PROTOCOL_VERSION,
            stanza: stanza.clone(),
        };
        let json =
            serde_json::to_vec(&envelope).map_err(|e| NetworkError::Serialization(e.to_string()))?;

        if json.len() > MAX_MESSAGE_SIZE {
            return Err(NetworkError::InvalidMessage(format!(
                "Message too large: {} bytes (max {})",
                json.len(),
                MAX_MESSAGE_SIZE
            )));
        }
        Ok(json)
    }

    fn decode(&self, data: &[u8]) -> Result<Stanza, NetworkError> {
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(NetworkError::InvalidMessage(format!(
                "Message too large: {} bytes (max {})",
                data.len(),
                MAX_MESSAGE_SIZE
            )));
        }

        let envelope: WireEnvelope =
            serde_json::from_slice(data).map_err(|e| NetworkError::InvalidMessage(e.to_string()))?;

        if envelope.version != PROTOCOL_VERSION {
            return Err(NetworkError::InvalidMessage(format!(
                "Unsupported protocol version: {} (expected {})",
                envelope.version, PROTOCOL_VERSION
            )));
        }

        Ok(envelope.stanza)
    }
}

/// Prefixes a frame body with its length.
///
/// Format: [length: 4 bytes big-endian] [body]
pub fn encode_frame(body: &[u8]) -> Result<Vec<u8>, NetworkError> {
    if body.len() > MAX_MESSAGE_SIZE {
        return Err(NetworkError::InvalidMessage(format!(
            "Frame too large: {} bytes (max {})",
            body.len(),
            MAX_MESSAGE_SIZE
        )));
    }

    let len = body.len() as u32;
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(body);
    Ok(frame)
}

/// Reads the length prefix from a frame header.
pub fn read_frame_length(header: &[u8; FRAME_HEADER_SIZE]) -> usize {
    u32::from_be_bytes(*header) as usize
}
