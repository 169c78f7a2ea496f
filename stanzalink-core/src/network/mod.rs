//! Network + Transport Layer
//!
//! Provides the transport contract, the stanza envelope and codec, and the
//! transports shipped with the crate.
//!
//! # Architecture
//!
//! The network layer consists of:
//! - **Transport trait**: Non-blocking interface to a secure byte stream
//! - **Message types**: Stanza envelope used for correlation
//! - **Protocol layer**: Codec, length framing and id generation
//! - **Pinning**: Server static key fingerprints
//! - **Transports**: Length-framed TCP and a scriptable mock
//!
//! # Example
//!
//! ```ignore
//! use stanzalink_core::network::{JsonCodec, Stanza, StanzaCodec, Iq};
//!
//! let stanza = Stanza::Iq(Iq::get("server:properties", serde_json::Value::Null));
//! let bytes = JsonCodec.encode(&stanza)?;
//! let key = JsonCodec.correlation_id(&JsonCodec.decode(&bytes)?);
//! ```

mod error;

pub mod message;

#[cfg(feature = "testing")]
pub mod mock;
#[cfg(not(feature = "testing"))]
mod mock;

pub mod pinning;
pub mod protocol;

#[cfg(feature = "tcp")]
pub mod tcp;

mod transport;

// Error types
pub use error::{NetworkError, RequestError};

// Message types
pub use message::{
    Ack, ErrorStanza, Iq, IqType, Presence, PresenceStatus, Stanza, StanzaError, StanzaId,
    PROTOCOL_VERSION,
};

// Protocol utilities
pub use protocol::{
    encode_frame, generate_id, read_frame_length, IdKind, JsonCodec, StanzaCodec,
    FRAME_HEADER_SIZE, MAX_MESSAGE_SIZE,
};

// Transport abstraction
pub use transport::{ConnectionState, Endpoint, Transport, TransportDelegate, TransportResult};

// Mock transport for testing
pub use mock::MockTransport;

// Pinning
pub use pinning::{verify_pin, PinnedKey};

// TCP transport for production
#[cfg(feature = "tcp")]
pub use tcp::TcpTransport;
