//! Transport Trait
//!
//! Contract between the session layer and a secure byte-stream connection.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::NetworkError;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, NetworkError>;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection and none in progress.
    #[default]
    NotConnected,
    /// Transport connecting or handshake in progress.
    Connecting,
    /// Authenticated and ready for requests.
    Connected,
    /// Graceful close in progress.
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::NotConnected => "not-connected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// Backend address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoint {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Creates an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint {
            host: host.into(),
            port,
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::new("localhost", 5222)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Callbacks a transport delivers to its owner.
///
/// Transports may invoke these from any thread; implementations marshal them
/// onto their own execution context.
pub trait TransportDelegate: Send + Sync {
    /// Returns the handshake payload to send once the stream is up.
    ///
    /// `None` aborts the connection attempt.
    fn connection_payload(&self) -> Option<Vec<u8>>;

    /// Receives the authentication result frame.
    ///
    /// Returns `false` when the server rejected the connection; the
    /// transport then closes the stream.
    fn handshake_response(&self, data: &[u8]) -> bool;

    /// Receives one inbound frame body.
    fn frame_received(&self, data: Vec<u8>);

    /// Reports a lifecycle change of the underlying stream.
    fn state_changed(&self, state: ConnectionState);

    /// Reports the server's static key for pinning.
    fn peer_static_key_received(&self, key: &[u8]);
}

/// Transport trait for network communication.
///
/// This trait abstracts the underlying secure stream (Noise, TLS, ...)
/// allowing for platform-specific implementations and easy testing with mocks.
///
/// # Non-blocking Interface
///
/// Every method returns immediately. Progress, inbound frames and failures are
/// reported through the [`TransportDelegate`] passed to [`Transport::connect`].
pub trait Transport: Send {
    /// Starts connecting to `endpoint`.
    ///
    /// Returns an error only when the attempt cannot be started at all.
    fn connect(
        &mut self,
        endpoint: &Endpoint,
        delegate: Arc<dyn TransportDelegate>,
    ) -> TransportResult<()>;

    /// Closes the connection. Safe to call even if not connected.
    fn disconnect(&mut self);

    /// Sends one frame body.
    ///
    /// Best effort: a failed write surfaces as a disconnect, not as an error.
    fn send(&mut self, frame: Vec<u8>);
}
