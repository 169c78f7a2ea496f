//! Mock Transport
//!
//! Scriptable implementation of the Transport trait for testing.

use std::sync::{Arc, Mutex, MutexGuard};

use super::error::NetworkError;
use super::message::Stanza;
use super::protocol::{JsonCodec, StanzaCodec};
use super::transport::{ConnectionState, Endpoint, Transport, TransportDelegate, TransportResult};
use crate::auth::AuthResult;

#[derive(Default)]
struct MockState {
    open: bool,
    endpoint: Option<Endpoint>,
    delegate: Option<Arc<dyn TransportDelegate>>,
    sent_frames: Vec<Vec<u8>>,
    dropped_frames: usize,
    connect_calls: usize,
    disconnect_calls: usize,
    handshake_payloads: Vec<Vec<u8>>,
    inject_error: Option<NetworkError>,
}

/// Mock transport for testing.
///
/// Cloning yields another handle to the same mock, so a test can keep one
/// handle while the session owns the other.
///
/// # Example
///
/// ```ignore
/// use stanzalink_core::network::MockTransport;
///
/// let transport = MockTransport::new();
/// let session = Session::builder(config)
///     .credentials(credentials)
///     .build(transport.clone())?;
/// session.connect()?;
///
/// // Let the handshake succeed, then answer whatever was sent
/// transport.accept_handshake();
/// let sent = transport.sent_stanzas();
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A test that panicked while holding the lock already failed.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn current_delegate(&self) -> Option<Arc<dyn TransportDelegate>> {
        self.lock().delegate.clone()
    }

    /// Injects an error to be returned by the next `connect()`.
    pub fn inject_connect_error(&self, error: NetworkError) {
        self.lock().inject_error = Some(error);
    }

    /// Returns all frames sent while the stream was open.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.lock().sent_frames.clone()
    }

    /// Returns all sent frames decoded with the JSON codec.
    pub fn sent_stanzas(&self) -> Vec<Stanza> {
        self.sent_frames()
            .iter()
            .filter_map(|frame| JsonCodec.decode(frame).ok())
            .collect()
    }

    /// Clears the sent frames buffer.
    pub fn clear_sent(&self) {
        self.lock().sent_frames.clear();
    }

    /// Number of frames sent while the stream was closed.
    pub fn dropped_frames(&self) -> usize {
        self.lock().dropped_frames
    }

    /// Number of `connect()` calls so far.
    pub fn connect_calls(&self) -> usize {
        self.lock().connect_calls
    }

    /// Number of `disconnect()` calls so far.
    pub fn disconnect_calls(&self) -> usize {
        self.lock().disconnect_calls
    }

    /// Endpoint of the most recent `connect()`.
    pub fn last_endpoint(&self) -> Option<Endpoint> {
        self.lock().endpoint.clone()
    }

    /// Handshake payloads collected from the delegate.
    pub fn handshake_payloads(&self) -> Vec<Vec<u8>> {
        self.lock().handshake_payloads.clone()
    }

    /// Returns true between a successful handshake and the next close.
    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Runs the handshake with an accepting authentication result.
    pub fn accept_handshake(&self) -> bool {
        self.complete_handshake(&AuthResult::accepted(None))
    }

    /// Runs the handshake against the given authentication result.
    ///
    /// Collects the connection payload, hands the result to the delegate and
    /// reports `Connected` or `NotConnected` depending on its verdict.
    pub fn complete_handshake(&self, result: &AuthResult) -> bool {
        let Some(delegate) = self.current_delegate() else {
            return false;
        };
        let Some(payload) = delegate.connection_payload() else {
            self.drop_connection();
            return false;
        };
        self.lock().handshake_payloads.push(payload);

        let bytes = match serde_json::to_vec(result) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        self.complete_handshake_raw(&bytes)
    }

    /// Hands raw bytes to the delegate as the authentication result.
    pub fn complete_handshake_raw(&self, bytes: &[u8]) -> bool {
        let Some(delegate) = self.current_delegate() else {
            return false;
        };
        let accepted = delegate.handshake_response(bytes);
        if accepted {
            self.lock().open = true;
            delegate.state_changed(ConnectionState::Connected);
        } else {
            self.lock().open = false;
            delegate.state_changed(ConnectionState::NotConnected);
        }
        accepted
    }

    /// Simulates the stream dropping.
    pub fn drop_connection(&self) {
        let delegate = {
            let mut state = self.lock();
            state.open = false;
            state.delegate.clone()
        };
        if let Some(delegate) = delegate {
            delegate.state_changed(ConnectionState::NotConnected);
        }
    }

    /// Delivers a stanza as an inbound frame.
    pub fn deliver(&self, stanza: &Stanza) {
        if let Ok(bytes) = JsonCodec.encode(stanza) {
            self.deliver_raw(bytes);
        }
    }

    /// Delivers raw bytes as an inbound frame.
    pub fn deliver_raw(&self, bytes: Vec<u8>) {
        if let Some(delegate) = self.current_delegate() {
            delegate.frame_received(bytes);
        }
    }

    /// Presents a server static key to the delegate.
    pub fn present_peer_key(&self, key: &[u8]) {
        if let Some(delegate) = self.current_delegate() {
            delegate.peer_static_key_received(key);
        }
    }
}

impl Transport for MockTransport {
    fn connect(
        &mut self,
        endpoint: &Endpoint,
        delegate: Arc<dyn TransportDelegate>,
    ) -> TransportResult<()> {
        {
            let mut state = self.lock();
            state.connect_calls += 1;
            if let Some(err) = state.inject_error.take() {
                return Err(err);
            }
            state.endpoint = Some(endpoint.clone());
            state.delegate = Some(delegate.clone());
            state.open = false;
        }
        delegate.state_changed(ConnectionState::Connecting);
        Ok(())
    }

    fn disconnect(&mut self) {
        let delegate = {
            let mut state = self.lock();
            state.disconnect_calls += 1;
            state.open = false;
            state.delegate.clone()
        };
        if let Some(delegate) = delegate {
            delegate.state_changed(ConnectionState::NotConnected);
        }
    }

    fn send(&mut self, frame: Vec<u8>) {
        let mut state = self.lock();
        if state.open {
            state.sent_frames.push(frame);
        } else {
            state.dropped_frames += 1;
        }
    }
}
