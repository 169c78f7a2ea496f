//! Stanzalink Core Library
//!
//! Client session layer: keeps one authenticated connection to a backend
//! alive and runs request/response exchanges over it with retry, reconnect
//! backoff and response correlation.
//! All cryptographic operations use the audited `ring` crate.

pub mod api;
pub mod auth;
pub mod connection;
pub mod context;
pub mod network;
pub mod request;

pub use api::{
    CallbackHandler, EventHandler, Session, SessionBuilder, SessionConfig, SessionError,
    SessionEvent, SessionResult,
};
pub use auth::{AuthFailureReason, AuthOutcome, ClientInfo, Credentials};
pub use connection::{BackoffConfig, ConnectionStateCell};
pub use context::{CallbackQueue, CallbackReceiver};
pub use network::{
    ConnectionState, Endpoint, Iq, JsonCodec, MockTransport, NetworkError, PinnedKey,
    RequestError, Stanza, StanzaCodec, Transport, TransportDelegate,
};
pub use request::{OutstandingRequest, ReadyState, Request, ServerProperties};
