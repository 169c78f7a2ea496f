//! Request Catalog
//!
//! Ready-made typed requests for the few exchanges the session layer itself
//! relies on. Business requests are built by callers with [`Request::new`] or
//! [`Request::iq_json`].

use serde::{Deserialize, Serialize};

use super::lifecycle::Request;
use crate::network::{Iq, IqType, RequestError, Stanza};

/// Namespace of the server properties query.
pub const SERVER_PROPERTIES_NS: &str = "server:properties";

/// Namespace of the keepalive ping.
pub const PING_NS: &str = "ping";

/// Properties the server advertises to clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerProperties {
    /// Server software version.
    pub server_version: String,
    /// Oldest client version still accepted, if the server enforces one.
    pub min_client_version: Option<String>,
    /// Largest frame the server accepts, in bytes.
    pub max_frame_size: Option<u32>,
    /// Optional features enabled on this server.
    pub features: Vec<String>,
}

/// Builds a "get server properties" request.
pub fn server_properties<C>(retries: u32, completion: C) -> Request<ServerProperties>
where
    C: FnOnce(Result<ServerProperties, RequestError>) + Send + 'static,
{
    Request::iq_json(Iq::get(SERVER_PROPERTIES_NS, serde_json::Value::Null), completion)
        .with_retries(retries)
}

/// Builds a keepalive ping. Any IQ result counts as a pong.
pub fn ping<C>(completion: C) -> Request<()>
where
    C: FnOnce(Result<(), RequestError>) + Send + 'static,
{
    Request::new(
        Stanza::Iq(Iq::get(PING_NS, serde_json::Value::Null)),
        |response| match response {
            Stanza::Iq(iq) if iq.iq_type == IqType::Result => Ok(()),
            _ => Err(RequestError::MalformedResponse),
        },
        completion,
    )
}
