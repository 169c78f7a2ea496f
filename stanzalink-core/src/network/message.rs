// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Network Message Types
//!
//! Wire envelope for backend communication. The envelope only carries what the
//! session layer needs to correlate and classify frames; business payloads
//! travel as opaque JSON bodies.

use serde::{Deserialize, Serialize};

use super::protocol::{generate_id, IdKind};

/// Correlation identifier shared by a request and its response.
pub type StanzaId = String;

/// Wire protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// One discrete unit of the wire protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stanza {
    /// Identified request or response.
    Iq(Iq),
    /// Fire-and-forget presence signal.
    Presence(Presence),
    /// Acknowledgment of a previously sent stanza.
    Ack(Ack),
    /// Stream-level error, optionally tied to a stanza.
    Error(ErrorStanza),
}

impl Stanza {
    /// Returns the identifier carried by this stanza, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            Stanza::Iq(iq) => Some(&iq.id),
            Stanza::Presence(p) => Some(&p.id),
            Stanza::Ack(ack) => Some(&ack.id),
            Stanza::Error(e) => e.id.as_deref(),
        }
    }

    /// Returns the protocol-level error condition, if this stanza signals one.
    pub fn error_condition(&self) -> Option<&StanzaError> {
        match self {
            Stanza::Iq(iq) => iq.error.as_ref(),
            Stanza::Error(e) => Some(&e.error),
            Stanza::Presence(_) | Stanza::Ack(_) => None,
        }
    }
}

/// IQ stanza: request/response with a mandatory id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iq {
    /// Correlation id.
    pub id: StanzaId,
    /// Request or response type.
    #[serde(rename = "type")]
    pub iq_type: IqType,
    /// Namespace naming the operation, e.g. `"server:properties"`.
    pub namespace: String,
    /// Opaque operation payload.
    #[serde(default)]
    pub body: serde_json::Value,
    /// Error condition (only on `IqType::Error`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StanzaError>,
}

/// IQ type values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IqType {
    Get,
    Set,
    Result,
    Error,
}

impl Iq {
    /// Creates a `get` request with a freshly generated id.
    pub fn get(namespace: impl Into<String>, body: serde_json::Value) -> Self {
        Self::request(IqType::Get, namespace, body)
    }

    /// Creates a `set` request with a freshly generated id.
    pub fn set(namespace: impl Into<String>, body: serde_json::Value) -> Self {
        Self::request(IqType::Set, namespace, body)
    }

    /// Creates a successful response to the request with `id`.
    pub fn result(id: impl Into<StanzaId>, namespace: impl Into<String>, body: serde_json::Value) -> Self {
        Iq {
            id: id.into(),
            iq_type: IqType::Result,
            namespace: namespace.into(),
            body,
            error: None,
        }
    }

    /// Creates an error response to the request with `id`.
    pub fn error(id: impl Into<StanzaId>, namespace: impl Into<String>, error: StanzaError) -> Self {
        Iq {
            id: id.into(),
            iq_type: IqType::Error,
            namespace: namespace.into(),
            body: serde_json::Value::Null,
            error: Some(error),
        }
    }

    /// Replaces the generated id with a caller-supplied one.
    pub fn with_id(mut self, id: impl Into<StanzaId>) -> Self {
        self.id = id.into();
        self
    }

    fn request(iq_type: IqType, namespace: impl Into<String>, body: serde_json::Value) -> Self {
        Iq {
            id: generate_id(IdKind::Request),
            iq_type,
            namespace: namespace.into(),
            body,
            error: None,
        }
    }
}

/// Presence signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    /// Throwaway id; presence is never answered.
    pub id: StanzaId,
    /// Current presence status.
    pub status: PresenceStatus,
    /// Optional status message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Presence {
    /// Creates a presence signal with a short generated id.
    pub fn new(status: PresenceStatus) -> Self {
        Presence {
            id: generate_id(IdKind::Signal),
            status,
            message: None,
        }
    }
}

/// Presence status values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
}

/// Acknowledgment of a stanza by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Id of the acknowledged stanza.
    pub id: StanzaId,
}

/// Stream-level error frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorStanza {
    /// Id of the stanza that caused the error, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<StanzaId>,
    /// The error condition.
    pub error: StanzaError,
}

/// Protocol-level error condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StanzaError {
    /// Machine-readable reason, e.g. `"forbidden"` or `"rate-limited"`.
    pub reason: String,
    /// Throttling hint in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl StanzaError {
    /// Creates an error condition without a retry hint.
    pub fn new(reason: impl Into<String>) -> Self {
        StanzaError {
            reason: reason.into(),
            retry_after: None,
        }
    }

    /// Creates a throttling condition with a retry-after hint.
    pub fn throttled(retry_after_secs: u64) -> Self {
        StanzaError {
            reason: "rate-limited".to_string(),
            retry_after: Some(retry_after_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iq_get_generates_distinct_ids() {
        let a = Iq::get("server:properties", serde_json::Value::Null);
        let b = Iq::get("server:properties", serde_json::Value::Null);
        assert_ne!(a.id, b.id);
        assert_eq!(a.iq_type, IqType::Get);
    }

    #[test]
    fn test_presence_id_shorter_than_request_id() {
        let presence = Presence::new(PresenceStatus::Online);
        let iq = Iq::set("ping", serde_json::Value::Null);
        assert!(presence.id.len() < iq.id.len());
    }

    #[test]
    fn test_error_condition_from_iq_and_error_frame() {
        let iq = Stanza::Iq(Iq::error("abc", "ping", StanzaError::new("forbidden")));
        assert_eq!(iq.error_condition().map(|e| e.reason.as_str()), Some("forbidden"));

        let frame = Stanza::Error(ErrorStanza {
            id: None,
            error: StanzaError::throttled(12),
        });
        assert_eq!(frame.error_condition().and_then(|e| e.retry_after), Some(12));
        assert_eq!(frame.id(), None);

        let ack = Stanza::Ack(Ack { id: "x".into() });
        assert!(ack.error_condition().is_none());
    }

    #[test]
    fn test_stanza_json_shape() {
        let iq = Stanza::Iq(Iq::result("id-1", "ping", serde_json::json!({"ok": true})));
        let json = serde_json::to_value(&iq).unwrap();
        assert_eq!(json["kind"], "iq");
        assert_eq!(json["type"], "result");
        assert_eq!(json["id"], "id-1");
        assert!(json.get("error").is_none());
    }
}
