// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Authentication Boundary
//!
//! Builds the connection payload handed to the transport during its handshake
//! and classifies the single authentication result frame that comes back.
//!
//! The payload proves possession of the credential secret with an
//! HMAC-SHA256 over `nonce || timestamp || user_id`; the secret itself never
//! leaves the process.

use std::fmt;

use base64::Engine;
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::network::NetworkError;

/// Account credentials, supplied by an external secure store.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    user_id: String,
    secret: Vec<u8>,
}

impl Credentials {
    /// Creates credentials from a user id and its shared secret.
    pub fn new(user_id: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Credentials {
            user_id: user_id.into(),
            secret: secret.into(),
        }
    }

    /// Returns the user id.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn proof(&self, nonce: &[u8], timestamp: u64) -> Vec<u8> {
        let key = hmac::Key::new(hmac::HMAC_SHA256, &self.secret);
        hmac::sign(&key, &signed_data(nonce, timestamp, &self.user_id))
            .as_ref()
            .to_vec()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Device and client metadata sent with every connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientInfo {
    /// Application version, checked by the server for expiry.
    pub app_version: String,
    /// Operating system name.
    pub platform: String,
    /// Stable per-install device identifier.
    pub device_id: String,
    /// Preferred locale.
    pub locale: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        ClientInfo {
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            platform: std::env::consts::OS.to_string(),
            device_id: String::new(),
            locale: "en".to_string(),
        }
    }
}

/// Handshake payload as it travels on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionPayload {
    /// Account being authenticated.
    pub user_id: String,
    /// Client metadata.
    pub client: ClientInfo,
    /// Unix timestamp (seconds) the proof was made at.
    pub timestamp: u64,
    /// Base64 random nonce.
    pub nonce: String,
    /// Base64 HMAC-SHA256 proof.
    pub proof: String,
}

impl ConnectionPayload {
    /// Creates a fresh payload for `credentials`.
    pub fn new(credentials: &Credentials, client: &ClientInfo) -> Result<Self, NetworkError> {
        let rng = SystemRandom::new();
        let mut nonce = [0u8; 32];
        rng.fill(&mut nonce)
            .map_err(|_| NetworkError::AuthenticationFailed("RNG failed".into()))?;

        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| NetworkError::AuthenticationFailed(e.to_string()))?
            .as_secs();

        let engine = base64::engine::general_purpose::STANDARD;
        Ok(ConnectionPayload {
            user_id: credentials.user_id.clone(),
            client: client.clone(),
            timestamp,
            nonce: engine.encode(nonce),
            proof: engine.encode(credentials.proof(&nonce, timestamp)),
        })
    }

    /// Serializes the payload for the transport.
    pub fn to_bytes(&self) -> Result<Vec<u8>, NetworkError> {
        serde_json::to_vec(self).map_err(|e| NetworkError::Serialization(e.to_string()))
    }

    /// Parses a payload received by a server.
    pub fn from_bytes(data: &[u8]) -> Result<Self, NetworkError> {
        serde_json::from_slice(data).map_err(|e| NetworkError::InvalidMessage(e.to_string()))
    }

    /// Checks the proof against the shared secret.
    pub fn verify(&self, secret: &[u8]) -> bool {
        let engine = base64::engine::general_purpose::STANDARD;
        let (Ok(nonce), Ok(proof)) = (engine.decode(&self.nonce), engine.decode(&self.proof))
        else {
            return false;
        };
        let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
        hmac::verify(&key, &signed_data(&nonce, self.timestamp, &self.user_id), &proof).is_ok()
    }
}

fn signed_data(nonce: &[u8], timestamp: u64, user_id: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(nonce.len() + 8 + user_id.len());
    data.extend_from_slice(nonce);
    data.extend_from_slice(&timestamp.to_be_bytes());
    data.extend_from_slice(user_id.as_bytes());
    data
}

/// Why the server refused a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailureReason {
    /// The client version is no longer supported.
    InvalidClientVersion,
    /// The credentials were not accepted.
    InvalidCredentials,
    /// The account no longer exists.
    AccountDeleted,
    /// Anything else (maintenance, overload, ...).
    #[serde(other)]
    Other,
}

/// Authentication result frame as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether the connection was accepted.
    pub success: bool,
    /// Failure reason when rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<AuthFailureReason>,
    /// Human-readable detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Days until this client version stops being accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_expires_in_days: Option<u32>,
}

impl AuthResult {
    /// An accepting result.
    pub fn accepted(version_expires_in_days: Option<u32>) -> Self {
        AuthResult {
            success: true,
            failure_reason: None,
            message: None,
            version_expires_in_days,
        }
    }

    /// A rejecting result.
    pub fn rejected(reason: AuthFailureReason, message: impl Into<String>) -> Self {
        AuthResult {
            success: false,
            failure_reason: Some(reason),
            message: Some(message.into()),
            version_expires_in_days: None,
        }
    }

    /// Serializes the result frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>, NetworkError> {
        serde_json::to_vec(self).map_err(|e| NetworkError::Serialization(e.to_string()))
    }
}

/// Classified authentication result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The connection may move to `Connected`.
    Accepted {
        /// Days until the client version expires, if the server said.
        version_expires_in_days: Option<u32>,
    },
    /// The server refused the connection.
    Rejected {
        /// Why.
        reason: AuthFailureReason,
        /// Detail for logs.
        message: String,
    },
}

impl AuthOutcome {
    /// Classifies a raw authentication result frame.
    ///
    /// Unparseable frames count as a rejection for an unspecified reason.
    pub fn from_frame(data: &[u8]) -> Self {
        match serde_json::from_slice::<AuthResult>(data) {
            Ok(result) if result.success => AuthOutcome::Accepted {
                version_expires_in_days: result.version_expires_in_days,
            },
            Ok(result) => AuthOutcome::Rejected {
                reason: result.failure_reason.unwrap_or(AuthFailureReason::Other),
                message: result.message.unwrap_or_default(),
            },
            Err(e) => AuthOutcome::Rejected {
                reason: AuthFailureReason::Other,
                message: format!("malformed authentication result: {e}"),
            },
        }
    }

    /// Returns true if the connection was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, AuthOutcome::Accepted { .. })
    }
}
