// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Network Error Types
//!
//! Error types for transport, framing and codec operations.

use thiserror::Error;

/// Network and transport error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transport not connected")]
    NotConnected,
}

/// Per-request error delivered through a request's completion.
///
/// Every request resolves to exactly one `Result<T, RequestError>`; these
/// errors never cross the session actor boundary any other way.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The connection is down and the request has no retry budget left.
    #[error("not connected")]
    NotConnected,

    /// The connection was lost after the retry budget ran out, or the
    /// request was cancelled.
    #[error("request aborted")]
    Aborted,

    /// The response did not have the shape the request expected.
    #[error("malformed response")]
    MalformedResponse,

    /// The server reported an application-level failure.
    #[error("server error: {0}")]
    ServerError(String),

    /// The server is throttling; retry no sooner than the given seconds.
    #[error("retry after {0} seconds")]
    RetryDelay(u64),
}

impl RequestError {
    /// Returns true for errors caused by connectivity rather than the server.
    ///
    /// These are often invisible to the user when an automatic retry later
    /// succeeds.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, RequestError::NotConnected | RequestError::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let errors = vec![
            (
                NetworkError::ConnectionFailed("refused".into()),
                "Connection failed: refused",
            ),
            (NetworkError::ConnectionClosed, "Connection closed"),
            (NetworkError::NotConnected, "Transport not connected"),
        ];

        for (error, expected) in errors {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_request_error_display() {
        assert_eq!(RequestError::RetryDelay(30).to_string(), "retry after 30 seconds");
        assert_eq!(
            RequestError::ServerError("forbidden".into()).to_string(),
            "server error: forbidden"
        );
    }

    #[test]
    fn test_request_error_connectivity_classification() {
        assert!(RequestError::NotConnected.is_connectivity());
        assert!(RequestError::Aborted.is_connectivity());
        assert!(!RequestError::MalformedResponse.is_connectivity());
        assert!(!RequestError::ServerError("x".into()).is_connectivity());
        assert!(!RequestError::RetryDelay(5).is_connectivity());
    }
}
