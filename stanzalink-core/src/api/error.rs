// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! API Error Types
//!
//! Error type for the session facade. Per-request failures never surface
//! here; they are delivered through each request's completion.

use thiserror::Error;

use crate::network::NetworkError;

/// Error type for session operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session actor has shut down.
    #[error("session closed")]
    Closed,

    /// Network or codec failure.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// Configuration rejected.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
