// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Session API Layer
//!
//! High-level entry point for applications.
//!
//! # Overview
//!
//! The API layer coordinates:
//! - Connection lifecycle and reconnection
//! - Authentication against the server
//! - Request queueing and response correlation
//! - Signal delivery
//!
//! # Module Structure
//!
//! - [`error`] - Error types for the API layer
//! - [`config`] - Configuration types
//! - [`events`] - Signals and handlers
//! - [`session`] - Session facade and actor

#[cfg(feature = "testing")]
pub mod config;
#[cfg(not(feature = "testing"))]
mod config;

#[cfg(feature = "testing")]
pub mod error;
#[cfg(not(feature = "testing"))]
mod error;

#[cfg(feature = "testing")]
pub mod events;
#[cfg(not(feature = "testing"))]
mod events;

#[cfg(feature = "testing")]
pub mod session;
#[cfg(not(feature = "testing"))]
mod session;

// Error types
pub use error::{SessionError, SessionResult};

// Configuration
pub use config::SessionConfig;

// Events
pub use events::{CallbackHandler, EventDispatcher, EventHandler, SessionEvent};

// Session
pub use session::{Session, SessionBuilder};
