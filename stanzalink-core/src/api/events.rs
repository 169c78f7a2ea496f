//! Event System
//!
//! Signals raised by the session.

use std::sync::Arc;

use crate::auth::AuthFailureReason;
use crate::context::CallbackQueue;

/// Signals emitted by a [`Session`](super::Session).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Authentication succeeded; the session is `Connected`.
    ConnectionEstablished,

    /// An established connection went away, on request or not.
    ConnectionLost {
        /// Whether a reconnect is scheduled.
        will_reconnect: bool,
    },

    /// The server no longer accepts this client version. Connecting stays
    /// suppressed until new credentials are assigned.
    VersionExpired {
        /// Server-provided detail.
        message: String,
    },

    /// The client version will expire soon.
    VersionNearExpiry {
        /// Days left.
        days_remaining: u32,
    },

    /// Credentials were refused; they have been dropped.
    LoggedOut {
        /// `InvalidCredentials` or `AccountDeleted`.
        reason: AuthFailureReason,
    },

    /// The server presented a static key that matches no pin.
    PeerKeyRejected {
        /// Hex SHA-256 fingerprint of the presented key.
        fingerprint: String,
    },
}

/// Event handler trait.
///
/// Implement this trait to receive session signals.
pub trait EventHandler: Send + Sync {
    /// Called when a signal is raised.
    fn on_event(&self, event: SessionEvent);
}

/// Simple callback-based event handler.
pub struct CallbackHandler<F>
where
    F: Fn(SessionEvent) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: Fn(SessionEvent) + Send + Sync,
{
    /// Creates a new callback handler.
    pub fn new(callback: F) -> Self {
        CallbackHandler { callback }
    }
}

impl<F> EventHandler for CallbackHandler<F>
where
    F: Fn(SessionEvent) + Send + Sync,
{
    fn on_event(&self, event: SessionEvent) {
        (self.callback)(event);
    }
}

/// Observer list; every dispatch is posted to the callback context.
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
    callbacks: CallbackQueue,
}

impl EventDispatcher {
    /// Creates a dispatcher delivering on `callbacks`.
    pub fn new(callbacks: CallbackQueue) -> Self {
        EventDispatcher {
            handlers: Vec::new(),
            callbacks,
        }
    }

    /// Adds an event handler.
    pub fn add_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Removes all handlers.
    pub fn clear_handlers(&mut self) {
        self.handlers.clear();
    }

    /// Returns the number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Dispatches an event to all handlers.
    pub fn dispatch(&self, event: SessionEvent) {
        tracing::debug!(?event, "session signal");
        if self.handlers.is_empty() {
            return;
        }
        let handlers = self.handlers.clone();
        self.callbacks.execute(move || {
            for handler in &handlers {
                handler.on_event(event.clone());
            }
        });
    }
}
