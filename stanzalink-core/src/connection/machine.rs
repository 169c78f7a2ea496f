// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Connection State Machine
//!
//! Owns the lifecycle `NotConnected → Connecting → Connected → Disconnecting →
//! NotConnected`, the reconnect flag and the backoff. It decides; the session
//! actor carries out the decisions (talking to the transport, arming timers,
//! cancelling requests).

use std::sync::Arc;
use std::time::Duration;

use super::backoff::{Backoff, BackoffConfig};
use super::state::ConnectionStateCell;
use crate::network::ConnectionState;

/// A state change that actually happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before the change.
    pub from: ConnectionState,
    /// State after the change.
    pub to: ConnectionState,
}

impl Transition {
    /// True when an established or in-progress connection went away.
    ///
    /// Outstanding requests are cancelled on exactly these transitions.
    pub fn lost_connection(&self) -> bool {
        self.to == ConnectionState::NotConnected
            && matches!(
                self.from,
                ConnectionState::Connected | ConnectionState::Connecting
            )
    }
}

/// What a fired reconnect timer should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectStep {
    /// Still down: start a connection attempt.
    Connect,
    /// An attempt is in progress: check again later.
    Wait,
    /// Connected or closing on purpose: stop the reconnect chain.
    Abort,
}

/// Connection lifecycle and reconnect policy.
pub struct ConnectionMachine {
    cell: Arc<ConnectionStateCell>,
    should_reconnect: bool,
    version_expired: bool,
    backoff: Backoff,
}

impl ConnectionMachine {
    /// Creates a machine publishing into `cell`.
    pub fn new(cell: Arc<ConnectionStateCell>, backoff: BackoffConfig) -> Self {
        ConnectionMachine {
            cell,
            should_reconnect: false,
            version_expired: false,
            backoff: Backoff::new(backoff),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> ConnectionState {
        self.cell.get()
    }

    /// Returns true if the state is `Connected`.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Whether a lost connection schedules a reconnect.
    pub fn should_reconnect(&self) -> bool {
        self.should_reconnect
    }

    /// Delay the next reconnect attempt would use.
    pub fn current_delay(&self) -> Duration {
        self.backoff.current()
    }

    /// Prepares an explicit `connect()`.
    ///
    /// Returns false when connecting is suppressed because the version expired.
    pub fn begin_connect(&mut self) -> bool {
        if self.version_expired {
            return false;
        }
        self.should_reconnect = true;
        self.backoff.reset();
        true
    }

    /// Prepares an explicit disconnect: no reconnect afterwards.
    pub fn begin_disconnect(&mut self) {
        self.should_reconnect = false;
    }

    /// Records a successful authentication.
    pub fn authenticated(&mut self) {
        self.backoff.reset();
    }

    /// Suppresses connecting until credentials change.
    pub fn mark_version_expired(&mut self) {
        self.version_expired = true;
        self.should_reconnect = false;
    }

    /// Lifts the expiry suppression (new credentials).
    pub fn clear_version_expired(&mut self) {
        self.version_expired = false;
    }

    /// Moves to `to`, returning the transition if the state changed.
    pub fn transition(&mut self, to: ConnectionState) -> Option<Transition> {
        let from = self.cell.set(to)?;
        tracing::debug!(%from, %to, "connection state changed");
        Some(Transition { from, to })
    }

    /// Returns the delay for the next reconnect timer and grows the backoff.
    pub fn next_reconnect_delay(&mut self) -> Duration {
        self.backoff.next_delay()
    }

    /// Decides what a fired reconnect timer does.
    pub fn reconnect_step(&self) -> ReconnectStep {
        if !self.should_reconnect {
            return ReconnectStep::Abort;
        }
        match self.state() {
            ConnectionState::NotConnected => ReconnectStep::Connect,
            ConnectionState::Connecting => ReconnectStep::Wait,
            ConnectionState::Connected | ConnectionState::Disconnecting => ReconnectStep::Abort,
        }
    }
}
