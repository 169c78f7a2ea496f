// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Common Test Utilities
//!
//! A session wired to a [`MockTransport`] and a manually pumped callback
//! queue, plus recorders for completions and signals.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use stanzalink_core::api::{Session, SessionConfig, SessionEvent};
use stanzalink_core::auth::Credentials;
use stanzalink_core::context::{CallbackQueue, CallbackReceiver};
use stanzalink_core::network::{Iq, MockTransport, RequestError, Stanza};
use stanzalink_core::request::Request;

pub const USER: &str = "alice";
pub const SECRET: &[u8] = b"correct horse battery staple";

pub type Outcome = Result<serde_json::Value, RequestError>;

/// Completions recorded in arrival order.
#[derive(Clone, Default)]
pub struct Completions(Arc<Mutex<Vec<(String, Outcome)>>>);

impl Completions {
    pub fn all(&self) -> Vec<(String, Outcome)> {
        self.0.lock().unwrap().clone()
    }

    pub fn for_id(&self, id: &str) -> Vec<Outcome> {
        self.all()
            .into_iter()
            .filter(|(i, _)| i == id)
            .map(|(_, r)| r)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    /// An IQ request with a fixed id that records its completion here.
    pub fn request(&self, id: &str, retries: u32) -> Request<serde_json::Value> {
        let log = self.0.clone();
        let tag = id.to_string();
        Request::iq_json(
            Iq::get("test", serde_json::Value::Null).with_id(id),
            move |result| log.lock().unwrap().push((tag, result)),
        )
        .with_retries(retries)
    }
}

pub fn credentials() -> Credentials {
    Credentials::new(USER, SECRET.to_vec())
}

pub fn config() -> SessionConfig {
    SessionConfig::with_endpoint("backend.test", 5222)
}

pub fn result_for(id: &str) -> Stanza {
    Stanza::Iq(Iq::result(id, "test", serde_json::json!({"ok": true})))
}

/// Session under test.
pub struct Harness {
    pub session: Session,
    pub transport: MockTransport,
    pub callbacks: CallbackReceiver,
    pub queue: CallbackQueue,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(config())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let transport = MockTransport::new();
        let (queue, callbacks) = CallbackQueue::channel("test-callbacks");
        let session = Session::builder(config)
            .credentials(credentials())
            .callbacks(queue.clone())
            .build(transport.clone())
            .expect("session");

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        session
            .on_event(move |event| sink.lock().unwrap().push(event))
            .expect("subscribe");

        Harness {
            session,
            transport,
            callbacks,
            queue,
            events,
        }
    }

    /// Waits for the actor to catch up, then runs every queued callback.
    pub async fn settle(&mut self) {
        self.session.flush().await.expect("flush");
        self.callbacks.run_pending();
    }

    /// Connects and completes an accepting handshake.
    pub async fn connect(&mut self) {
        self.session.connect().unwrap();
        self.settle().await;
        assert!(self.transport.accept_handshake(), "handshake refused");
        self.settle().await;
    }

    /// Ids of the stanzas the transport sent, in order.
    pub fn sent_ids(&self) -> Vec<String> {
        self.transport
            .sent_stanzas()
            .iter()
            .filter_map(|s| s.id().map(str::to_owned))
            .collect()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }
}
