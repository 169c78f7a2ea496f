//! Request Dispatcher
//!
//! Owns the `in_flight` and `pending_to_send` collections. Every method is
//! called from the session actor only; a request lives in at most one of the
//! two collections at a time.

use std::sync::Arc;

use super::lifecycle::{CancelDisposition, OutstandingRequest};
use crate::context::CallbackQueue;
use crate::network::{Stanza, StanzaCodec, Transport};

/// Queue of outstanding requests.
pub struct RequestDispatcher {
    in_flight: Vec<Box<dyn OutstandingRequest>>,
    pending_to_send: Vec<Box<dyn OutstandingRequest>>,
    codec: Arc<dyn StanzaCodec>,
    callbacks: CallbackQueue,
}

impl RequestDispatcher {
    /// Creates an empty dispatcher completing requests on `callbacks`.
    pub fn new(codec: Arc<dyn StanzaCodec>, callbacks: CallbackQueue) -> Self {
        RequestDispatcher {
            in_flight: Vec::new(),
            pending_to_send: Vec::new(),
            codec,
            callbacks,
        }
    }

    /// Number of requests sent and awaiting a response.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Number of requests waiting for a connection.
    pub fn pending_len(&self) -> usize {
        self.pending_to_send.len()
    }

    /// Returns true if no request is outstanding.
    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty() && self.pending_to_send.is_empty()
    }

    /// Accepts a new request.
    ///
    /// `transport` is `Some` only while the connection is authenticated. A
    /// request that cannot go out now is parked if it has retry budget and
    /// failed with `NotConnected` otherwise.
    pub fn enqueue(
        &mut self,
        mut request: Box<dyn OutstandingRequest>,
        transport: Option<&mut dyn Transport>,
    ) {
        match transport {
            Some(transport) => self.send_or_park(request, transport),
            None if request.retries_remaining() > 0 => {
                tracing::debug!(id = %request.id(), "not connected, holding request");
                self.pending_to_send.push(request);
            }
            None => request.fail_on_no_connection(&self.callbacks),
        }
    }

    /// Sends every pending request in insertion order.
    ///
    /// No-op when `transport` is `None`.
    pub fn resend_all_pending(&mut self, transport: Option<&mut dyn Transport>) {
        let Some(transport) = transport else {
            return;
        };
        if self.pending_to_send.is_empty() {
            return;
        }

        let pending = std::mem::take(&mut self.pending_to_send);
        tracing::debug!(count = pending.len(), "resending pending requests");
        for request in pending {
            self.send_or_park(request, &mut *transport);
        }
    }

    /// Cancels everything outstanding after a connection loss.
    ///
    /// With `retry`, requests with budget left go back to `pending_to_send`
    /// (in-flight ones first, keeping their original order); the rest
    /// complete with `Aborted`.
    pub fn cancel_all(&mut self, retry: bool) {
        let mut snapshot = std::mem::take(&mut self.in_flight);
        snapshot.append(&mut self.pending_to_send);
        if snapshot.is_empty() {
            return;
        }

        tracing::debug!(count = snapshot.len(), retry, "cancelling outstanding requests");
        for mut request in snapshot {
            if request.cancel_and_prepare_for(retry, &self.callbacks) == CancelDisposition::Requeue {
                self.pending_to_send.push(request);
            }
        }
    }

    /// Cancels one request by id, completing it with `Aborted`.
    ///
    /// Returns false if no outstanding request has that id.
    pub fn cancel(&mut self, id: &str) -> bool {
        let matches = self.take_matching(id);
        if matches.is_empty() {
            return false;
        }
        for mut request in matches {
            request.cancel_and_prepare_for(false, &self.callbacks);
        }
        true
    }

    /// Routes an inbound stanza to the request(s) it answers.
    ///
    /// Returns the number of requests completed.
    pub fn handle_response(&mut self, response: Stanza) -> usize {
        let id = self.codec.correlation_id(&response);
        let matches = self.take_matching(&id);

        match matches.len() {
            0 => {
                tracing::debug!(%id, "no outstanding request for response, discarding");
                return 0;
            }
            1 => {}
            n => tracing::warn!(%id, matches = n, "multiple requests share a correlation id"),
        }

        let count = matches.len();
        let mut response = Some(response);
        for (i, mut request) in matches.into_iter().enumerate() {
            let stanza = if i + 1 == count {
                response.take()
            } else {
                response.clone()
            };
            if let Some(stanza) = stanza {
                request.process(stanza, &self.callbacks);
            }
        }
        count
    }

    fn take_matching(&mut self, id: &str) -> Vec<Box<dyn OutstandingRequest>> {
        let mut matches = Vec::new();
        for collection in [&mut self.in_flight, &mut self.pending_to_send] {
            let mut i = 0;
            while i < collection.len() {
                if collection[i].id() == id {
                    matches.push(collection.remove(i));
                } else {
                    i += 1;
                }
            }
        }
        matches
    }

    fn send_or_park(&mut self, mut request: Box<dyn OutstandingRequest>, transport: &mut dyn Transport) {
        match request.send(transport, self.codec.as_ref()) {
            Ok(()) => self.in_flight.push(request),
            Err(e) => {
                tracing::warn!(id = %request.id(), error = %e, "send failed, holding request");
                self.pending_to_send.push(request);
            }
        }
    }
}
