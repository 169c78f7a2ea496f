// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Request Lifecycle
//!
//! One [`Request`] per outstanding exchange. Its private state machine is
//!
//! ```text
//! Ready ──send──▶ Sending ──process──▶ Finished
//!   ▲               │
//!   └──requeue──────┘        Ready | Sending ──▶ Cancelled
//! ```
//!
//! `Finished` and `Cancelled` are terminal. The completion is taken out of the
//! request the first time it fires, so it can run at most once; every path
//! into a terminal state fires it, so it runs exactly once.

use std::fmt;

use serde::de::DeserializeOwned;

use crate::context::CallbackQueue;
use crate::network::{
    generate_id, IdKind, Iq, IqType, NetworkError, RequestError, Stanza, StanzaCodec, Transport,
};

/// Request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Built or requeued, not on the wire.
    Ready,
    /// Sent, awaiting a response.
    Sending,
    /// Failed or cancelled; completion already fired.
    Cancelled,
    /// Response processed; completion already fired.
    Finished,
}

impl ReadyState {
    /// Returns true for `Finished` and `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReadyState::Finished | ReadyState::Cancelled)
    }
}

/// What the dispatcher does with a request after a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelDisposition {
    /// Put back into pending-to-send for the next connection.
    Requeue,
    /// The request is done (it completed now or had already completed).
    Done,
}

/// Type-erased view of a request, as held by the dispatcher.
pub trait OutstandingRequest: Send {
    /// Correlation id.
    fn id(&self) -> &str;

    /// Current state.
    fn state(&self) -> ReadyState;

    /// Remaining retry budget.
    fn retries_remaining(&self) -> u32;

    /// Serializes the payload and hands it to the transport.
    ///
    /// Only valid from `Ready`. On failure the request stays `Ready`.
    fn send(
        &mut self,
        transport: &mut dyn Transport,
        codec: &dyn StanzaCodec,
    ) -> Result<(), NetworkError>;

    /// Fails the request because no connection is available.
    fn fail_on_no_connection(&mut self, callbacks: &CallbackQueue);

    /// Handles a lost connection, possibly preparing a resend.
    fn cancel_and_prepare_for(&mut self, retry: bool, callbacks: &CallbackQueue)
        -> CancelDisposition;

    /// Consumes the response and completes the request.
    fn process(&mut self, response: Stanza, callbacks: &CallbackQueue);
}

type Transform<T> = Box<dyn FnOnce(Stanza) -> Result<T, RequestError> + Send + 'static>;
type Completion<T> = Box<dyn FnOnce(Result<T, RequestError>) + Send + 'static>;

/// A typed request/response exchange.
pub struct Request<T> {
    id: String,
    state: ReadyState,
    retries_remaining: u32,
    payload: Stanza,
    transform: Option<Transform<T>>,
    completion: Option<Completion<T>>,
}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("retries_remaining", &self.retries_remaining)
            .finish()
    }
}

impl<T: Send + 'static> Request<T> {
    /// Creates a request.
    ///
    /// The correlation id is taken from `payload`; a stream error frame
    /// without one gets a generated id.
    pub fn new<F, C>(mut payload: Stanza, transform: F, completion: C) -> Self
    where
        F: FnOnce(Stanza) -> Result<T, RequestError> + Send + 'static,
        C: FnOnce(Result<T, RequestError>) + Send + 'static,
    {
        let id = match &mut payload {
            Stanza::Error(frame) => frame
                .id
                .get_or_insert_with(|| generate_id(IdKind::Request))
                .clone(),
            other => other
                .id()
                .map(str::to_owned)
                .unwrap_or_else(|| generate_id(IdKind::Request)),
        };

        Request {
            id,
            state: ReadyState::Ready,
            retries_remaining: 0,
            payload,
            transform: Some(Box::new(transform)),
            completion: Some(Box::new(completion)),
        }
    }

    /// Sets how many connection losses the request survives.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries_remaining = retries;
        self
    }

    /// Returns the payload.
    pub fn payload(&self) -> &Stanza {
        &self.payload
    }

    fn complete(&mut self, result: Result<T, RequestError>, callbacks: &CallbackQueue) {
        if let Some(completion) = self.completion.take() {
            callbacks.execute(move || completion(result));
        }
    }
}

impl<T: DeserializeOwned + Send + 'static> Request<T> {
    /// Creates an IQ request whose `result` body deserializes into `T`.
    ///
    /// Any other response shape completes with
    /// [`RequestError::MalformedResponse`].
    pub fn iq_json<C>(iq: Iq, completion: C) -> Self
    where
        C: FnOnce(Result<T, RequestError>) + Send + 'static,
    {
        Self::new(Stanza::Iq(iq), json_result, completion)
    }
}

fn json_result<T: DeserializeOwned>(response: Stanza) -> Result<T, RequestError> {
    match response {
        Stanza::Iq(iq) if iq.iq_type == IqType::Result => {
            serde_json::from_value(iq.body).map_err(|_| RequestError::MalformedResponse)
        }
        _ => Err(RequestError::MalformedResponse),
    }
}

impl<T: Send + 'static> OutstandingRequest for Request<T> {
    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> ReadyState {
        self.state
    }

    fn retries_remaining(&self) -> u32 {
        self.retries_remaining
    }

    fn send(
        &mut self,
        transport: &mut dyn Transport,
        codec: &dyn StanzaCodec,
    ) -> Result<(), NetworkError> {
        if self.state != ReadyState::Ready {
            return Err(NetworkError::SendFailed(format!(
                "request {} is {:?}",
                self.id, self.state
            )));
        }

        let frame = codec.encode(&self.payload).map_err(|e| {
            tracing::warn!(id = %self.id, error = %e, "failed to serialize request");
            e
        })?;
        transport.send(frame);
        self.state = ReadyState::Sending;
        Ok(())
    }

    fn fail_on_no_connection(&mut self, callbacks: &CallbackQueue) {
        if self.state.is_terminal() {
            return;
        }
        self.state = ReadyState::Cancelled;
        self.complete(Err(RequestError::NotConnected), callbacks);
    }

    fn cancel_and_prepare_for(
        &mut self,
        retry: bool,
        callbacks: &CallbackQueue,
    ) -> CancelDisposition {
        if self.state.is_terminal() {
            return CancelDisposition::Done;
        }

        if retry && self.retries_remaining > 0 {
            if self.state == ReadyState::Sending {
                self.retries_remaining -= 1;
            }
            self.state = ReadyState::Ready;
            return CancelDisposition::Requeue;
        }

        self.state = ReadyState::Cancelled;
        self.complete(Err(RequestError::Aborted), callbacks);
        CancelDisposition::Done
    }

    fn process(&mut self, response: Stanza, callbacks: &CallbackQueue) {
        if self.state.is_terminal() {
            tracing::debug!(id = %self.id, state = ?self.state, "ignoring response for completed request");
            return;
        }
        if self.state == ReadyState::Ready {
            // Answer to an earlier send that was requeued after a connection loss.
            tracing::debug!(id = %self.id, "response arrived for requeued request");
        }
        self.state = ReadyState::Finished;

        let result = match response.error_condition() {
            Some(error) => match error.retry_after {
                Some(seconds) => Err(RequestError::RetryDelay(seconds)),
                None => Err(RequestError::ServerError(error.reason.clone())),
            },
            None => match self.transform.take() {
                Some(transform) => transform(response),
                None => Err(RequestError::MalformedResponse),
            },
        };
        self.complete(result, callbacks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CallbackReceiver;
    use crate::network::{ErrorStanza, JsonCodec, MockTransport, StanzaError};
    use serde::Deserialize;
    use std::sync::{Arc, Mutex};

    type Results<T> = Arc<Mutex<Vec<Result<T, RequestError>>>>;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pong {
        seq: u32,
    }

    fn pong_request(results: &Results<Pong>) -> Request<Pong> {
        let results = results.clone();
        Request::iq_json(Iq::get("ping", serde_json::Value::Null), move |r| {
            results.lock().unwrap().push(r)
        })
    }

    fn setup() -> (CallbackQueue, CallbackReceiver, Results<Pong>) {
        let (queue, receiver) = CallbackQueue::channel("test");
        (queue, receiver, Arc::new(Mutex::new(Vec::new())))
    }

    #[test]
    fn test_send_moves_to_sending() {
        let (_queue, _receiver, results) = setup();
        let mut request = pong_request(&results);
        let mut transport = MockTransport::new();

        request.send(&mut transport, &JsonCodec).unwrap();
        assert_eq!(request.state(), ReadyState::Sending);

        // A second send is refused
        assert!(request.send(&mut transport, &JsonCodec).is_err());
    }

    #[test]
    fn test_process_success_completes_once() {
        let (queue, mut receiver, results) = setup();
        let mut request = pong_request(&results);
        request.send(&mut MockTransport::new(), &JsonCodec).unwrap();

        let response = Stanza::Iq(Iq::result(request.id(), "ping", serde_json::json!({"seq": 7})));
        request.process(response.clone(), &queue);
        request.process(response, &queue);
        receiver.run_pending();

        assert_eq!(request.state(), ReadyState::Finished);
        assert_eq!(*results.lock().unwrap(), vec![Ok(Pong { seq: 7 })]);
    }

    #[test]
    fn test_process_maps_error_conditions() {
        let (queue, mut receiver, results) = setup();

        let mut throttled = pong_request(&results);
        throttled.process(
            Stanza::Iq(Iq::error(throttled.id(), "ping", StanzaError::throttled(30))),
            &queue,
        );

        let mut refused = pong_request(&results);
        refused.process(
            Stanza::Error(ErrorStanza {
                id: Some(refused.id().to_string()),
                error: StanzaError::new("forbidden"),
            }),
            &queue,
        );

        let mut malformed = pong_request(&results);
        malformed.process(
            Stanza::Iq(Iq::result(malformed.id(), "ping", serde_json::json!({"nope": 1}))),
            &queue,
        );

        receiver.run_pending();
        assert_eq!(
            *results.lock().unwrap(),
            vec![
                Err(RequestError::RetryDelay(30)),
                Err(RequestError::ServerError("forbidden".into())),
                Err(RequestError::MalformedResponse),
            ]
        );
    }

    #[test]
    fn test_fail_on_no_connection() {
        let (queue, mut receiver, results) = setup();
        let mut request = pong_request(&results);

        request.fail_on_no_connection(&queue);
        request.fail_on_no_connection(&queue);
        receiver.run_pending();

        assert_eq!(request.state(), ReadyState::Cancelled);
        assert_eq!(*results.lock().unwrap(), vec![Err(RequestError::NotConnected)]);
    }

    #[test]
    fn test_cancel_with_retry_budget_requeues_and_decrements_when_sending() {
        let (queue, mut receiver, results) = setup();
        let mut request = pong_request(&results).with_retries(2);

        // Not yet sent: budget untouched
        assert_eq!(
            request.cancel_and_prepare_for(true, &queue),
            CancelDisposition::Requeue
        );
        assert_eq!(request.retries_remaining(), 2);

        request.send(&mut MockTransport::new(), &JsonCodec).unwrap();
        assert_eq!(
            request.cancel_and_prepare_for(true, &queue),
            CancelDisposition::Requeue
        );
        assert_eq!(request.retries_remaining(), 1);
        assert_eq!(request.state(), ReadyState::Ready);

        receiver.run_pending();
        assert!(results.lock().unwrap().is_empty());
    }

    #[test]
    fn test_cancel_without_retry_aborts() {
        let (queue, mut receiver, results) = setup();
        let mut request = pong_request(&results).with_retries(5);

        assert_eq!(
            request.cancel_and_prepare_for(false, &queue),
            CancelDisposition::Done
        );
        assert_eq!(
            request.cancel_and_prepare_for(true, &queue),
            CancelDisposition::Done
        );
        receiver.run_pending();

        assert_eq!(*results.lock().unwrap(), vec![Err(RequestError::Aborted)]);
    }

    #[test]
    fn test_cancel_after_finish_is_noop() {
        let (queue, mut receiver, results) = setup();
        let mut request = pong_request(&results);
        request.send(&mut MockTransport::new(), &JsonCodec).unwrap();
        request.process(
            Stanza::Iq(Iq::result(request.id(), "ping", serde_json::json!({"seq": 1}))),
            &queue,
        );

        assert_eq!(
            request.cancel_and_prepare_for(false, &queue),
            CancelDisposition::Done
        );
        receiver.run_pending();
        assert_eq!(results.lock().unwrap().len(), 1);
        assert!(results.lock().unwrap()[0].is_ok());
    }

    #[test]
    fn test_error_frame_without_id_gets_generated_id() {
        let request: Request<()> = Request::new(
            Stanza::Error(ErrorStanza {
                id: None,
                error: StanzaError::new("x"),
            }),
            |_| Ok(()),
            |_| {},
        );
        assert!(!request.id().is_empty());
        assert_eq!(request.payload().id(), Some(request.id()));
    }
}
