// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Session Facade
//!
//! [`Session`] is a cheap handle to a session actor: one tokio task that owns
//! the transport, the connection state machine and the request dispatcher.
//! Every mutation (caller commands, transport events, reconnect timers) is a
//! command processed by that task one at a time.
//!
//! Completions and signals never run on the actor; they are posted to the
//! session's [`CallbackQueue`].
//!
//! # Example
//!
//! ```ignore
//! use stanzalink_core::api::{Session, SessionConfig};
//! use stanzalink_core::auth::Credentials;
//! use stanzalink_core::network::TcpTransport;
//!
//! let session = Session::builder(SessionConfig::with_endpoint("chat.example.org", 5222))
//!     .credentials(Credentials::new("alice", b"secret".to_vec()))
//!     .build(TcpTransport::new())?;
//! session.connect()?;
//!
//! let props: ServerProperties = session
//!     .send_request(Iq::get(SERVER_PROPERTIES_NS, serde_json::Value::Null))
//!     .await?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::config::SessionConfig;
use super::error::{SessionError, SessionResult};
use super::events::{EventDispatcher, EventHandler, SessionEvent};
use crate::auth::{AuthFailureReason, AuthOutcome, ConnectionPayload, Credentials};
use crate::connection::{ConnectionMachine, ConnectionStateCell, ReconnectStep};
use crate::context::CallbackQueue;
use crate::network::{
    verify_pin, ConnectionState, Iq, JsonCodec, PinnedKey, RequestError, StanzaCodec, Transport,
    TransportDelegate,
};
use crate::request::{OutstandingRequest, Request, RequestDispatcher};

/// Work items processed by the session actor.
enum SessionCommand {
    Connect,
    Disconnect { immediate: bool },
    SetCredentials(Option<Credentials>),
    Enqueue(Box<dyn OutstandingRequest>),
    Cancel(String),
    Subscribe(Arc<dyn EventHandler>),
    Transport { generation: u64, event: TransportEvent },
    ReconnectTimer { epoch: u64 },
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

enum TransportEvent {
    StateChanged(ConnectionState),
    Authenticated(AuthOutcome),
    Frame(Vec<u8>),
    PeerKeyRejected(PinnedKey),
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    config: SessionConfig,
    credentials: Option<Credentials>,
    codec: Arc<dyn StanzaCodec>,
    callbacks: Option<CallbackQueue>,
}

impl SessionBuilder {
    /// Sets the initial credentials.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Replaces the default JSON codec.
    pub fn codec(mut self, codec: Arc<dyn StanzaCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Sets the context completions and signals run on.
    ///
    /// Defaults to a queue on its own tokio task.
    pub fn callbacks(mut self, callbacks: CallbackQueue) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    /// Spawns the session actor around `transport`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build<T: Transport + 'static>(self, transport: T) -> SessionResult<Session> {
        self.config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            SessionError::Configuration("a tokio runtime is required".to_string())
        })?;

        let callbacks = match self.callbacks {
            Some(callbacks) => callbacks,
            None => {
                let (queue, receiver) = CallbackQueue::channel("session-callbacks");
                runtime.spawn(receiver.run());
                queue
            }
        };

        let (commands, inbox) = mpsc::unbounded_channel();
        let state = Arc::new(ConnectionStateCell::new());
        let actor = SessionActor {
            machine: ConnectionMachine::new(state.clone(), self.config.backoff),
            dispatcher: RequestDispatcher::new(self.codec.clone(), callbacks.clone()),
            events: EventDispatcher::new(callbacks.clone()),
            transport: Box::new(transport),
            codec: self.codec,
            credentials: self.credentials,
            pins: self.config.pinned_keys.clone().into(),
            generation: 0,
            timer_epoch: 0,
            reconnect_timer: None,
            commands: commands.downgrade(),
            config: self.config.clone(),
        };
        runtime.spawn(actor.run(inbox));

        Ok(Session {
            commands,
            state,
            callbacks,
            default_retries: self.config.default_retries,
        })
    }
}

/// Handle to a running session.
///
/// Dropping the last handle shuts the session down: the transport is closed
/// and outstanding requests complete with `Aborted`.
pub struct Session {
    commands: mpsc::UnboundedSender<SessionCommand>,
    state: Arc<ConnectionStateCell>,
    callbacks: CallbackQueue,
    default_retries: u32,
}

impl Session {
    /// Starts building a session.
    pub fn builder(config: SessionConfig) -> SessionBuilder {
        SessionBuilder {
            config,
            credentials: None,
            codec: Arc::new(JsonCodec),
            callbacks: None,
        }
    }

    fn send(&self, command: SessionCommand) -> SessionResult<()> {
        self.commands.send(command).map_err(|_| SessionError::Closed)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Receiver observing every connection state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// The context completions and signals are delivered on.
    pub fn callbacks(&self) -> &CallbackQueue {
        &self.callbacks
    }

    /// Retry budget configured for requests built by [`send_request`](Self::send_request).
    pub fn default_retries(&self) -> u32 {
        self.default_retries
    }

    /// Connects, enabling automatic reconnection.
    ///
    /// Does nothing without credentials or after the server declared this
    /// client version expired.
    pub fn connect(&self) -> SessionResult<()> {
        self.send(SessionCommand::Connect)
    }

    /// Closes the connection gracefully. Sent requests with retry budget are
    /// kept for the next connection.
    pub fn disconnect(&self) -> SessionResult<()> {
        self.send(SessionCommand::Disconnect { immediate: false })
    }

    /// Drops the connection at once and aborts every outstanding request.
    pub fn disconnect_immediately(&self) -> SessionResult<()> {
        self.send(SessionCommand::Disconnect { immediate: true })
    }

    /// Assigns credentials.
    ///
    /// `Some` reconnects with the new credentials; `None` disconnects
    /// immediately.
    pub fn set_credentials(&self, credentials: Option<Credentials>) -> SessionResult<()> {
        self.send(SessionCommand::SetCredentials(credentials))
    }

    /// Queues a request and returns its correlation id.
    ///
    /// If the session is closed the request completes with `Aborted`.
    pub fn enqueue<R>(&self, request: R) -> SessionResult<String>
    where
        R: OutstandingRequest + 'static,
    {
        let id = request.id().to_string();
        match self.commands.send(SessionCommand::Enqueue(Box::new(request))) {
            Ok(()) => Ok(id),
            Err(mpsc::error::SendError(SessionCommand::Enqueue(mut request))) => {
                request.cancel_and_prepare_for(false, &self.callbacks);
                Err(SessionError::Closed)
            }
            Err(_) => Err(SessionError::Closed),
        }
    }

    /// Sends an IQ and waits for its typed result.
    pub async fn send_request<T>(&self, iq: Iq) -> Result<T, RequestError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let request = Request::iq_json(iq, move |result| {
            let _ = tx.send(result);
        })
        .with_retries(self.default_retries);

        // A closed session completes the request with `Aborted` itself.
        let _ = self.enqueue(request);
        rx.await.unwrap_or(Err(RequestError::Aborted))
    }

    /// Cancels an outstanding request; it completes with `Aborted`.
    pub fn cancel(&self, request_id: impl Into<String>) -> SessionResult<()> {
        self.send(SessionCommand::Cancel(request_id.into()))
    }

    /// Runs `work` on `context` once the connection state is `state`.
    pub fn execute<F>(&self, state: ConnectionState, context: &CallbackQueue, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.state.execute_when(state, context, work);
    }

    /// Registers a signal handler.
    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) -> SessionResult<()> {
        self.send(SessionCommand::Subscribe(handler))
    }

    /// Registers a closure as a signal handler.
    pub fn on_event<F>(&self, callback: F) -> SessionResult<()>
    where
        F: Fn(SessionEvent) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(super::events::CallbackHandler::new(callback)))
    }

    /// Waits until every command sent before this call has been processed.
    pub async fn flush(&self) -> SessionResult<()> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Flush(tx))?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Stops the actor, closing the transport and aborting outstanding
    /// requests.
    pub async fn shutdown(&self) -> SessionResult<()> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Shutdown(tx))?;
        rx.await.map_err(|_| SessionError::Closed)
    }
}

/// Delegate handed to the transport for one connection attempt.
struct SessionDelegate {
    generation: u64,
    payload: Option<Vec<u8>>,
    pins: Arc<[PinnedKey]>,
    pin_rejected: AtomicBool,
    commands: mpsc::WeakUnboundedSender<SessionCommand>,
}

impl SessionDelegate {
    fn post(&self, event: TransportEvent) {
        if let Some(commands) = self.commands.upgrade() {
            let _ = commands.send(SessionCommand::Transport {
                generation: self.generation,
                event,
            });
        }
    }
}

impl TransportDelegate for SessionDelegate {
    fn connection_payload(&self) -> Option<Vec<u8>> {
        self.payload.clone()
    }

    fn handshake_response(&self, data: &[u8]) -> bool {
        if self.pin_rejected.load(Ordering::SeqCst) {
            return false;
        }
        let outcome = AuthOutcome::from_frame(data);
        let accepted = outcome.is_accepted();
        self.post(TransportEvent::Authenticated(outcome));
        accepted
    }

    fn frame_received(&self, data: Vec<u8>) {
        self.post(TransportEvent::Frame(data));
    }

    fn state_changed(&self, state: ConnectionState) {
        self.post(TransportEvent::StateChanged(state));
    }

    fn peer_static_key_received(&self, key: &[u8]) {
        if verify_pin(key, &self.pins) {
            return;
        }
        self.pin_rejected.store(true, Ordering::SeqCst);
        self.post(TransportEvent::PeerKeyRejected(PinnedKey::from_key(key)));
    }
}

struct SessionActor {
    config: SessionConfig,
    machine: ConnectionMachine,
    dispatcher: RequestDispatcher,
    events: EventDispatcher,
    transport: Box<dyn Transport>,
    codec: Arc<dyn StanzaCodec>,
    credentials: Option<Credentials>,
    pins: Arc<[PinnedKey]>,
    generation: u64,
    timer_epoch: u64,
    reconnect_timer: Option<JoinHandle<()>>,
    commands: mpsc::WeakUnboundedSender<SessionCommand>,
}

impl SessionActor {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<SessionCommand>) {
        tracing::debug!(endpoint = %self.config.endpoint, "session started");
        while let Some(command) = inbox.recv().await {
            if !self.handle(command) {
                return;
            }
        }
        self.close();
    }

    /// Processes one command; returns false once the actor should stop.
    fn handle(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Connect => self.connect(),
            SessionCommand::Disconnect { immediate } => self.disconnect(immediate),
            SessionCommand::SetCredentials(credentials) => self.set_credentials(credentials),
            SessionCommand::Enqueue(request) => {
                let connected = self.machine.is_connected();
                let transport: &mut dyn Transport = self.transport.as_mut();
                self.dispatcher
                    .enqueue(request, connected.then_some(transport));
            }
            SessionCommand::Cancel(id) => {
                if !self.dispatcher.cancel(&id) {
                    tracing::debug!(%id, "cancel: no such request");
                }
            }
            SessionCommand::Subscribe(handler) => self.events.add_handler(handler),
            SessionCommand::Transport { generation, event } => {
                if generation == self.generation {
                    self.transport_event(event);
                } else {
                    tracing::trace!(generation, current = self.generation, "dropping stale transport event");
                }
            }
            SessionCommand::ReconnectTimer { epoch } => self.reconnect_timer_fired(epoch),
            SessionCommand::Flush(reply) => {
                let _ = reply.send(());
            }
            SessionCommand::Shutdown(reply) => {
                self.close();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    // === Lifecycle ===

    fn connect(&mut self) {
        if self.credentials.is_none() {
            tracing::debug!("connect ignored: no credentials");
            return;
        }
        if !self.machine.begin_connect() {
            tracing::info!("connect suppressed: client version expired");
            return;
        }
        self.cancel_reconnect_timer();
        self.start_attempt();
    }

    fn start_attempt(&mut self) {
        if self.machine.state() != ConnectionState::NotConnected {
            tracing::debug!(state = %self.machine.state(), "connection attempt skipped");
            return;
        }
        let Some(credentials) = &self.credentials else {
            return;
        };

        let payload = match ConnectionPayload::new(credentials, &self.config.client)
            .and_then(|payload| payload.to_bytes())
        {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(error = %e, "failed to build connection payload");
                None
            }
        };

        self.generation += 1;
        let delegate = Arc::new(SessionDelegate {
            generation: self.generation,
            payload,
            pins: self.pins.clone(),
            pin_rejected: AtomicBool::new(false),
            commands: self.commands.clone(),
        });

        tracing::debug!(endpoint = %self.config.endpoint, generation = self.generation, "connecting");
        match self.transport.connect(&self.config.endpoint, delegate) {
            Ok(()) => {
                self.machine.transition(ConnectionState::Connecting);
            }
            Err(e) => {
                tracing::warn!(error = %e, "connection attempt failed to start");
                self.schedule_reconnect();
            }
        }
    }

    fn disconnect(&mut self, immediate: bool) {
        self.machine.begin_disconnect();
        self.cancel_reconnect_timer();

        if immediate {
            self.tear_down(false);
            return;
        }
        if self.machine.state() == ConnectionState::NotConnected {
            return;
        }
        let transition = self.machine.transition(ConnectionState::Disconnecting);
        self.dispatcher.cancel_all(true);
        self.transport.disconnect();

        if transition.is_some_and(|t| t.from == ConnectionState::Connected) {
            tracing::info!("connection closed on request");
            self.events.dispatch(SessionEvent::ConnectionLost {
                will_reconnect: false,
            });
        }
    }

    /// Forces `NotConnected` and closes the transport, ignoring whatever the
    /// abandoned attempt reports afterwards.
    fn tear_down(&mut self, retry: bool) {
        let transition = self.machine.transition(ConnectionState::NotConnected);
        self.dispatcher.cancel_all(retry);
        self.transport.disconnect();
        self.generation += 1;

        if transition.is_some_and(|t| t.from == ConnectionState::Connected) {
            self.events.dispatch(SessionEvent::ConnectionLost {
                will_reconnect: retry,
            });
        }
    }

    fn set_credentials(&mut self, credentials: Option<Credentials>) {
        match credentials {
            Some(credentials) => {
                tracing::debug!(user_id = credentials.user_id(), "credentials assigned");
                self.credentials = Some(credentials);
                self.machine.clear_version_expired();
                self.cancel_reconnect_timer();
                if self.machine.state() != ConnectionState::NotConnected {
                    self.tear_down(true);
                }
                self.connect();
            }
            None => {
                tracing::debug!("credentials cleared");
                self.credentials = None;
                self.disconnect(true);
            }
        }
    }

    fn close(&mut self) {
        self.machine.begin_disconnect();
        self.cancel_reconnect_timer();
        self.tear_down(false);
        tracing::debug!("session closed");
    }

    // === Transport events ===

    fn transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::StateChanged(state) => self.transport_state_changed(state),
            TransportEvent::Authenticated(outcome) => self.authenticated(outcome),
            TransportEvent::Frame(data) => match self.codec.decode(&data) {
                Ok(stanza) => {
                    self.dispatcher.handle_response(stanza);
                }
                Err(e) => tracing::warn!(error = %e, "dropping undecodable frame"),
            },
            TransportEvent::PeerKeyRejected(presented) => {
                let fingerprint = presented.to_hex();
                tracing::error!(%fingerprint, "server key does not match any pin");
                self.disconnect(true);
                self.events
                    .dispatch(SessionEvent::PeerKeyRejected { fingerprint });
            }
        }
    }

    fn transport_state_changed(&mut self, state: ConnectionState) {
        match state {
            // Only a successful handshake makes the session Connected.
            ConnectionState::Connected => {}
            ConnectionState::Connecting | ConnectionState::Disconnecting => {
                self.machine.transition(state);
            }
            ConnectionState::NotConnected => self.connection_closed(),
        }
    }

    fn connection_closed(&mut self) {
        let Some(transition) = self.machine.transition(ConnectionState::NotConnected) else {
            return;
        };
        if transition.from == ConnectionState::Disconnecting {
            // connect() arrived while the previous connection was closing.
            if self.machine.should_reconnect() {
                self.start_attempt();
            }
            return;
        }
        if !transition.lost_connection() {
            return;
        }

        self.dispatcher.cancel_all(true);
        let will_reconnect = self.machine.should_reconnect();
        if transition.from == ConnectionState::Connected {
            tracing::info!(will_reconnect, "connection lost");
            self.events
                .dispatch(SessionEvent::ConnectionLost { will_reconnect });
        }
        if will_reconnect {
            self.schedule_reconnect();
        }
    }

    fn authenticated(&mut self, outcome: AuthOutcome) {
        match outcome {
            AuthOutcome::Accepted {
                version_expires_in_days,
            } => {
                if self.machine.state() != ConnectionState::Connecting {
                    tracing::debug!(state = %self.machine.state(), "ignoring late authentication");
                    return;
                }
                self.machine.authenticated();
                self.cancel_reconnect_timer();
                self.machine.transition(ConnectionState::Connected);
                tracing::info!(endpoint = %self.config.endpoint, "connection established");

                let transport: &mut dyn Transport = self.transport.as_mut();
                self.dispatcher.resend_all_pending(Some(transport));
                self.events.dispatch(SessionEvent::ConnectionEstablished);

                if let Some(days) = version_expires_in_days {
                    if days < self.config.expiry_warning_days {
                        tracing::warn!(days, "client version expires soon");
                        self.events.dispatch(SessionEvent::VersionNearExpiry {
                            days_remaining: days,
                        });
                    }
                }
            }
            AuthOutcome::Rejected { reason, message } => {
                tracing::warn!(?reason, %message, "authentication rejected");
                match reason {
                    AuthFailureReason::InvalidClientVersion => {
                        self.machine.mark_version_expired();
                        self.cancel_reconnect_timer();
                        self.dispatcher.cancel_all(false);
                        self.events.dispatch(SessionEvent::VersionExpired { message });
                    }
                    AuthFailureReason::InvalidCredentials | AuthFailureReason::AccountDeleted => {
                        self.credentials = None;
                        self.machine.begin_disconnect();
                        self.cancel_reconnect_timer();
                        self.dispatcher.cancel_all(false);
                        self.events.dispatch(SessionEvent::LoggedOut { reason });
                    }
                    AuthFailureReason::Other => {}
                }
            }
        }
    }

    // === Reconnect ===

    fn schedule_reconnect(&mut self) {
        if !self.machine.should_reconnect() {
            return;
        }
        self.cancel_reconnect_timer();

        let delay = self.machine.next_reconnect_delay();
        self.timer_epoch += 1;
        let epoch = self.timer_epoch;
        let commands = self.commands.clone();
        tracing::debug!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");

        self.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(SessionCommand::ReconnectTimer { epoch });
            }
        }));
    }

    fn cancel_reconnect_timer(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
        // Invalidates a timer that already fired but is still queued.
        self.timer_epoch += 1;
    }

    fn reconnect_timer_fired(&mut self, epoch: u64) {
        if epoch != self.timer_epoch {
            return;
        }
        self.reconnect_timer = None;

        match self.machine.reconnect_step() {
            ReconnectStep::Connect => self.start_attempt(),
            ReconnectStep::Wait => self.schedule_reconnect(),
            ReconnectStep::Abort => tracing::debug!("reconnect chain stopped"),
        }
    }
}
