//! Connection manager for the chat broker.
//!
//! Owns one logical STOMP session over an unreliable transport, exposes
//! subscribe/publish on top of it, and reconnects with exponential backoff
//! on transient failures. After a permanent failure, or once the retry
//! budget is spent, it disables itself until [`ConnectionManager::disconnect`].
//!
//! Nothing here returns an error to the caller. Failures reach the
//! `on_error` callback or degrade to no-ops, so callers can always fall
//! back to polling.
//!
//! Subscriptions do not survive a reconnect: re-issue them from the
//! `on_connected` callback. A callback that needs the manager should capture
//! a [`WeakConnectionManager`]; the manager keeps its callbacks until
//! `disconnect()`, so a strong clone would keep it alive until then.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use rentchat_protocol::Frame;

use crate::auth::TokenProvider;
use crate::config::{ConfigError, ConnectionConfig, Endpoint};
use crate::error::{ConnectError, FailureClass, TransportError};
use crate::reconnection::ReconnectTimer;
use crate::session::{self, ConnectRequest, Session, SessionHandle};
use crate::subscriptions::{Subscription, SubscriptionRegistry};
use crate::transport::TransportFactory;
use crate::types::{ConnectionEvent, ConnectionState, OnConnected, OnError, OnMessage};

/// Capacity of the event channel returned by [`ConnectionManager::take_events`].
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Callbacks registered by the most recent `connect()`; reused by retries.
#[derive(Clone, Default)]
struct Callbacks {
    on_connected: Option<OnConnected>,
    on_error: Option<OnError>,
}

impl Callbacks {
    fn connected(&self) {
        if let Some(cb) = &self.on_connected {
            cb();
        }
    }

    fn error(&self, err: &ConnectError) {
        if let Some(cb) = &self.on_error {
            cb(err);
        }
    }
}

/// Mutable manager state. Guarded by one mutex that is never held across
/// an `.await` or while user callbacks run.
struct Inner {
    state: ConnectionState,
    reconnect_attempts: u32,
    /// Set by the first failure report of an attempt; later reports for
    /// the same attempt are ignored until the retry starts.
    reconnect_in_progress: bool,
    /// Set once the terminal failure has been reported.
    terminal_reported: bool,
    /// Bumped by every new attempt and by `disconnect()`. Work tagged with
    /// an older generation is stale.
    generation: u64,
    /// Cancels the negotiation of the current attempt.
    attempt: Option<CancellationToken>,
    timer: ReconnectTimer,
    session: Option<SessionHandle>,
    subscriptions: SubscriptionRegistry,
    callbacks: Callbacks,
}

impl Inner {
    fn live_session(&self) -> Option<&SessionHandle> {
        match (&self.state, &self.session) {
            (ConnectionState::Connected, Some(s)) if s.is_open() => Some(s),
            _ => None,
        }
    }

    fn drop_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
    }

    fn cancel_attempt(&mut self) {
        if let Some(attempt) = self.attempt.take() {
            attempt.cancel();
        }
    }
}

pub(crate) struct Shared {
    config: ConnectionConfig,
    endpoint: Endpoint,
    factory: Arc<dyn TransportFactory>,
    tokens: Arc<dyn TokenProvider>,
    inner: Mutex<Inner>,
    events_tx: mpsc::Sender<ConnectionEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<ConnectionEvent>>>,
}

/// Long-lived, cheaply cloneable handle to one chat connection.
///
/// `connect()` spawns onto the current Tokio runtime and must be called
/// from within one.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

/// Non-owning handle to a [`ConnectionManager`], for use inside its own
/// callbacks.
#[derive(Clone)]
pub struct WeakConnectionManager {
    shared: Weak<Shared>,
}

impl WeakConnectionManager {
    /// Returns the manager if it is still alive.
    pub fn upgrade(&self) -> Option<ConnectionManager> {
        self.shared.upgrade().map(|shared| ConnectionManager { shared })
    }
}

impl ConnectionManager {
    /// Creates a disconnected manager.
    pub fn new(
        config: ConnectionConfig,
        factory: Arc<dyn TransportFactory>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, ConfigError> {
        let endpoint = config.endpoint()?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                endpoint,
                factory,
                tokens,
                inner: Mutex::new(Inner {
                    state: ConnectionState::Disconnected,
                    reconnect_attempts: 0,
                    reconnect_in_progress: false,
                    terminal_reported: false,
                    generation: 0,
                    attempt: None,
                    timer: ReconnectTimer::default(),
                    session: None,
                    subscriptions: SubscriptionRegistry::default(),
                    callbacks: Callbacks::default(),
                }),
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
            }),
        })
    }

    pub fn downgrade(&self) -> WeakConnectionManager {
        WeakConnectionManager {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<ConnectionEvent>> {
        self.shared
            .events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Broker endpoint this manager connects to.
    pub fn endpoint_url(&self) -> &str {
        &self.shared.endpoint.url
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// `true` iff a session is established and its link is still open.
    pub fn connected(&self) -> bool {
        self.shared.lock().live_session().is_some()
    }

    /// Consecutive failed attempts since the last successful session.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.lock().reconnect_attempts
    }

    /// `true` while a reconnect timer is armed.
    pub fn reconnect_pending(&self) -> bool {
        self.shared.lock().timer.is_pending()
    }

    /// Number of active subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.shared.lock().subscriptions.len()
    }

    /// Starts connecting in the background.
    ///
    /// - Disabled: does nothing, invokes nothing.
    /// - Connected: invokes `on_connected` right away.
    /// - Connecting: keeps the attempt in flight; the new callbacks replace
    ///   the old ones.
    /// - No token: invokes `on_error` with [`ConnectError::Unauthenticated`]
    ///   and leaves the state alone.
    pub fn connect(&self, on_connected: Option<OnConnected>, on_error: Option<OnError>) {
        self.shared.connect(Callbacks {
            on_connected,
            on_error,
        });
    }

    /// Tears everything down and resets the retry policy. Safe from any
    /// state and idempotent.
    ///
    /// Aborts an attempt still negotiating and forgets the callbacks of the
    /// last `connect()`.
    pub fn disconnect(&self) {
        self.shared.disconnect();
    }

    /// Subscribes `on_message` to `destination`.
    ///
    /// Returns a no-op handle when not connected. A destination that is
    /// already subscribed returns the existing handle and keeps the
    /// original handler. Payloads that are not valid JSON are dropped.
    pub fn subscribe<F>(&self, destination: &str, on_message: F) -> Subscription
    where
        F: Fn(serde_json::Value) + Send + Sync + 'static,
    {
        Shared::subscribe(&self.shared, destination, Arc::new(on_message))
    }

    /// Sends `payload` as JSON to `destination`.
    ///
    /// Dropped silently when not connected; nothing is queued.
    pub fn publish<T: Serialize + ?Sized>(&self, destination: &str, payload: &T) {
        let body = match serde_json::to_string(payload) {
            Ok(body) => body,
            Err(e) => {
                warn!(destination, error = %e, "failed to serialize payload, dropping publish");
                return;
            }
        };

        let inner = self.shared.lock();
        match inner.live_session() {
            Some(session) => {
                trace!(destination, bytes = body.len(), "publishing");
                session.send(&Frame::send_json(destination, body));
            }
            None => debug!(destination, state = %inner.state, "not connected, dropping publish"),
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ConnectionEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            trace!("connection event not delivered: {e}");
        }
    }

    fn set_state(&self, inner: &mut Inner, state: ConnectionState) {
        if inner.state != state {
            debug!(from = %inner.state, to = %state, "connection state changed");
            inner.state = state;
            self.emit(ConnectionEvent::StateChanged(state));
        }
    }

    fn report(&self, callbacks: &Callbacks, err: &ConnectError) {
        self.emit(ConnectionEvent::Failed(err.clone()));
        callbacks.error(err);
    }

    fn connect(self: &Arc<Self>, callbacks: Callbacks) {
        let mut inner = self.lock();
        let state = inner.state;
        match state {
            ConnectionState::Disabled => {
                debug!("connection disabled, ignoring connect");
                return;
            }
            ConnectionState::Connected if inner.live_session().is_some() => {
                drop(inner);
                callbacks.connected();
                return;
            }
            ConnectionState::Connecting => {
                debug!("connect already in progress");
                inner.callbacks = callbacks;
                return;
            }
            _ => {}
        }

        // A manual connect supersedes a pending retry.
        inner.timer.cancel();
        inner.reconnect_in_progress = false;
        self.start_attempt(inner, callbacks);
    }

    /// Called by the reconnect timer.
    fn retry(self: &Arc<Self>, generation: u64) {
        let mut inner = self.lock();
        if inner.generation != generation || inner.state != ConnectionState::Disconnected {
            debug!(generation, "stale reconnect timer, ignoring");
            return;
        }
        inner.timer.clear();
        inner.reconnect_in_progress = false;
        let callbacks = inner.callbacks.clone();
        info!(attempt = inner.reconnect_attempts, "reconnecting");
        self.start_attempt(inner, callbacks);
    }

    fn start_attempt(self: &Arc<Self>, mut inner: MutexGuard<'_, Inner>, callbacks: Callbacks) {
        let token = match self.tokens.token() {
            Some(t) if !t.is_empty() => t,
            _ => {
                drop(inner);
                warn!("no auth token, not connecting");
                self.report(&callbacks, &ConnectError::Unauthenticated);
                return;
            }
        };

        // A dead session left behind in Connected is replaced here.
        inner.drop_session();
        inner.subscriptions.drain();
        inner.cancel_attempt();
        let cancel = CancellationToken::new();
        inner.attempt = Some(cancel.clone());
        inner.generation += 1;
        let generation = inner.generation;
        inner.callbacks = callbacks;
        self.set_state(&mut inner, ConnectionState::Connecting);
        drop(inner);

        tokio::spawn(Arc::clone(self).run_attempt(generation, token, cancel));
    }

    async fn run_attempt(
        self: Arc<Self>,
        generation: u64,
        token: String,
        cancel: CancellationToken,
    ) {
        let session = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(generation, "attempt cancelled");
                return;
            }
            result = self.negotiate(&token, &cancel) => match result {
                Ok(session) => session,
                Err(e) => {
                    warn!(error = %e, "connection attempt failed");
                    self.handle_failure(generation, e);
                    return;
                }
            },
        };

        let callbacks = {
            let mut inner = self.lock();
            if inner.generation == generation && inner.state == ConnectionState::Connecting {
                inner.session = Some(session.handle());
                inner.reconnect_attempts = 0;
                inner.reconnect_in_progress = false;
                inner.terminal_reported = false;
                self.set_state(&mut inner, ConnectionState::Connected);
                Some(inner.callbacks.clone())
            } else {
                None
            }
        };
        let Some(callbacks) = callbacks else {
            debug!(generation, "attempt superseded, closing new session");
            session.handle().close();
            // Let the session tear its link down.
            let _ = session.run(|_| {}).await;
            return;
        };

        info!(url = %self.endpoint.url, "connected to chat broker");
        callbacks.connected();

        let dispatcher = Arc::clone(&self);
        match session.run(move |frame| dispatcher.dispatch(frame)).await {
            Ok(()) => debug!(generation, "session closed"),
            Err(e) => {
                warn!(error = %e, "session lost");
                self.handle_failure(generation, e);
            }
        }
    }

    /// Opens the transport and runs the STOMP handshake, both bounded by
    /// `handshake_timeout`.
    ///
    /// Cancelling `cancel` closes a link that is already open.
    async fn negotiate(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<Session, ConnectError> {
        let deadline = Instant::now() + self.config.handshake_timeout;
        debug!(url = %self.endpoint.url, "opening transport");

        let opening = self.factory.open(&self.endpoint.url);
        let link = match tokio::time::timeout_at(deadline, opening).await {
            Ok(link) => link?,
            Err(_) => return Err(TransportError::HandshakeTimeout.into()),
        };

        // Tie the link to the attempt: `disconnect()` or a newer attempt
        // closes it, even mid-handshake.
        let closer = link.closer();
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::select! {
                    _ = cancel.cancelled() => closer.cancel(),
                    _ = closer.cancelled() => {}
                }
            }
        });

        let request = ConnectRequest {
            host: &self.endpoint.host,
            token,
            heartbeat: self.config.heartbeat,
            timeout: deadline.saturating_duration_since(Instant::now()),
        };
        session::handshake(link, request).await
    }

    /// Routes a MESSAGE frame to its subscriber.
    fn dispatch(&self, frame: Frame) {
        let handler = self
            .lock()
            .subscriptions
            .handler_for(frame.get("subscription"), frame.get("destination"));
        let Some(handler) = handler else {
            trace!(destination = ?frame.get("destination"), "no subscriber for message");
            return;
        };

        match serde_json::from_str::<serde_json::Value>(&frame.body) {
            Ok(payload) => handler(payload),
            Err(e) => debug!(error = %e, "dropping malformed message payload"),
        }
    }

    /// Applies the retry policy to a failed attempt or a lost session.
    pub(crate) fn handle_failure(self: &Arc<Self>, generation: u64, err: ConnectError) {
        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(generation, error = %err, "ignoring failure from superseded attempt");
            return;
        }
        if inner.state == ConnectionState::Disabled {
            return;
        }
        if inner.reconnect_in_progress {
            debug!(error = %err, "reconnect already in progress");
            return;
        }
        inner.reconnect_in_progress = true;

        inner.drop_session();
        // The broker forgot these along with the session.
        inner.subscriptions.drain();
        let callbacks = inner.callbacks.clone();
        let max_attempts = self.config.reconnect.max_attempts;

        let terminal = match err.class() {
            FailureClass::Permanent => {
                warn!(error = %err, "permanent failure, disabling connection");
                err
            }
            FailureClass::Transient if inner.reconnect_attempts >= max_attempts => {
                warn!(
                    attempts = inner.reconnect_attempts,
                    error = %err,
                    "reconnect attempts exhausted, disabling connection"
                );
                ConnectError::Exhausted {
                    attempts: inner.reconnect_attempts,
                    last: Box::new(err),
                }
            }
            FailureClass::Transient => {
                inner.reconnect_attempts += 1;
                let attempt = inner.reconnect_attempts;
                let delay = self.config.reconnect.delay_for_attempt(attempt);
                info!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "scheduling reconnect"
                );
                self.set_state(&mut inner, ConnectionState::Disconnected);
                let weak = Arc::downgrade(self);
                inner.timer.schedule(delay, move || {
                    if let Some(shared) = weak.upgrade() {
                        shared.retry(generation);
                    }
                });
                self.emit(ConnectionEvent::Reconnecting { attempt, delay });
                drop(inner);
                self.report(&callbacks, &err);
                return;
            }
        };

        inner.timer.cancel();
        self.set_state(&mut inner, ConnectionState::Disabled);
        let first_report = !inner.terminal_reported;
        inner.terminal_reported = true;
        drop(inner);

        if first_report {
            self.report(&callbacks, &terminal);
        }
    }

    fn disconnect(&self) {
        let mut inner = self.lock();
        if inner.timer.cancel() {
            debug!("cancelled pending reconnect");
        }

        inner.cancel_attempt();
        inner.callbacks = Callbacks::default();

        let ids = inner.subscriptions.drain();
        if let Some(session) = inner.session.take() {
            if session.is_open() {
                for id in &ids {
                    session.send(&Frame::unsubscribe(id));
                }
                session.send(&Frame::disconnect());
            }
            session.close();
        }

        inner.reconnect_attempts = 0;
        inner.reconnect_in_progress = false;
        inner.terminal_reported = false;
        inner.generation += 1;
        self.set_state(&mut inner, ConnectionState::Disconnected);
        debug!(released = ids.len(), "disconnected");
    }

    fn subscribe(self: &Arc<Self>, destination: &str, handler: OnMessage) -> Subscription {
        let mut inner = self.lock();
        let Some(session) = inner.live_session().cloned() else {
            debug!(destination, state = %inner.state, "not connected, subscribe is a no-op");
            return Subscription::noop();
        };

        if let Some(id) = inner.subscriptions.id_for(destination) {
            trace!(destination, id, "already subscribed");
            return Subscription::active(self, destination, id);
        }

        let id = inner.subscriptions.insert(destination, handler);
        session.send(&Frame::subscribe(&id, destination));
        debug!(destination, %id, "subscribed");
        Subscription::active(self, destination, &id)
    }

    pub(crate) fn unsubscribe(&self, destination: &str, id: &str) {
        let mut inner = self.lock();
        if !inner.subscriptions.remove(destination, id) {
            return;
        }
        if let Some(session) = inner.live_session() {
            session.send(&Frame::unsubscribe(id));
        }
        debug!(destination, id, "unsubscribed");
    }
}
