//! Client connection manager.
//!
//! Owns at most one transport socket at a time and drives it through the
//! connect, authenticate and reconnect lifecycle. Outbound messages sent
//! while the link is not authenticated are parked in a bounded outbox and
//! flushed in order on the next `AUTH_SUCCESS`.
//!
//! Every socket attempt is tagged with an epoch. Callbacks from a session
//! or timer whose epoch no longer matches are ignored, so a superseded
//! socket can never mutate the current state.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::backoff::Backoff;
use super::config::ClientConfig;
use super::events::ClientEvent;
use super::handlers::{HandlerTable, InboundKind};
use super::transport::{Connector, TransportEvent, TransportLink, WsConnector};
use crate::domain::value_objects::{ConnectionState, ErrorWindow, FailureReason};
use crate::shared::error::ClientError;
use crate::shared::protocol::{
    AuthErrorPayload, AuthPayload, Envelope, MessageType, ReconnectRequestPayload,
};
use crate::shared::validation::{message_type, parse_envelope};

const EVENT_CAPACITY: usize = 64;

/// Result of [`ConnectionManager::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to the open, authenticated link.
    Sent,
    /// Parked in the outbox until the next successful handshake.
    Queued,
}

enum FrameOutcome {
    Continue,
    Authenticated,
    Rejected,
    /// The session must stop; whatever follows has already been scheduled.
    Detached,
}

struct Machine {
    state: ConnectionState,
    epoch: u64,
    endpoint: Option<String>,
    token: Option<String>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    pending: VecDeque<String>,
    attempts: u32,
    exhausted: bool,
    server_errors: ErrorWindow,
    session: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
}

struct Shared {
    config: ClientConfig,
    backoff: Backoff,
    connector: Arc<dyn Connector>,
    machine: Mutex<Machine>,
    handlers: RwLock<HandlerTable>,
    state_tx: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ClientEvent>,
}

/// Reconnecting, authenticating client for the sync gateway.
///
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Manager backed by a WebSocket transport.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, Arc::new(WsConnector))
    }

    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let backoff = Backoff::new(config.base_delay, config.max_delay, config.jitter);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let machine = Machine {
            state: ConnectionState::Disconnected,
            epoch: 0,
            endpoint: None,
            token: None,
            outbound: None,
            pending: VecDeque::new(),
            attempts: 0,
            exhausted: false,
            server_errors: ErrorWindow::new(config.max_server_errors, config.server_error_reset),
            session: None,
            reconnect_timer: None,
        };

        Self {
            shared: Arc::new(Shared {
                config,
                backoff,
                connector,
                machine: Mutex::new(machine),
                handlers: RwLock::new(HandlerTable::default()),
                state_tx,
                events,
            }),
        }
    }

    /// Open a socket to `endpoint` and authenticate with `token`.
    ///
    /// Any existing socket is closed first and the retry budget starts
    /// over. Resolves once the first handshake settles: `true` on
    /// `AUTH_SUCCESS`, `false` on rejection, timeout or transport failure.
    /// After a transport failure the manager keeps retrying in the
    /// background.
    pub async fn connect(&self, endpoint: &str, token: &str) -> Result<bool, ClientError> {
        if endpoint.trim().is_empty() {
            return Err(ClientError::Configuration("endpoint is required".into()));
        }
        if token.is_empty() {
            return Err(ClientError::Configuration("credential token is required".into()));
        }

        let done = {
            let mut m = self.shared.machine.lock();
            self.shared.teardown(&mut m);
            m.endpoint = Some(endpoint.to_string());
            m.token = Some(token.to_string());
            m.attempts = 0;
            m.exhausted = false;
            m.server_errors.reset();
            self.shared.start_attempt(&mut m)
        };

        Ok(done.await.unwrap_or(false))
    }

    /// Deliver `envelope` now if connected, otherwise park it in the outbox.
    pub fn send(&self, envelope: &Envelope) -> Result<SendOutcome, ClientError> {
        let text = envelope.to_text()?;
        let mut m = self.shared.machine.lock();

        let text = match (&m.state, &m.outbound) {
            (ConnectionState::Connected, Some(outbound)) => match outbound.send(text) {
                Ok(()) => return Ok(SendOutcome::Sent),
                Err(mpsc::error::SendError(text)) => text,
            },
            _ => text,
        };

        let capacity = self.shared.config.max_pending_messages.max(1);
        if m.pending.len() >= capacity {
            m.pending.pop_front();
            tracing::warn!(capacity, "Outbox full, dropped oldest message");
        }
        m.pending.push_back(text);
        Ok(SendOutcome::Queued)
    }

    /// Register a handler for an inbound message type.
    pub fn on<F>(&self, kind: InboundKind, handler: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.shared.handlers.write().register(kind, Arc::new(handler));
    }

    /// Close the socket and cancel timers. Handlers and the outbox survive.
    pub fn disconnect(&self) {
        let mut m = self.shared.machine.lock();
        self.shared.teardown(&mut m);
        m.attempts = 0;
        m.exhausted = false;
        m.server_errors.reset();
        self.shared.set_state(&mut m, ConnectionState::Disconnected);
    }

    /// Tear everything down: socket, timers, outbox, counters and handlers.
    /// Safe to call repeatedly.
    pub fn cleanup(&self) {
        {
            let mut m = self.shared.machine.lock();
            self.shared.teardown(&mut m);
            m.pending.clear();
            m.attempts = 0;
            m.exhausted = false;
            m.server_errors.reset();
            m.endpoint = None;
            m.token = None;
            self.shared.set_state(&mut m, ConnectionState::Disconnected);
        }
        self.shared.handlers.write().clear();
        tracing::debug!("Connection manager cleaned up");
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state_tx.borrow().clone()
    }

    /// Receiver that always holds the latest state.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    pub fn pending_len(&self) -> usize {
        self.shared.machine.lock().pending.len()
    }

    /// Reconnect attempts scheduled since the last successful handshake.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.machine.lock().attempts
    }

    pub fn server_error_count(&self) -> u32 {
        self.shared.machine.lock().server_errors.count(Instant::now())
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn set_state(&self, m: &mut Machine, state: ConnectionState) {
        if m.state == state {
            return;
        }
        tracing::debug!(from = %m.state, to = %state, "Connection state changed");
        m.state = state.clone();
        self.state_tx.send_replace(state.clone());
        let _ = self.events.send(ClientEvent::StateChanged(state));
    }

    /// Invalidate the current epoch and drop its socket and timer.
    fn teardown(&self, m: &mut Machine) {
        m.epoch += 1;
        m.outbound = None;
        if let Some(session) = m.session.take() {
            session.abort();
        }
        if let Some(timer) = m.reconnect_timer.take() {
            timer.abort();
        }
    }

    /// Forget the current socket from inside its own session task.
    fn detach(&self, m: &mut Machine) {
        m.outbound = None;
        m.session = None;
    }

    fn lose_link(self: &Arc<Self>, m: &mut Machine) {
        self.detach(m);
        if m.state.is_retryable() {
            self.schedule_reconnect(m, None);
        }
    }

    fn start_attempt(self: &Arc<Self>, m: &mut Machine) -> oneshot::Receiver<bool> {
        m.epoch += 1;
        let epoch = m.epoch;
        let endpoint = m.endpoint.clone().unwrap_or_default();
        let token = m.token.clone().unwrap_or_default();
        self.set_state(m, ConnectionState::Connecting);

        let (done_tx, done_rx) = oneshot::channel();
        let shared = Arc::clone(self);
        m.session = Some(tokio::spawn(shared.run_session(epoch, endpoint, token, done_tx)));
        done_rx
    }

    fn schedule_reconnect(self: &Arc<Self>, m: &mut Machine, requested: Option<Duration>) {
        let max_attempts = self.config.max_reconnect_attempts;
        if m.attempts >= max_attempts {
            if !m.exhausted {
                m.exhausted = true;
                tracing::error!(attempts = m.attempts, "Max reconnect attempts reached");
                let _ = self.events.send(ClientEvent::MaxReconnectAttempts {
                    attempts: m.attempts,
                });
            }
            self.set_state(
                m,
                ConnectionState::Error {
                    reason: FailureReason::MaxReconnectAttempts,
                },
            );
            return;
        }

        let delay = requested.unwrap_or_else(|| self.backoff.delay(m.attempts));
        m.attempts += 1;
        tracing::info!(
            attempt = m.attempts,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );
        self.set_state(
            m,
            ConnectionState::Reconnecting {
                attempt: m.attempts,
                max_attempts,
            },
        );

        if let Some(timer) = m.reconnect_timer.take() {
            timer.abort();
        }
        let epoch = m.epoch;
        let shared = Arc::clone(self);
        m.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.on_reconnect_timer(epoch);
        }));
    }

    fn on_reconnect_timer(self: &Arc<Self>, epoch: u64) {
        let mut m = self.machine.lock();
        if m.epoch != epoch || !matches!(m.state, ConnectionState::Reconnecting { .. }) {
            return;
        }
        m.reconnect_timer = None;
        // Nobody awaits a background attempt.
        let _ = self.start_attempt(&mut m);
    }

    async fn run_session(
        self: Arc<Self>,
        epoch: u64,
        endpoint: String,
        token: String,
        done: oneshot::Sender<bool>,
    ) {
        let mut done = Some(done);

        let TransportLink {
            outbound,
            mut events,
        } = match self.connector.open(&endpoint).await {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(error = %e, endpoint = %endpoint, "Failed to open transport");
                self.on_transport_lost(epoch);
                resolve(&mut done, false);
                return;
            }
        };

        if !self.begin_handshake(epoch, &outbound, &token) {
            resolve(&mut done, false);
            return;
        }

        let deadline = tokio::time::sleep(self.config.auth_timeout);
        tokio::pin!(deadline);
        let mut authenticating = true;

        loop {
            tokio::select! {
                _ = &mut deadline, if authenticating => {
                    self.on_auth_timeout(epoch);
                    resolve(&mut done, false);
                    return;
                }
                event = events.recv() => {
                    let outcome = match event {
                        Some(TransportEvent::Message(text)) => self.on_frame(epoch, &outbound, &text),
                        Some(TransportEvent::Error(e)) => {
                            tracing::warn!(error = %e, "Transport error");
                            self.on_transport_lost(epoch);
                            FrameOutcome::Detached
                        }
                        Some(TransportEvent::Closed) | None => {
                            tracing::info!("Transport closed");
                            self.on_transport_lost(epoch);
                            FrameOutcome::Detached
                        }
                    };

                    match outcome {
                        FrameOutcome::Continue => {}
                        FrameOutcome::Authenticated => {
                            authenticating = false;
                            resolve(&mut done, true);
                        }
                        FrameOutcome::Rejected | FrameOutcome::Detached => {
                            resolve(&mut done, false);
                            return;
                        }
                    }
                }
            }
        }
    }

    fn begin_handshake(
        self: &Arc<Self>,
        epoch: u64,
        outbound: &mpsc::UnboundedSender<String>,
        token: &str,
    ) -> bool {
        let payload = AuthPayload {
            token: token.to_string(),
        };
        let auth = Envelope::with_payload(MessageType::Auth, &payload).and_then(|e| e.to_text());

        let mut m = self.machine.lock();
        if m.epoch != epoch {
            return false;
        }

        let sent = match auth {
            Ok(text) => outbound.send(text).is_ok(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize AUTH");
                false
            }
        };
        if !sent {
            self.lose_link(&mut m);
            return false;
        }

        self.set_state(&mut m, ConnectionState::Authenticating);
        true
    }

    fn on_frame(
        self: &Arc<Self>,
        epoch: u64,
        outbound: &mpsc::UnboundedSender<String>,
        text: &str,
    ) -> FrameOutcome {
        if self.machine.lock().epoch != epoch {
            return FrameOutcome::Detached;
        }

        let envelope = match parse_envelope(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed server message");
                return FrameOutcome::Continue;
            }
        };
        let kind = match message_type(&envelope) {
            Ok(kind) => kind,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring server message");
                return FrameOutcome::Continue;
            }
        };
        let payload = envelope.payload_or_null();

        match kind {
            MessageType::AuthSuccess => self.on_auth_success(epoch, outbound),
            MessageType::AuthError => {
                let reason = serde_json::from_value::<AuthErrorPayload>(payload.clone())
                    .unwrap_or_default()
                    .describe();
                self.on_auth_rejected(epoch, reason)
            }
            MessageType::SysPing => {
                reply(outbound, MessageType::SysPong);
                FrameOutcome::Continue
            }
            MessageType::Heartbeat => {
                reply(outbound, MessageType::HeartbeatAck);
                self.notify(InboundKind::Heartbeat, payload);
                FrameOutcome::Continue
            }
            MessageType::SysError => self.on_server_error(epoch, payload),
            MessageType::ReconnectRequest => {
                let delay = serde_json::from_value::<ReconnectRequestPayload>(payload.clone())
                    .unwrap_or_default()
                    .delay
                    .map(Duration::from_millis);
                self.on_reconnect_request(epoch, delay)
            }
            MessageType::GameStateUpdate => {
                self.notify(InboundKind::GameStateUpdate, payload);
                FrameOutcome::Continue
            }
            MessageType::EnvImpactUpdate => {
                self.notify(InboundKind::EnvImpactUpdate, payload);
                FrameOutcome::Continue
            }
            MessageType::TeamUpdate => {
                self.notify(InboundKind::TeamUpdate, payload);
                FrameOutcome::Continue
            }
            MessageType::RoomUpdate => {
                self.notify(InboundKind::RoomUpdate, payload);
                FrameOutcome::Continue
            }
            MessageType::Auth
            | MessageType::GameAction
            | MessageType::EnvAction
            | MessageType::TeamAction
            | MessageType::JoinRoom
            | MessageType::LeaveRoom
            | MessageType::SysPong
            | MessageType::HeartbeatAck => {
                tracing::debug!(kind = %kind, "Ignoring server-bound message type");
                FrameOutcome::Continue
            }
        }
    }

    fn on_auth_success(
        self: &Arc<Self>,
        epoch: u64,
        outbound: &mpsc::UnboundedSender<String>,
    ) -> FrameOutcome {
        let mut m = self.machine.lock();
        if m.epoch != epoch {
            return FrameOutcome::Detached;
        }
        if m.state.is_connected() {
            return FrameOutcome::Continue;
        }

        m.attempts = 0;
        m.exhausted = false;
        m.server_errors.reset();
        m.outbound = Some(outbound.clone());
        self.set_state(&mut m, ConnectionState::Connected);

        // Flushed under the lock so concurrent sends land after the backlog.
        let mut flushed = 0usize;
        while let Some(text) = m.pending.pop_front() {
            if let Err(mpsc::error::SendError(text)) = outbound.send(text) {
                m.pending.push_front(text);
                break;
            }
            flushed += 1;
        }

        tracing::info!(flushed, "Connection authenticated");
        FrameOutcome::Authenticated
    }

    fn on_auth_rejected(self: &Arc<Self>, epoch: u64, reason: String) -> FrameOutcome {
        let mut m = self.machine.lock();
        if m.epoch != epoch {
            return FrameOutcome::Detached;
        }
        tracing::warn!(reason = %reason, "Authentication rejected");
        self.detach(&mut m);
        self.set_state(
            &mut m,
            ConnectionState::Error {
                reason: FailureReason::AuthRejected(reason),
            },
        );
        FrameOutcome::Rejected
    }

    fn on_auth_timeout(self: &Arc<Self>, epoch: u64) {
        let mut m = self.machine.lock();
        if m.epoch != epoch {
            return;
        }
        tracing::warn!(
            timeout_ms = self.config.auth_timeout.as_millis() as u64,
            "Authentication timed out"
        );
        self.detach(&mut m);
        self.set_state(
            &mut m,
            ConnectionState::Error {
                reason: FailureReason::AuthTimeout,
            },
        );
    }

    fn on_transport_lost(self: &Arc<Self>, epoch: u64) {
        let mut m = self.machine.lock();
        if m.epoch != epoch {
            return;
        }
        self.lose_link(&mut m);
    }

    fn on_server_error(self: &Arc<Self>, epoch: u64, payload: &Value) -> FrameOutcome {
        self.notify(InboundKind::SysError, payload);

        let mut m = self.machine.lock();
        if m.epoch != epoch {
            return FrameOutcome::Detached;
        }
        if !m.state.is_connected() {
            return FrameOutcome::Continue;
        }

        let now = Instant::now();
        let count = m.server_errors.record(now);
        let _ = self.events.send(ClientEvent::ServerError {
            count,
            payload: payload.clone(),
        });
        if !m.server_errors.exceeded(now) {
            return FrameOutcome::Continue;
        }

        tracing::warn!(count, "Server error threshold reached, reconnecting");
        self.lose_link(&mut m);
        FrameOutcome::Detached
    }

    fn on_reconnect_request(self: &Arc<Self>, epoch: u64, delay: Option<Duration>) -> FrameOutcome {
        let mut m = self.machine.lock();
        if m.epoch != epoch {
            return FrameOutcome::Detached;
        }
        tracing::info!(delay_ms = ?delay.map(|d| d.as_millis() as u64), "Server requested reconnect");
        self.detach(&mut m);
        if m.state.is_retryable() {
            self.schedule_reconnect(&mut m, delay);
        }
        FrameOutcome::Detached
    }

    fn notify(&self, kind: InboundKind, payload: &Value) {
        let handlers = self.handlers.read().handlers_for(kind);
        for handler in handlers {
            handler(payload);
        }
    }
}

fn resolve(done: &mut Option<oneshot::Sender<bool>>, authenticated: bool) {
    if let Some(tx) = done.take() {
        let _ = tx.send(authenticated);
    }
}

fn reply(outbound: &mpsc::UnboundedSender<String>, kind: MessageType) {
    match Envelope::bare(kind).to_text() {
        Ok(text) => {
            let _ = outbound.send(text);
        }
        Err(e) => tracing::error!(error = %e, kind = %kind, "Failed to serialize reply"),
    }
}
