//! Connection task: the state machine that owns the transport.
//!
//! A single task owns the socket, both registries and the reconnect
//! schedule. Callers talk to it only through [`Command`]s, so every state
//! transition, registry mutation and frame dispatch happens sequentially and
//! needs no locking.
//!
//! ```text
//! Disconnected ─connect()─▶ Connecting ─open─▶ AwaitingHandshake ─connected─▶ Connected
//!       ▲                        ▲                      │                          │
//!       │ give up                │ delay elapsed        └──────── failure ─────────┤
//!       └──────────────── Reconnecting { attempt } ◀──── strategy says retry ──────┘
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

use futures::{future, SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use chatwire_core::error::{CallError, ServerError, TransportError};
use chatwire_core::frame::{decode, encode, Frame};
use chatwire_core::listener::{SubscriptionEvent, SubscriptionId, SubscriptionListener};
use chatwire_core::policy::{ReconnectDecision, ReconnectStrategy};
use chatwire_core::state::{ConnectionEvent, ConnectionState};
use chatwire_core::transport::{CallResult, Replay};

use crate::calls::{CallId, CallRegistry};
use crate::config::ClientConfig;
use crate::connector::{Connector, Inbound, Outbound, WireLink};
use crate::error::ClientError;
use crate::subscriptions::SubscriptionRegistry;

type Dialing = Pin<Box<dyn Future<Output = Result<WireLink, TransportError>> + Send>>;

/// Command sent from client handles to the connection task.
pub(crate) enum Command {
    Connect {
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Call {
        method: String,
        params: Vec<Value>,
        replay: Replay,
        reply: oneshot::Sender<CallResult>,
    },
    Subscribe {
        name: String,
        params: Vec<Value>,
        listener: Weak<dyn SubscriptionListener>,
        reply: oneshot::Sender<SubscriptionId>,
    },
    Unsubscribe {
        id: SubscriptionId,
    },
    SetStrategy(Option<Arc<dyn ReconnectStrategy>>),
    Close {
        reply: oneshot::Sender<()>,
    },
}

pub(crate) struct Connection {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    strategy: Option<Arc<dyn ReconnectStrategy>>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
    calls: CallRegistry,
    subscriptions: SubscriptionRegistry,
    state: ConnectionState,
    session: Option<String>,
    /// Consecutive failed connections since the last handshake.
    attempt: u32,
    dialing: Option<Dialing>,
    sink: Option<Outbound>,
    stream: Option<Inbound>,
    /// When the scheduled reconnect fires.
    retry_at: Option<Instant>,
    /// Handshake deadline while `AwaitingHandshake`, pong deadline while
    /// `Connected`.
    deadline: Option<Instant>,
    ping: Interval,
}

impl Connection {
    pub(crate) fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        cmd_rx: mpsc::UnboundedReceiver<Command>,
        state_tx: watch::Sender<ConnectionState>,
        events: broadcast::Sender<ConnectionEvent>,
    ) -> Self {
        let ping = ping_interval(&config);
        Self {
            strategy: config.reconnect.clone(),
            config,
            connector,
            cmd_rx,
            state_tx,
            events,
            calls: CallRegistry::new(),
            subscriptions: SubscriptionRegistry::new(),
            state: ConnectionState::Disconnected,
            session: None,
            attempt: 0,
            dialing: None,
            sink: None,
            stream: None,
            retry_at: None,
            deadline: None,
            ping,
        }
    }

    /// Run until every client handle is dropped.
    pub(crate) async fn run(mut self) {
        tracing::debug!(url = %self.config.url, "connection task started");

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        tracing::info!("all client handles dropped; shutting down");
                        self.close().await;
                        return;
                    }
                },
                result = dial(&mut self.dialing) => {
                    self.dialing = None;
                    self.on_dialed(result).await;
                }
                msg = next_inbound(&mut self.stream) => self.on_inbound(msg).await,
                _ = sleep_until(self.retry_at) => {
                    self.retry_at = None;
                    self.start_dial();
                }
                _ = sleep_until(self.deadline) => {
                    self.deadline = None;
                    self.on_deadline();
                }
                _ = self.ping.tick(), if self.state.is_connected() => self.send_ping().await,
            }
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { reply } => {
                if self.state != ConnectionState::Disconnected {
                    let _ = reply.send(Err(ClientError::InvalidState(self.state)));
                    return;
                }
                self.attempt = 0;
                self.start_dial();
                let _ = reply.send(Ok(()));
            }
            Command::Call {
                method,
                params,
                replay,
                reply,
            } => {
                if !(self.state.is_connected() || self.state.is_pending()) {
                    tracing::debug!(method = %method, "call issued while idle");
                    let _ = reply.send(Err(CallError::NotConnected));
                    return;
                }
                let id = self.calls.register(method, params, replay, reply);
                // Otherwise it is flushed after the handshake.
                if self.state.is_connected() {
                    self.flush_call(id).await;
                }
            }
            Command::Subscribe {
                name,
                params,
                listener,
                reply,
            } => {
                let id = self.subscriptions.subscribe(name, params, listener);
                let _ = reply.send(id.clone());
                if self.state.is_connected() {
                    if let Some(frame) = self.subscriptions.subscribe_frame(&id) {
                        self.send_or_fail(&frame).await;
                    }
                }
            }
            Command::Unsubscribe { id } => {
                if self.subscriptions.unsubscribe(&id) && self.state.is_connected() {
                    self.send_or_fail(&Frame::Unsub { id: id.0 }).await;
                }
            }
            Command::SetStrategy(strategy) => {
                tracing::debug!(strategy = ?strategy, "reconnect strategy replaced");
                self.strategy = strategy;
            }
            Command::Close { reply } => {
                self.close().await;
                let _ = reply.send(());
            }
        }
    }

    fn start_dial(&mut self) {
        self.set_state(ConnectionState::Connecting);
        let connector = Arc::clone(&self.connector);
        let url = self.config.url.clone();
        let timeout = self.config.connect_timeout;
        tracing::info!(url = %url, attempt = self.attempt, "connecting via WebSocket");

        self.dialing = Some(Box::pin(async move {
            match time::timeout(timeout, connector.connect(&url)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::ConnectTimeout {
                    ms: timeout.as_millis() as u64,
                }),
            }
        }));
    }

    async fn on_dialed(&mut self, result: Result<WireLink, TransportError>) {
        match result {
            Ok(link) => {
                self.sink = Some(link.sink);
                self.stream = Some(link.stream);
                self.set_state(ConnectionState::AwaitingHandshake);
                self.deadline = Some(Instant::now() + self.config.connect_timeout);
                self.send_or_fail(&Frame::connect(None)).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "WS connect failed");
                self.connect_error(e);
            }
        }
    }

    async fn on_inbound(&mut self, msg: Option<Result<String, TransportError>>) {
        match msg {
            Some(Ok(text)) => match decode(&text) {
                Ok(frame) => self.on_frame(frame).await,
                Err(e) => tracing::warn!(error = %e, "dropping malformed frame"),
            },
            Some(Err(e)) => {
                tracing::warn!(error = %e, "WS receive error");
                self.on_failure(&e);
            }
            None => {
                self.stream = None;
                self.on_failure(&TransportError::ClosedByServer);
            }
        }
    }

    async fn on_frame(&mut self, frame: Frame) {
        match frame {
            Frame::Connected { session } => self.on_handshake(session).await,
            Frame::Failed { version } => {
                if self.state == ConnectionState::AwaitingHandshake {
                    self.connect_error(TransportError::HandshakeRejected { version });
                }
            }
            Frame::Ping { id } => {
                self.send_or_fail(&Frame::Pong { id }).await;
            }
            Frame::Pong { .. } => {
                if self.state.is_connected() {
                    self.deadline = None;
                }
            }
            Frame::Result { id, result, error } => {
                let Ok(call_id) = id.parse::<CallId>() else {
                    tracing::debug!(id = %id, "result with foreign id ignored");
                    return;
                };
                match error {
                    Some(error) => self.calls.reject(call_id, CallError::Server(error)),
                    None => self.calls.resolve(call_id, result.unwrap_or(Value::Null)),
                };
            }
            Frame::Ready { subs } => self.subscriptions.mark_ready(&subs),
            Frame::Nosub { id, error } => {
                self.subscriptions.on_nosub(&SubscriptionId(id), error.as_ref())
            }
            push @ (Frame::Added(_) | Frame::Changed(_) | Frame::Removed(_)) => {
                if let Some(event) = SubscriptionEvent::from_frame(push) {
                    if self.subscriptions.route(&event) == 0 {
                        tracing::debug!(collection = %event.collection, "push matched no subscription");
                    }
                }
            }
            Frame::Updated { methods } => {
                tracing::debug!(methods = ?methods, "server applied method writes");
            }
            Frame::Error { reason, .. } => {
                tracing::warn!(reason = %reason, "server reported a protocol error");
            }
            Frame::Unknown(raw) => self.on_unknown(raw),
            other @ (Frame::Connect { .. }
            | Frame::Method { .. }
            | Frame::Sub { .. }
            | Frame::Unsub { .. }) => {
                tracing::debug!(kind = other.kind(), "ignoring client-only frame from server");
            }
        }
    }

    /// A `result` that failed to decode still settles its call.
    fn on_unknown(&mut self, raw: Value) {
        let call_id = match (raw.get("msg").and_then(Value::as_str), raw.get("id")) {
            (Some("result"), Some(Value::String(id))) => id.parse::<CallId>().ok(),
            (Some("result"), Some(Value::Number(id))) => id.as_u64(),
            _ => None,
        };
        let Some(call_id) = call_id else {
            tracing::debug!(frame = %raw, "ignoring unknown frame");
            return;
        };
        tracing::warn!(id = call_id, frame = %raw, "result frame with unexpected shape");
        let error = ServerError::from_value(raw.get("error").cloned().unwrap_or(raw));
        self.calls.reject(call_id, CallError::Server(error));
    }

    /// Handshake accepted: restore subscriptions, then flush queued calls.
    async fn on_handshake(&mut self, session: String) {
        if self.state != ConnectionState::AwaitingHandshake {
            tracing::debug!(session = %session, "unexpected connected frame ignored");
            return;
        }
        self.deadline = None;
        self.attempt = 0;
        self.session = Some(session.clone());
        self.ping = ping_interval(&self.config);
        self.set_state(ConnectionState::Connected);
        tracing::info!(session = %session, url = %self.config.url, "connected");
        self.emit(ConnectionEvent::Connected { session });

        let resubscribe = self.subscriptions.replay_frames();
        if !resubscribe.is_empty() {
            tracing::debug!(count = resubscribe.len(), "re-subscribing");
        }
        for frame in resubscribe {
            if !self.send_or_fail(&frame).await {
                return;
            }
        }
        for id in self.calls.unsent_ids() {
            if !self.flush_call(id).await {
                return;
            }
        }
    }

    fn on_deadline(&mut self) {
        match self.state {
            ConnectionState::AwaitingHandshake => {
                let ms = self.config.connect_timeout.as_millis() as u64;
                tracing::warn!(timeout_ms = ms, "handshake timed out");
                self.connect_error(TransportError::HandshakeTimeout { ms });
            }
            ConnectionState::Connected => {
                let ms = self.config.pong_timeout.as_millis() as u64;
                tracing::warn!(timeout_ms = ms, "pong timeout");
                self.on_failure(&TransportError::PongTimeout { ms });
            }
            _ => {}
        }
    }

    async fn send_ping(&mut self) {
        if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.config.pong_timeout);
        }
        self.send_or_fail(&Frame::Ping { id: None }).await;
    }

    /// Write a queued call. Returns `false` if the link failed meanwhile.
    async fn flush_call(&mut self, id: CallId) -> bool {
        let Some(frame) = self.calls.frame_for(id) else {
            return true;
        };
        let text = match encode(&frame) {
            Ok(text) => text,
            Err(e) => {
                self.calls.reject(id, CallError::InvalidRequest(e.to_string()));
                return true;
            }
        };
        match self.send_text(text).await {
            Ok(()) => {
                self.calls.mark_sent(id);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, id, "WS send failed");
                self.on_failure(&e);
                false
            }
        }
    }

    /// Write a frame; on failure take the disconnect path. Returns `false`
    /// if the link failed.
    async fn send_or_fail(&mut self, frame: &Frame) -> bool {
        let text = match encode(frame) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, kind = frame.kind(), "dropping unencodable frame");
                return true;
            }
        };
        match self.send_text(text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, kind = frame.kind(), "WS send failed");
                self.on_failure(&e);
                false
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| TransportError::WebSocket("not connected".into()))?;
        sink.send(text).await
    }

    /// The transport could not be opened or the handshake failed.
    fn connect_error(&mut self, error: TransportError) {
        let error = Arc::new(error);
        self.emit(ConnectionEvent::ConnectError {
            error: Arc::clone(&error),
        });
        self.on_failure(&error);
    }

    /// Tear down the link and ask the strategy what to do next.
    fn on_failure(&mut self, error: &TransportError) {
        let had_link = self.sink.take().is_some();
        self.stream = None;
        self.dialing = None;
        self.deadline = None;
        self.session = None;
        self.subscriptions.on_disconnect();
        let lost = self.calls.on_disconnect();

        if had_link {
            tracing::warn!(error = %error, calls_lost = lost, "WS disconnected");
            self.emit(ConnectionEvent::Disconnected {
                closed_by_server: matches!(error, TransportError::ClosedByServer),
            });
        }

        self.attempt += 1;
        let decision = match &self.strategy {
            Some(strategy) => strategy.should_reconnect(self.attempt, error),
            None => ReconnectDecision::GiveUp,
        };

        match decision {
            ReconnectDecision::RetryAfter(delay) => {
                tracing::warn!(attempt = self.attempt, "reconnecting in {delay:?}");
                self.retry_at = Some(Instant::now() + delay);
                self.set_state(ConnectionState::Reconnecting {
                    attempt: self.attempt,
                });
                self.emit(ConnectionEvent::Reconnecting {
                    attempt: self.attempt,
                    delay,
                });
            }
            ReconnectDecision::GiveUp => {
                let attempts = self.attempt - 1;
                self.attempt = 0;
                self.retry_at = None;
                let abandoned = self.calls.abandon_all(CallError::ConnectionLost);
                tracing::warn!(attempts, abandoned, "giving up on reconnecting");
                self.set_state(ConnectionState::Disconnected);
                self.emit(ConnectionEvent::GaveUp { attempts });
            }
        }
    }

    /// Caller-initiated close: orderly shutdown, no reconnect.
    async fn close(&mut self) {
        let had_link = self.sink.is_some();
        if let Some(mut sink) = self.sink.take() {
            if time::timeout(self.config.connect_timeout, sink.close()).await.is_err() {
                tracing::debug!("timed out closing the socket");
            }
        }
        self.stream = None;
        self.dialing = None;
        self.retry_at = None;
        self.deadline = None;
        self.session = None;
        self.attempt = 0;
        let abandoned = self.calls.abandon_all(CallError::ConnectionLost);
        self.subscriptions.clear();
        self.set_state(ConnectionState::Disconnected);
        if had_link {
            self.emit(ConnectionEvent::Disconnected {
                closed_by_server: false,
            });
        }
        tracing::info!(url = %self.config.url, abandoned, "connection closed");
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: ConnectionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

fn ping_interval(config: &ClientConfig) -> Interval {
    let mut interval = time::interval_at(Instant::now() + config.ping_interval, config.ping_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn dial(dialing: &mut Option<Dialing>) -> Result<WireLink, TransportError> {
    match dialing {
        Some(fut) => fut.await,
        None => future::pending().await,
    }
}

async fn next_inbound(stream: &mut Option<Inbound>) -> Option<Result<String, TransportError>> {
    match stream {
        Some(s) => s.next().await,
        None => future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => future::pending().await,
    }
}
