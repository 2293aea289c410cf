//! Cloneable handle to a connection task.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use chatwire_core::error::CallError;
use chatwire_core::listener::{SubscriptionId, SubscriptionListener};
use chatwire_core::policy::ReconnectStrategy;
use chatwire_core::state::{ConnectionEvent, ConnectionState};
use chatwire_core::transport::{PendingReply, Replay, RpcTransport};

use crate::config::ClientConfig;
use crate::connection::{Command, Connection};
use crate::connector::{Connector, WsConnector};
use crate::error::ClientError;

/// Realtime client for a chat server's DDP endpoint.
///
/// Owns nothing but channels: a background task holds the socket, the call
/// and subscription registries and the reconnect schedule. Handles are cheap
/// to clone; the task shuts down when the last one is dropped.
///
/// Must be created inside a Tokio runtime.
#[derive(Clone)]
pub struct RealtimeClient {
    url: Arc<str>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl RealtimeClient {
    /// Build a client over a real WebSocket. Does not connect yet.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        Self::with_connector(config, Arc::new(WsConnector))
    }

    /// Build a client over a custom transport.
    pub fn with_connector(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(config.event_capacity);
        let url: Arc<str> = Arc::from(config.url.as_str());

        let connection = Connection::new(config, connector, cmd_rx, state_tx, events.clone());
        tokio::spawn(connection.run());

        Ok(Self {
            url,
            cmd_tx,
            state_rx,
            events,
        })
    }

    /// Start connecting. Valid only while idle and `Disconnected`; returns
    /// once the attempt has started, not once it has succeeded. Watch
    /// [`events`](Self::events) for the outcome.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Connect { reply })?;
        rx.await.map_err(|_| ClientError::EngineClosed)?
    }

    /// Issue a method call.
    ///
    /// The call is queued before this returns, so calls go out in the order
    /// they were issued.
    pub fn call(&self, method: impl Into<String>, params: Vec<Value>, replay: Replay) -> PendingReply {
        let (reply, rx) = oneshot::channel();
        let cmd = Command::Call {
            method: method.into(),
            params,
            replay,
            reply,
        };
        match self.send(cmd) {
            Ok(()) => PendingReply::new(rx),
            Err(_) => PendingReply::ready(Err(CallError::ConnectionLost)),
        }
    }

    /// Register a subscription. It is sent now if connected, and on every
    /// later handshake, always under the returned id.
    pub async fn subscribe(
        &self,
        name: impl Into<String>,
        params: Vec<Value>,
        listener: Weak<dyn SubscriptionListener>,
    ) -> Result<SubscriptionId, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Subscribe {
            name: name.into(),
            params,
            listener,
            reply,
        })?;
        rx.await.map_err(|_| ClientError::EngineClosed)
    }

    /// Remove a subscription. Unknown or already-removed ids are ignored.
    pub fn unsubscribe(&self, id: &SubscriptionId) {
        let _ = self.send(Command::Unsubscribe { id: id.clone() });
    }

    /// Replace the reconnection strategy; used from the next disconnect on.
    pub fn set_reconnect_strategy(&self, strategy: Option<Arc<dyn ReconnectStrategy>>) {
        let _ = self.send(Command::SetStrategy(strategy));
    }

    /// Close the connection, fail pending calls, forget subscriptions and
    /// cancel any scheduled reconnect.
    pub async fn close(&self) {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::Close { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch state changes.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Lifecycle events from now on.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn send(&self, cmd: Command) -> Result<(), ClientError> {
        self.cmd_tx.send(cmd).map_err(|_| ClientError::EngineClosed)
    }
}

#[async_trait]
impl RpcTransport for RealtimeClient {
    fn call(&self, method: &str, params: Vec<Value>, replay: Replay) -> PendingReply {
        RealtimeClient::call(self, method, params, replay)
    }

    async fn subscribe(
        &self,
        name: &str,
        params: Vec<Value>,
        listener: Weak<dyn SubscriptionListener>,
    ) -> Result<SubscriptionId, CallError> {
        RealtimeClient::subscribe(self, name, params, listener)
            .await
            .map_err(|_| CallError::ConnectionLost)
    }

    fn unsubscribe(&self, id: &SubscriptionId) {
        RealtimeClient::unsubscribe(self, id)
    }

    fn state(&self) -> ConnectionState {
        RealtimeClient::state(self)
    }

    fn url(&self) -> &str {
        &self.url
    }
}
