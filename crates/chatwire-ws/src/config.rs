//! Client configuration.

use std::sync::Arc;
use std::time::Duration;

use chatwire_core::error::ConfigError;
use chatwire_core::policy::ReconnectStrategy;

/// Configuration for [`RealtimeClient`](crate::RealtimeClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server WebSocket URL, e.g. `wss://chat.example.com/websocket`.
    pub url: String,
    /// Interval between client pings while connected.
    pub ping_interval: Duration,
    /// How long to wait for a pong before declaring the link dead.
    pub pong_timeout: Duration,
    /// Bound on opening the transport, and separately on the handshake.
    pub connect_timeout: Duration,
    /// `None` disables auto-reconnect.
    pub reconnect: Option<Arc<dyn ReconnectStrategy>>,
    /// Buffer size of the lifecycle event channel.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            ping_interval: Duration::from_secs(25),
            pong_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            reconnect: None,
            event_capacity: 64,
        }
    }
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn pong_timeout(mut self, timeout: Duration) -> Self {
        self.pong_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn reconnect(mut self, strategy: impl ReconnectStrategy) -> Self {
        self.reconnect = Some(Arc::new(strategy));
        self
    }

    pub fn no_reconnect(mut self) -> Self {
        self.reconnect = None;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidUrl {
                url: self.url.clone(),
                reason: "URL is empty",
            });
        }
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(ConfigError::InvalidUrl {
                url: self.url.clone(),
                reason: "scheme must be ws:// or wss://",
            });
        }
        for (field, value) in [
            ("ping_interval", self.ping_interval),
            ("pong_timeout", self.pong_timeout),
            ("connect_timeout", self.connect_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration { field });
            }
        }
        Ok(())
    }
}
