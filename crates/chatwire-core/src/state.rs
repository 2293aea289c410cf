//! Connection state and lifecycle events.

use std::sync::Arc;
use std::time::Duration;

use crate::error::TransportError;

/// Where the connection state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Idle, or waiting for nothing. `connect()` is only valid here.
    Disconnected,
    /// Opening the transport.
    Connecting,
    /// Transport open, `connect` frame sent, waiting for `connected`.
    AwaitingHandshake,
    /// Session established; calls flow.
    Connected,
    /// Waiting out a reconnect delay.
    Reconnecting { attempt: u32 },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Somewhere between `connect()` and either `Connected` or giving up.
    /// Calls issued now are queued rather than refused.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::AwaitingHandshake | Self::Reconnecting { .. }
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::AwaitingHandshake => write!(f, "awaiting-handshake"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
        }
    }
}

/// Lifecycle notifications published by the engine.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Handshake accepted.
    Connected { session: String },
    /// An established (or handshaking) link went away.
    Disconnected { closed_by_server: bool },
    /// Opening the transport or the handshake failed.
    ConnectError { error: Arc<TransportError> },
    /// A reconnect has been scheduled.
    Reconnecting { attempt: u32, delay: Duration },
    /// The strategy declined to retry; this is the terminal disconnect.
    GaveUp { attempts: u32 },
}
