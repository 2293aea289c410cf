//! Error taxonomy shared by the codec, the connection engine and the facade.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Codec failures. `Malformed` means an inbound payload was not JSON;
/// the engine logs it and drops the frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Low-level connection failures.
///
/// These never reach a call's continuation directly; they drive the
/// reconnection path instead.
#[derive(Debug, Error)]
pub enum TransportError {
    /// WebSocket connect/send/receive error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Opening the transport took longer than the configured bound.
    #[error("connect timed out after {ms}ms")]
    ConnectTimeout { ms: u64 },

    /// The server never answered the `connect` frame.
    #[error("handshake timed out after {ms}ms")]
    HandshakeTimeout { ms: u64 },

    /// The server refused the protocol version we offered.
    #[error("handshake rejected, server wants protocol version {version}")]
    HandshakeRejected { version: String },

    /// No `pong` arrived in time.
    #[error("no pong within {ms}ms")]
    PongTimeout { ms: u64 },

    /// The server closed the socket.
    #[error("connection closed by server")]
    ClosedByServer,
}

impl TransportError {
    /// Returns `true` for failures a fresh connection may cure.
    ///
    /// A rejected handshake will be rejected again, so it is not retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::HandshakeRejected { .. })
    }
}

/// Server-supplied error code: either numeric (`403`) or symbolic
/// (`"too-many-requests"`). Integral floats such as `401.0` read as numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ErrorCode {
    Number(i64),
    Text(String),
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(match raw {
            Value::Number(n) => match n.as_i64() {
                Some(n) => Self::Number(n),
                None => match n.as_f64() {
                    Some(f) if f.fract() == 0.0 => Self::Number(f as i64),
                    _ => Self::Text(n.to_string()),
                },
            },
            Value::String(s) => Self::Text(s),
            other => Self::Text(other.to_string()),
        })
    }
}

impl ErrorCode {
    /// Numeric value, parsing symbolic codes that are plain digits.
    pub fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.parse().ok(),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// The `error` object of a `result` or `nosub` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ServerError {
    /// Read an `error` payload of any shape. Anything that is not an error
    /// object keeps its raw value in `details`, and a bare string becomes
    /// the `reason`.
    pub fn from_value(raw: Value) -> Self {
        if raw.is_object() {
            if let Ok(err) = serde_json::from_value::<ServerError>(raw.clone()) {
                return err;
            }
        }
        let reason = match &raw {
            Value::String(s) => Some(s.clone()),
            other => other.get("reason").and_then(Value::as_str).map(str::to_string),
        };
        Self {
            error: raw
                .get("error")
                .and_then(|code| serde_json::from_value(code.clone()).ok()),
            reason,
            message: raw.get("message").and_then(Value::as_str).map(str::to_string),
            error_type: None,
            details: Some(raw),
        }
    }

    /// Best human-readable description the server gave us.
    pub fn description(&self) -> &str {
        self.message
            .as_deref()
            .or(self.reason.as_deref())
            .unwrap_or("unknown server error")
    }

    /// 401/403-class rejection.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self.error.as_ref().and_then(ErrorCode::as_number),
            Some(401 | 403)
        )
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error {
            Some(code) => write!(f, "{code}: {}", self.description()),
            None => write!(f, "{}", self.description()),
        }
    }
}

/// Failure delivered to a single call's continuation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    /// The server answered with a method error.
    #[error("server error {0}")]
    Server(ServerError),

    /// The connection dropped and the call could not be replayed.
    #[error("connection lost before a reply arrived")]
    ConnectionLost,

    /// The client was idle and not connecting when the call was issued.
    #[error("client is not connected")]
    NotConnected,

    /// The call could not be encoded and was never sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A caller-imposed deadline passed first.
    #[error("no reply within {ms}ms")]
    TimedOut { ms: u64 },
}

/// Invalid client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid server URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: &'static str },

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
}
