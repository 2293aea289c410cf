use chatwire_core::error::{CallError, ServerError};
use thiserror::Error;

/// Errors surfaced by [`ChatClient`](crate::ChatClient) methods.
#[derive(Debug, Error)]
pub enum ChatError {
    /// A required argument was missing or empty; nothing was sent.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// The server answered with a method error.
    #[error("server error: {0}")]
    Protocol(ServerError),

    /// The server rejected the credentials (401/403 on login).
    #[error("authentication failed: {0}")]
    Auth(ServerError),

    #[error("connection lost before a reply arrived")]
    ConnectionLost,

    #[error("client is not connected")]
    NotConnected,

    #[error("no reply within {ms}ms")]
    TimedOut { ms: u64 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The reply did not have the shape the method promises.
    #[error("unexpected response: {0}")]
    InvalidResponse(#[source] serde_json::Error),
}

impl ChatError {
    /// The server's error payload, for `Protocol` and `Auth`.
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            Self::Protocol(e) | Self::Auth(e) => Some(e),
            _ => None,
        }
    }

    /// Promote a 401/403 method error to `Auth`.
    pub(crate) fn into_auth(self) -> Self {
        match self {
            Self::Protocol(e) if e.is_auth_failure() => Self::Auth(e),
            other => other,
        }
    }
}

impl From<CallError> for ChatError {
    fn from(e: CallError) -> Self {
        match e {
            CallError::Server(e) => Self::Protocol(e),
            CallError::ConnectionLost => Self::ConnectionLost,
            CallError::NotConnected => Self::NotConnected,
            CallError::InvalidRequest(msg) => Self::InvalidRequest(msg),
            CallError::TimedOut { ms } => Self::TimedOut { ms },
        }
    }
}
