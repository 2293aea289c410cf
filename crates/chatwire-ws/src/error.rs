//! Errors returned by the client handle itself.

use thiserror::Error;

use chatwire_core::error::ConfigError;
use chatwire_core::state::ConnectionState;

#[derive(Debug, Error)]
pub enum ClientError {
    /// `connect()` outside the idle `Disconnected` state.
    #[error("cannot connect while {0}")]
    InvalidState(ConnectionState),

    /// The connection task is gone.
    #[error("connection task has shut down")]
    EngineClosed,

    #[error(transparent)]
    Config(#[from] ConfigError),
}
