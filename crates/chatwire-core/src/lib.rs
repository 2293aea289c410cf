//! chatwire-core: protocol foundation for the Chatwire realtime client.
//!
//! # Overview
//!
//! Chatwire talks to a Rocket.Chat server over its DDP WebSocket protocol.
//! The core crate defines:
//!
//! - [`Frame`] with [`encode`] / [`decode`], the wire codec
//! - [`RpcTransport`], the contract the chat facade calls through
//! - [`CallError`] / [`TransportError`] / [`FrameError`], the error taxonomy
//! - [`ConnectionState`] / [`ConnectionEvent`], lifecycle reporting
//! - [`SubscriptionListener`], push delivery
//! - [`policy`] module, reconnection strategies

pub mod error;
pub mod frame;
pub mod listener;
pub mod policy;
pub mod state;
pub mod transport;

pub use error::{CallError, ConfigError, ErrorCode, FrameError, ServerError, TransportError};
pub use frame::{decode, encode, Frame, Push};
pub use listener::{ChannelListener, PushKind, SubscriptionEvent, SubscriptionId, SubscriptionListener};
pub use policy::{ExponentialBackoff, FixedDelay, NoRetry, ReconnectDecision, ReconnectStrategy};
pub use state::{ConnectionEvent, ConnectionState};
pub use transport::{CallResult, PendingReply, Replay, RpcTransport};
