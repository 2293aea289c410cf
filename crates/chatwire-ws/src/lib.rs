//! chatwire-ws: realtime connection engine over WebSocket.
//!
//! # Features
//! - One background task per client owns the socket and all protocol state
//! - Call correlation: concurrent calls multiplexed over one connection
//! - Subscription management with re-subscribe (same ids) after reconnect
//! - Replay of idempotent calls across reconnects; the rest fail fast
//! - Ping/pong liveness and pluggable reconnection strategies

pub mod calls;
pub mod client;
pub mod config;
pub mod connector;
mod connection;
pub mod error;
pub mod subscriptions;

pub use calls::{CallId, CallRegistry};
pub use client::RealtimeClient;
pub use config::ClientConfig;
pub use connector::{Connector, Inbound, Outbound, WireLink, WsConnector};
pub use error::ClientError;
pub use subscriptions::SubscriptionRegistry;
