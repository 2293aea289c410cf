//! Reconnection policies.
//!
//! The connection engine consults a [`ReconnectStrategy`] exactly once per
//! disconnect and either schedules a new connection attempt or gives up.

pub mod reconnect;

pub use reconnect::{ExponentialBackoff, FixedDelay, NoRetry, ReconnectDecision, ReconnectStrategy};
