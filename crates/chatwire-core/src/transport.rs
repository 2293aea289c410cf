//! The `RpcTransport` trait: what the chat facade needs from an engine.

use std::future::Future;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::CallError;
use crate::listener::{SubscriptionId, SubscriptionListener};
use crate::state::ConnectionState;

/// Whether a call may be re-sent after a reconnect.
///
/// Declared per method by the caller; never inferred from the method name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replay {
    /// Idempotent: re-issue it on the new connection.
    Safe,
    /// Has side effects: fail it with `ConnectionLost` instead.
    Never,
}

impl Replay {
    pub fn is_safe(self) -> bool {
        matches!(self, Self::Safe)
    }
}

pub type CallResult = Result<Value, CallError>;

/// Reply to an issued call.
///
/// The call is already queued when this is returned; awaiting it only waits
/// for the answer. Resolves exactly once.
#[must_use = "the reply is lost if the future is dropped"]
pub struct PendingReply {
    rx: oneshot::Receiver<CallResult>,
}

impl PendingReply {
    pub fn new(rx: oneshot::Receiver<CallResult>) -> Self {
        Self { rx }
    }

    /// Already-settled reply.
    pub fn ready(result: CallResult) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }

    /// Wait at most `timeout` for the reply.
    ///
    /// On expiry the late reply, if any, is discarded by the engine.
    pub async fn within(self, timeout: Duration) -> CallResult {
        match tokio::time::timeout(timeout, self).await {
            Ok(result) => result,
            Err(_) => Err(CallError::TimedOut {
                ms: timeout.as_millis() as u64,
            }),
        }
    }
}

impl Future for PendingReply {
    type Output = CallResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Sender dropped without an answer: the engine went away.
            Poll::Ready(Err(_)) => Poll::Ready(Err(CallError::ConnectionLost)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// A realtime RPC channel: correlated calls plus standing subscriptions.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` for use across Tokio tasks.
///
/// # Object Safety
/// The trait is object-safe and can be stored as `Arc<dyn RpcTransport>`.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Issue a method call. Calls are sent in issue order.
    fn call(&self, method: &str, params: Vec<Value>, replay: Replay) -> PendingReply;

    /// Register a subscription; it survives reconnects under the same id.
    async fn subscribe(
        &self,
        name: &str,
        params: Vec<Value>,
        listener: Weak<dyn SubscriptionListener>,
    ) -> Result<SubscriptionId, CallError>;

    /// Drop a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: &SubscriptionId);

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// The server URL.
    fn url(&self) -> &str;
}
