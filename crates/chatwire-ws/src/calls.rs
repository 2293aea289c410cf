//! In-flight call tracking.
//!
//! Every outbound `method` frame gets a correlation id from this registry.
//! The registry owns each call's reply channel until the call is settled,
//! which happens exactly once: by a reply, by a connection loss the call
//! cannot survive, or by abandonment.

use std::collections::BTreeMap;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::oneshot;

use chatwire_core::error::CallError;
use chatwire_core::frame::Frame;
use chatwire_core::transport::{CallResult, Replay};

/// Correlation id. Monotonic and never reused for the life of a registry.
pub type CallId = u64;

/// One call awaiting its `result` frame.
pub struct PendingCall {
    pub id: CallId,
    pub method: String,
    /// Kept so the call can be re-sent on a new connection.
    pub params: Vec<Value>,
    pub replay: Replay,
    pub created_at: Instant,
    /// Written to the current connection.
    pub sent: bool,
    reply: oneshot::Sender<CallResult>,
}

#[derive(Default)]
pub struct CallRegistry {
    last_id: CallId,
    pending: BTreeMap<CallId, PendingCall>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new call and return the id to tag its frame with.
    pub fn register(
        &mut self,
        method: String,
        params: Vec<Value>,
        replay: Replay,
        reply: oneshot::Sender<CallResult>,
    ) -> CallId {
        self.last_id += 1;
        let id = self.last_id;
        self.pending.insert(
            id,
            PendingCall {
                id,
                method,
                params,
                replay,
                created_at: Instant::now(),
                sent: false,
                reply,
            },
        );
        id
    }

    /// The `method` frame for a pending call.
    pub fn frame_for(&self, id: CallId) -> Option<Frame> {
        self.pending
            .get(&id)
            .map(|call| Frame::method(id.to_string(), call.method.clone(), call.params.clone()))
    }

    pub fn mark_sent(&mut self, id: CallId) {
        if let Some(call) = self.pending.get_mut(&id) {
            call.sent = true;
        }
    }

    /// Settle a call successfully. Returns `false` for an unknown id, which
    /// is a normal race (duplicate or late reply) and only logged.
    pub fn resolve(&mut self, id: CallId, result: Value) -> bool {
        self.settle(id, Ok(result))
    }

    /// Settle a call with an error. Same unknown-id handling as `resolve`.
    pub fn reject(&mut self, id: CallId, error: CallError) -> bool {
        self.settle(id, Err(error))
    }

    fn settle(&mut self, id: CallId, outcome: CallResult) -> bool {
        let Some(call) = self.pending.remove(&id) else {
            tracing::debug!(id, "reply for unknown call id ignored");
            return false;
        };
        tracing::debug!(
            id,
            method = %call.method,
            ok = outcome.is_ok(),
            elapsed_ms = call.created_at.elapsed().as_millis() as u64,
            "call settled"
        );
        if call.reply.send(outcome).is_err() {
            tracing::debug!(id, "caller stopped waiting for reply");
        }
        true
    }

    /// Apply a connection loss: calls already sent that are not safe to
    /// replay fail with `ConnectionLost`; everything else is kept for the
    /// next connection and marked unsent. Returns how many calls failed.
    pub fn on_disconnect(&mut self) -> usize {
        let doomed: Vec<CallId> = self
            .pending
            .values()
            .filter(|c| c.sent && !c.replay.is_safe())
            .map(|c| c.id)
            .collect();
        for id in &doomed {
            self.reject(*id, CallError::ConnectionLost);
        }
        for call in self.pending.values_mut() {
            call.sent = false;
        }
        doomed.len()
    }

    /// Ids waiting to be written, in issue order.
    pub fn unsent_ids(&self) -> Vec<CallId> {
        self.pending
            .values()
            .filter(|c| !c.sent)
            .map(|c| c.id)
            .collect()
    }

    /// Fail every pending call. Returns how many there were.
    pub fn abandon_all(&mut self, error: CallError) -> usize {
        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();
        for (_, call) in pending {
            let _ = call.reply.send(Err(error.clone()));
        }
        count
    }

    pub fn contains(&self, id: CallId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Number of pending calls.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
