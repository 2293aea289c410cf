//! Standing subscription management.
//!
//! Tracks every `sub` the caller asked for and re-sends it, under the same
//! id, whenever a new session is established. Pushes are routed to the
//! listeners of matching subscriptions.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Weak;

use serde_json::Value;

use chatwire_core::error::ServerError;
use chatwire_core::frame::Frame;
use chatwire_core::listener::{SubscriptionEvent, SubscriptionId, SubscriptionListener};

/// Metadata for a single subscription.
struct SubscriptionEntry {
    /// Creation order; replay follows it.
    seq: u64,
    /// The publication name (e.g. `"stream-room-messages"`).
    name: String,
    /// Parameters, re-sent verbatim on every reconnect.
    params: Vec<Value>,
    /// Not owned: the caller controls the listener's lifetime.
    listener: Weak<dyn SubscriptionListener>,
    /// Acknowledged with `ready` on the current session.
    active: bool,
}

/// Registry of active subscriptions, owned by the connection task.
#[derive(Default)]
pub struct SubscriptionRegistry {
    last_seq: u64,
    entries: HashMap<SubscriptionId, SubscriptionEntry>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscription and assign its id.
    pub fn subscribe(
        &mut self,
        name: String,
        params: Vec<Value>,
        listener: Weak<dyn SubscriptionListener>,
    ) -> SubscriptionId {
        self.last_seq += 1;
        let id = SubscriptionId(format!("sub-{}", self.last_seq));
        self.entries.insert(
            id.clone(),
            SubscriptionEntry {
                seq: self.last_seq,
                name,
                params,
                listener,
                active: false,
            },
        );
        id
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, id: &SubscriptionId) -> bool {
        self.entries.remove(id).is_some()
    }

    /// The `sub` frame for one subscription.
    pub fn subscribe_frame(&self, id: &SubscriptionId) -> Option<Frame> {
        self.entries
            .get(id)
            .map(|e| Frame::sub(id.0.clone(), e.name.clone(), e.params.clone()))
    }

    /// `sub` frames for every subscription, in creation order.
    pub fn replay_frames(&self) -> Vec<Frame> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by_key(|(_, e)| e.seq);
        entries
            .into_iter()
            .map(|(id, e)| Frame::sub(id.0.clone(), e.name.clone(), e.params.clone()))
            .collect()
    }

    /// Deliver an event to one subscription's listener.
    ///
    /// Returns `false` if the subscription is unknown or its listener has
    /// been dropped. A panicking listener is logged and otherwise ignored.
    pub fn dispatch(&self, id: &SubscriptionId, event: &SubscriptionEvent) -> bool {
        match self.entries.get(id) {
            Some(entry) => notify(id, &entry.listener, |l| l.on_event(id, event)),
            None => {
                tracing::debug!(subscription = %id, "event for unknown subscription dropped");
                false
            }
        }
    }

    /// Deliver a push to every subscription it belongs to.
    ///
    /// A push matches when its collection is the subscription name and,
    /// if the subscription's first parameter is a string, that string is
    /// the push's `eventName`. Subscriptions still waiting for `ready` are
    /// included, since a server sends the initial `added` pushes first.
    /// Returns the number of listeners reached.
    pub fn route(&self, event: &SubscriptionEvent) -> usize {
        let mut targets: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, e)| matches_event(e, event))
            .collect();
        targets.sort_by_key(|(_, e)| e.seq);
        targets
            .into_iter()
            .filter(|(id, _)| self.dispatch(id, event))
            .count()
    }

    /// Handle a `ready` frame.
    pub fn mark_ready(&mut self, ids: &[String]) {
        for raw in ids {
            let id = SubscriptionId(raw.clone());
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.active = true;
                notify(&id, &entry.listener, |l| l.on_ready(&id));
            }
        }
    }

    /// Handle a `nosub` frame. With an error the server refused or killed
    /// the subscription; the listener hears about it and the entry stays
    /// inactive. Without one it simply confirms an unsubscribe.
    pub fn on_nosub(&mut self, id: &SubscriptionId, error: Option<&ServerError>) {
        let Some(entry) = self.entries.get_mut(id) else {
            return;
        };
        entry.active = false;
        if let Some(error) = error {
            tracing::warn!(subscription = %id, name = %entry.name, error = %error, "subscription refused");
            notify(id, &entry.listener, |l| l.on_error(id, error));
        }
    }

    /// The session ended; nothing is acknowledged on the next one yet.
    pub fn on_disconnect(&mut self) {
        for entry in self.entries.values_mut() {
            entry.active = false;
        }
    }

    pub fn is_active(&self, id: &SubscriptionId) -> bool {
        self.entries.get(id).is_some_and(|e| e.active)
    }

    pub fn contains(&self, id: &SubscriptionId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no active subscriptions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn matches_event(entry: &SubscriptionEntry, event: &SubscriptionEvent) -> bool {
    if entry.name != event.collection {
        return false;
    }
    match entry.params.first().and_then(Value::as_str) {
        Some(key) => event.event_name() == Some(key),
        None => true,
    }
}

fn notify(
    id: &SubscriptionId,
    listener: &Weak<dyn SubscriptionListener>,
    f: impl FnOnce(&dyn SubscriptionListener),
) -> bool {
    let Some(listener) = listener.upgrade() else {
        tracing::debug!(subscription = %id, "listener dropped; event discarded");
        return false;
    };
    if panic::catch_unwind(AssertUnwindSafe(|| f(listener.as_ref()))).is_err() {
        tracing::warn!(subscription = %id, "subscription listener panicked");
    }
    true
}
