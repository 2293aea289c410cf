//! Subscription identities, push events and listener contracts.

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::ServerError;
use crate::frame::{Frame, Push};

/// Client-assigned subscription id, stable across reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub String);

impl From<String> for SubscriptionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SubscriptionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    Added,
    Changed,
    Removed,
}

/// A server push routed to a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionEvent {
    pub kind: PushKind,
    pub collection: String,
    pub doc_id: Option<String>,
    pub fields: Option<Value>,
}

impl SubscriptionEvent {
    /// Build from an `added` / `changed` / `removed` frame; `None` for any
    /// other frame.
    pub fn from_frame(frame: Frame) -> Option<Self> {
        let (kind, push) = match frame {
            Frame::Added(p) => (PushKind::Added, p),
            Frame::Changed(p) => (PushKind::Changed, p),
            Frame::Removed(p) => (PushKind::Removed, p),
            _ => return None,
        };
        let Push { collection, id, fields, .. } = push;
        Some(Self {
            kind,
            collection,
            doc_id: id,
            fields,
        })
    }

    /// Stream pushes name the event (usually a room id) in `fields.eventName`.
    pub fn event_name(&self) -> Option<&str> {
        self.fields.as_ref()?.get("eventName")?.as_str()
    }

    /// Stream payload, `fields.args`.
    pub fn args(&self) -> &[Value] {
        self.fields
            .as_ref()
            .and_then(|f| f.get("args"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Receives pushes for one or more subscriptions.
///
/// The engine only holds a weak reference; dropping the last `Arc` silently
/// stops delivery. Called on the engine task, so implementations should hand
/// work off rather than block. A panic is caught and logged.
pub trait SubscriptionListener: Send + Sync + 'static {
    fn on_event(&self, id: &SubscriptionId, event: &SubscriptionEvent);

    /// The server acknowledged the subscription (`ready`).
    fn on_ready(&self, _id: &SubscriptionId) {}

    /// The server refused or terminated the subscription.
    fn on_error(&self, _id: &SubscriptionId, _error: &ServerError) {}
}

/// Listener that forwards every event into an unbounded channel.
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<(SubscriptionId, SubscriptionEvent)>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(SubscriptionId, SubscriptionEvent)>) {
        let (sender, rx) = mpsc::unbounded_channel();
        (Self { sender }, rx)
    }
}

impl SubscriptionListener for ChannelListener {
    fn on_event(&self, id: &SubscriptionId, event: &SubscriptionEvent) {
        let _ = self.sender.send((id.clone(), event.clone()));
    }
}
