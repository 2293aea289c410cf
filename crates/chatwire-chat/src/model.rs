//! Domain types decoded from method results and stream pushes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use chatwire_core::listener::SubscriptionEvent;

use crate::error::ChatError;

/// Server timestamp in EJSON form: `{"$date": <millis>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    #[serde(rename = "$date")]
    pub millis: i64,
}

impl Timestamp {
    pub fn from_millis(millis: i64) -> Self {
        Self { millis }
    }
}

/// Session credentials returned by `login`.
///
/// Decodes both the realtime shape (`{"id", "token", "tokenExpires"}`) and
/// the REST envelope (`{"status": "success", "data": {"authToken", "userId"}}`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "TokenWire")]
pub struct Token {
    pub user_id: String,
    pub auth_token: String,
    pub expires: Option<Timestamp>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TokenWire {
    Envelope {
        data: RestToken,
    },
    Realtime {
        id: String,
        token: String,
        #[serde(default, rename = "tokenExpires")]
        token_expires: Option<Timestamp>,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestToken {
    auth_token: String,
    user_id: String,
}

impl From<TokenWire> for Token {
    fn from(wire: TokenWire) -> Self {
        match wire {
            TokenWire::Envelope { data } => Self {
                user_id: data.user_id,
                auth_token: data.auth_token,
                expires: None,
            },
            TokenWire::Realtime {
                id,
                token,
                token_expires,
            } => Self {
                user_id: id,
                auth_token: token,
                expires: token_expires,
            },
        }
    }
}

/// The author embedded in a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A chat message.
///
/// Fields this crate does not model are kept in `extra`, so a message can be
/// sent back to the server (pin/unpin) without losing anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "rid")]
    pub room_id: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default, rename = "u", skip_serializing_if = "Option::is_none")]
    pub sender: Option<UserRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<Timestamp>,
    #[serde(default, rename = "_updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
    /// System message type (`"uj"`, `"message_pinned"`, ...); `None` for
    /// ordinary messages.
    #[serde(default, rename = "t", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomType {
    #[serde(rename = "c")]
    Public,
    #[serde(rename = "p")]
    Private,
    #[serde(rename = "d")]
    Direct,
    #[serde(rename = "l")]
    Livechat,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "t")]
    pub kind: RoomType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "fname", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

/// One page of a history query, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// The server returned a full page; older items may exist.
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Page<ChatMessage> {
    /// Cursor for the next (older) page.
    pub fn next_before(&self) -> Option<Timestamp> {
        if !self.has_more {
            return None;
        }
        self.items.iter().filter_map(|m| m.ts).min()
    }
}

/// `loadHistory` and `messageSearch` both answer `{"messages": [...]}`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct MessageBatch {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// A typing notification from `stream-notify-room`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingEvent {
    pub room_id: String,
    pub username: String,
    pub typing: bool,
}

impl ChatMessage {
    /// Decode the message carried by a `stream-room-messages` push.
    pub fn from_event(event: &SubscriptionEvent) -> Result<Self, ChatError> {
        let raw = event.args().first().cloned().unwrap_or(Value::Null);
        serde_json::from_value(raw).map_err(ChatError::InvalidResponse)
    }
}

impl TypingEvent {
    /// Decode a `<room>/typing` push. `None` for other notify-room events.
    pub fn from_event(event: &SubscriptionEvent) -> Option<Self> {
        let room_id = event.event_name()?.strip_suffix("/typing")?;
        let args = event.args();
        Some(Self {
            room_id: room_id.to_string(),
            username: args.first()?.as_str()?.to_string(),
            typing: args.get(1).and_then(Value::as_bool).unwrap_or(false),
        })
    }
}
