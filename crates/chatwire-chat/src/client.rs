//! Typed Rocket.Chat methods over an [`RpcTransport`].

use std::sync::Weak;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use chatwire_core::listener::{SubscriptionId, SubscriptionListener};
use chatwire_core::transport::{Replay, RpcTransport};

use crate::error::ChatError;
use crate::model::{ChatMessage, MessageBatch, Page, Room, Timestamp, Token};

const ROOM_MESSAGES: &str = "stream-room-messages";
const NOTIFY_ROOM: &str = "stream-notify-room";

/// Chat API client.
///
/// Every method checks its arguments before anything is sent, and declares
/// whether the call may be replayed after a reconnect: reads are
/// [`Replay::Safe`], anything with a side effect is [`Replay::Never`].
///
/// # Example
/// ```rust,no_run
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// use chatwire_chat::ChatClient;
/// use chatwire_ws::{ClientConfig, RealtimeClient};
///
/// let transport = RealtimeClient::new(ClientConfig::new("wss://chat.example.com/websocket"))?;
/// transport.connect().await?;
/// let chat = ChatClient::new(transport);
/// let token = chat.login("alice", "secret").await?;
/// chat.send_message("GENERAL", "hello").await?;
/// # let _ = token;
/// # Ok(())
/// # }
/// ```
pub struct ChatClient<T> {
    transport: T,
    call_timeout: Option<Duration>,
}

impl<T: RpcTransport> ChatClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            call_timeout: None,
        }
    }

    /// Bound every call's wait for a reply. Unbounded by default.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // ─── Session ───────────────────────────────────────────────────────────

    /// Log in with username and password.
    pub async fn login(&self, username: &str, password: &str) -> Result<Token, ChatError> {
        require("username", username)?;
        require("password", password)?;
        let params = json!({"user": {"username": username}, "password": password});
        self.request("login", vec![params], Replay::Never)
            .await
            .map_err(ChatError::into_auth)
    }

    /// Resume a session with a token from an earlier login.
    pub async fn login_with_token(&self, token: &str) -> Result<Token, ChatError> {
        require("token", token)?;
        self.request("login", vec![json!({"resume": token})], Replay::Safe)
            .await
            .map_err(ChatError::into_auth)
    }

    pub async fn logout(&self) -> Result<(), ChatError> {
        self.execute("logout", vec![], Replay::Never).await
    }

    // ─── Rooms and history ─────────────────────────────────────────────────

    /// Rooms the logged-in user belongs to.
    pub async fn get_rooms(&self) -> Result<Vec<Room>, ChatError> {
        self.request("rooms/get", vec![], Replay::Safe).await
    }

    /// Up to `limit` messages older than `before` (newest first when `None`).
    /// Pass [`Page::next_before`] to walk further back.
    pub async fn load_history(
        &self,
        room_id: &str,
        before: Option<Timestamp>,
        limit: usize,
    ) -> Result<Page<ChatMessage>, ChatError> {
        require("room_id", room_id)?;
        require_limit(limit)?;
        let params = vec![json!(room_id), json!(before), json!(limit), Value::Null];
        let batch: Option<MessageBatch> = self.request("loadHistory", params, Replay::Safe).await?;
        let items = batch.unwrap_or_default().messages;
        Ok(Page {
            has_more: items.len() >= limit,
            items,
        })
    }

    pub async fn search_messages(
        &self,
        text: &str,
        room_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        require("text", text)?;
        require("room_id", room_id)?;
        require_limit(limit)?;
        let params = vec![json!(text), json!(room_id), json!(limit)];
        let batch: Option<MessageBatch> = self.request("messageSearch", params, Replay::Safe).await?;
        Ok(batch.unwrap_or_default().messages)
    }

    // ─── Messages ──────────────────────────────────────────────────────────

    /// Send a text message. The message id is generated here, so the sent
    /// message can be matched against its echo on the room stream.
    pub async fn send_message(&self, room_id: &str, text: &str) -> Result<ChatMessage, ChatError> {
        require("room_id", room_id)?;
        require("text", text)?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let params = json!({"_id": id, "rid": room_id, "msg": text});
        self.request("sendMessage", vec![params], Replay::Never).await
    }

    pub async fn update_message(&self, message_id: &str, room_id: &str, text: &str) -> Result<(), ChatError> {
        require("message_id", message_id)?;
        require("room_id", room_id)?;
        require("text", text)?;
        let params = json!({"_id": message_id, "rid": room_id, "msg": text});
        self.execute("updateMessage", vec![params], Replay::Never).await
    }

    pub async fn delete_message(&self, message_id: &str) -> Result<(), ChatError> {
        require("message_id", message_id)?;
        self.execute("deleteMessage", vec![json!({"_id": message_id})], Replay::Never)
            .await
    }

    pub async fn pin_message(&self, message: &ChatMessage) -> Result<(), ChatError> {
        self.execute("pinMessage", vec![message_param(message)?], Replay::Never)
            .await
    }

    pub async fn unpin_message(&self, message: &ChatMessage) -> Result<(), ChatError> {
        self.execute("unpinMessage", vec![message_param(message)?], Replay::Never)
            .await
    }

    pub async fn star_message(&self, message_id: &str, room_id: &str, starred: bool) -> Result<(), ChatError> {
        require("message_id", message_id)?;
        require("room_id", room_id)?;
        let params = json!({"_id": message_id, "rid": room_id, "starred": starred});
        self.execute("starMessage", vec![params], Replay::Never).await
    }

    /// Toggle an emoji reaction (e.g. `":+1:"`) on a message.
    pub async fn set_reaction(&self, emoji: &str, message_id: &str) -> Result<(), ChatError> {
        require("emoji", emoji)?;
        require("message_id", message_id)?;
        self.execute("setReaction", vec![json!(emoji), json!(message_id)], Replay::Never)
            .await
    }

    // ─── Streams ───────────────────────────────────────────────────────────

    /// New and edited messages in a room. Decode pushes with
    /// [`ChatMessage::from_event`].
    pub async fn subscribe_room_messages(
        &self,
        room_id: &str,
        listener: Weak<dyn SubscriptionListener>,
    ) -> Result<SubscriptionId, ChatError> {
        require("room_id", room_id)?;
        let params = vec![json!(room_id), json!(false)];
        Ok(self.transport.subscribe(ROOM_MESSAGES, params, listener).await?)
    }

    /// Typing notifications in a room. Decode pushes with
    /// [`TypingEvent::from_event`](crate::TypingEvent::from_event).
    pub async fn subscribe_typing(
        &self,
        room_id: &str,
        listener: Weak<dyn SubscriptionListener>,
    ) -> Result<SubscriptionId, ChatError> {
        require("room_id", room_id)?;
        let params = vec![json!(format!("{room_id}/typing")), json!(false)];
        Ok(self.transport.subscribe(NOTIFY_ROOM, params, listener).await?)
    }

    pub fn unsubscribe(&self, id: &SubscriptionId) {
        self.transport.unsubscribe(id);
    }

    // ─── Plumbing ──────────────────────────────────────────────────────────

    async fn call(&self, method: &str, params: Vec<Value>, replay: Replay) -> Result<Value, ChatError> {
        tracing::debug!(method, ?replay, "chat call");
        let reply = self.transport.call(method, params, replay);
        let result = match self.call_timeout {
            Some(timeout) => reply.within(timeout).await,
            None => reply.await,
        };
        result.map_err(|e| {
            tracing::debug!(method, error = %e, "chat call failed");
            ChatError::from(e)
        })
    }

    async fn request<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
        replay: Replay,
    ) -> Result<R, ChatError> {
        let value = self.call(method, params, replay).await?;
        serde_json::from_value(value).map_err(|e| {
            tracing::warn!(method, error = %e, "unexpected result shape");
            ChatError::InvalidResponse(e)
        })
    }

    /// A call whose result carries nothing we need.
    async fn execute(&self, method: &str, params: Vec<Value>, replay: Replay) -> Result<(), ChatError> {
        self.call(method, params, replay).await.map(drop)
    }
}

fn require(name: &str, value: &str) -> Result<(), ChatError> {
    if value.trim().is_empty() {
        return Err(ChatError::Argument(format!("{name} must not be empty")));
    }
    Ok(())
}

fn require_limit(limit: usize) -> Result<(), ChatError> {
    if limit == 0 {
        return Err(ChatError::Argument("limit must be greater than zero".into()));
    }
    Ok(())
}

fn message_param(message: &ChatMessage) -> Result<Value, ChatError> {
    require("message.id", &message.id)?;
    require("message.room_id", &message.room_id)?;
    serde_json::to_value(message).map_err(|e| ChatError::InvalidRequest(e.to_string()))
}
