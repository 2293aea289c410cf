//! Facade tests against a scripted transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use chatwire_chat::{ChatClient, ChatError, ChatMessage, TypingEvent};
use chatwire_core::{
    CallError, CallResult, ChannelListener, ConnectionState, ErrorCode, PendingReply, PushKind,
    Replay, RpcTransport, ServerError, SubscriptionEvent, SubscriptionId, SubscriptionListener,
};

// ─── Scripted transport ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct Sent {
    method: String,
    params: Vec<Value>,
    replay: Replay,
}

#[derive(Default)]
struct Scripted {
    replies: Mutex<VecDeque<CallResult>>,
    sent: Mutex<Vec<Sent>>,
    subscribed: Mutex<Vec<(String, Vec<Value>)>>,
    unsubscribed: Mutex<Vec<SubscriptionId>>,
    /// Leave calls unanswered.
    silent: bool,
    parked: Mutex<Vec<tokio::sync::oneshot::Sender<CallResult>>>,
}

impl Scripted {
    fn replying(replies: impl IntoIterator<Item = CallResult>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Default::default()
        }
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl RpcTransport for Scripted {
    fn call(&self, method: &str, params: Vec<Value>, replay: Replay) -> PendingReply {
        self.sent.lock().unwrap().push(Sent {
            method: method.to_string(),
            params,
            replay,
        });
        if self.silent {
            let (tx, rx) = tokio::sync::oneshot::channel();
            self.parked.lock().unwrap().push(tx);
            return PendingReply::new(rx);
        }
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Value::Null));
        PendingReply::ready(reply)
    }

    async fn subscribe(
        &self,
        name: &str,
        params: Vec<Value>,
        _listener: Weak<dyn SubscriptionListener>,
    ) -> Result<SubscriptionId, CallError> {
        let mut subs = self.subscribed.lock().unwrap();
        subs.push((name.to_string(), params));
        Ok(SubscriptionId(format!("sub-{}", subs.len())))
    }

    fn unsubscribe(&self, id: &SubscriptionId) {
        self.unsubscribed.lock().unwrap().push(id.clone());
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::Connected
    }

    fn url(&self) -> &str {
        "ws://scripted/websocket"
    }
}

fn chat(replies: impl IntoIterator<Item = CallResult>) -> ChatClient<Scripted> {
    ChatClient::new(Scripted::replying(replies))
}

fn server_error(code: i64, reason: &str) -> CallError {
    CallError::Server(ServerError {
        error: Some(ErrorCode::Number(code)),
        reason: Some(reason.into()),
        message: None,
        error_type: Some("Meteor.Error".into()),
        details: None,
    })
}

fn weak(listener: &Arc<ChannelListener>) -> Weak<dyn SubscriptionListener> {
    let weak: Weak<ChannelListener> = Arc::downgrade(listener);
    weak
}

// ─── Login ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn login_decodes_rest_style_token() {
    let chat = chat([Ok(json!({"status": "success", "data": {"authToken": "T", "userId": "U"}}))]);
    let token = chat.login("alice", "secret").await.unwrap();
    assert_eq!(token.auth_token, "T");
    assert_eq!(token.user_id, "U");

    let sent = chat.transport().sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].method, "login");
    assert_eq!(sent[0].replay, Replay::Never);
    assert_eq!(
        sent[0].params,
        vec![json!({"user": {"username": "alice"}, "password": "secret"})]
    );
}

#[tokio::test]
async fn login_decodes_realtime_token() {
    let chat = chat([Ok(json!({"id": "U", "token": "T", "tokenExpires": {"$date": 5}}))]);
    let token = chat.login("alice", "secret").await.unwrap();
    assert_eq!((token.user_id.as_str(), token.auth_token.as_str()), ("U", "T"));
}

#[tokio::test]
async fn rejected_credentials_are_auth_errors() {
    let chat = chat([Err(server_error(403, "User not found"))]);
    match chat.login("alice", "wrong").await {
        Err(ChatError::Auth(e)) => assert_eq!(e.reason.as_deref(), Some("User not found")),
        other => panic!("expected Auth, got {other:?}"),
    }
}

#[tokio::test]
async fn other_login_errors_stay_protocol_errors() {
    let chat = chat([Err(server_error(429, "too many requests"))]);
    assert!(matches!(chat.login("alice", "x").await, Err(ChatError::Protocol(_))));
}

#[tokio::test]
async fn garbage_result_is_invalid_response() {
    let chat = chat([Ok(json!("NOT A JSON"))]);
    assert!(matches!(
        chat.login("alice", "secret").await,
        Err(ChatError::InvalidResponse(_))
    ));
}

#[tokio::test]
async fn resume_is_replayable() {
    let chat = chat([Ok(json!({"id": "U", "token": "T2"}))]);
    let token = chat.login_with_token("T1").await.unwrap();
    assert_eq!(token.auth_token, "T2");
    let sent = chat.transport().sent();
    assert_eq!(sent[0].params, vec![json!({"resume": "T1"})]);
    assert_eq!(sent[0].replay, Replay::Safe);
}

// ─── Argument checks ─────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_arguments_fail_before_sending() {
    let chat = chat([]);
    assert!(matches!(chat.login("", "pw").await, Err(ChatError::Argument(_))));
    assert!(matches!(chat.login("alice", "  ").await, Err(ChatError::Argument(_))));
    assert!(matches!(chat.send_message("", "hi").await, Err(ChatError::Argument(_))));
    assert!(matches!(chat.send_message("GENERAL", "").await, Err(ChatError::Argument(_))));
    assert!(matches!(chat.load_history("GENERAL", None, 0).await, Err(ChatError::Argument(_))));
    assert!(matches!(chat.set_reaction(":+1:", "").await, Err(ChatError::Argument(_))));
    assert!(matches!(chat.delete_message("").await, Err(ChatError::Argument(_))));

    let (listener, _rx) = ChannelListener::new();
    let listener = Arc::new(listener);
    assert!(matches!(
        chat.subscribe_room_messages("", weak(&listener)).await,
        Err(ChatError::Argument(_))
    ));

    assert!(chat.transport().sent().is_empty());
    assert!(chat.transport().subscribed.lock().unwrap().is_empty());
}

// ─── Messages ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn send_message_generates_the_id() {
    let chat = chat([Ok(json!({"_id": "placeholder", "rid": "GENERAL", "msg": "hi"}))]);
    let message = chat.send_message("GENERAL", "hi").await.unwrap();
    assert_eq!(message.msg, "hi");

    let sent = chat.transport().sent();
    assert_eq!(sent[0].method, "sendMessage");
    assert_eq!(sent[0].replay, Replay::Never);
    let params = &sent[0].params[0];
    assert_eq!(params["rid"], "GENERAL");
    assert_eq!(params["msg"], "hi");
    assert!(!params["_id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn writes_are_never_replayed() {
    let chat = chat([]);
    chat.update_message("m1", "GENERAL", "edited").await.unwrap();
    chat.delete_message("m1").await.unwrap();
    chat.star_message("m1", "GENERAL", true).await.unwrap();
    chat.set_reaction(":+1:", "m1").await.unwrap();
    chat.logout().await.unwrap();

    let sent = chat.transport().sent();
    let methods: Vec<_> = sent.iter().map(|s| s.method.as_str()).collect();
    assert_eq!(
        methods,
        ["updateMessage", "deleteMessage", "starMessage", "setReaction", "logout"]
    );
    assert!(sent.iter().all(|s| s.replay == Replay::Never));
    assert_eq!(sent[2].params[0], json!({"_id": "m1", "rid": "GENERAL", "starred": true}));
    assert_eq!(sent[3].params, vec![json!(":+1:"), json!("m1")]);
}

#[tokio::test]
async fn pin_sends_the_whole_message() {
    let raw = json!({"_id": "m1", "rid": "GENERAL", "msg": "hi", "ts": {"$date": 1}, "mentions": []});
    let message: ChatMessage = serde_json::from_value(raw.clone()).unwrap();
    let chat = chat([]);
    chat.pin_message(&message).await.unwrap();
    chat.unpin_message(&message).await.unwrap();

    let sent = chat.transport().sent();
    assert_eq!(sent[0].method, "pinMessage");
    assert_eq!(sent[0].params, vec![raw.clone()]);
    assert_eq!(sent[1].method, "unpinMessage");
}

// ─── Reads ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn history_pages_and_cursor() {
    let chat = chat([Ok(json!({
        "messages": [
            {"_id": "b", "rid": "GENERAL", "msg": "2", "ts": {"$date": 20}},
            {"_id": "a", "rid": "GENERAL", "msg": "1", "ts": {"$date": 10}}
        ],
        "unreadNotLoaded": 0
    }))]);
    let page = chat.load_history("GENERAL", None, 2).await.unwrap();
    assert_eq!(page.items.len(), 2);
    assert!(page.has_more);
    assert_eq!(page.next_before().map(|t| t.millis), Some(10));

    let sent = chat.transport().sent();
    assert_eq!(sent[0].method, "loadHistory");
    assert_eq!(sent[0].replay, Replay::Safe);
    assert_eq!(sent[0].params, vec![json!("GENERAL"), Value::Null, json!(2), Value::Null]);
}

#[tokio::test]
async fn short_page_is_the_last() {
    let chat = chat([Ok(json!({"messages": [{"_id": "a", "rid": "GENERAL"}]}))]);
    let page = chat.load_history("GENERAL", None, 50).await.unwrap();
    assert!(!page.has_more);
    assert_eq!(page.next_before(), None);
}

#[tokio::test]
async fn search_tolerates_null_result() {
    let chat = chat([Ok(Value::Null)]);
    assert!(chat.search_messages("hello", "GENERAL", 10).await.unwrap().is_empty());
    let sent = chat.transport().sent();
    assert_eq!(sent[0].params, vec![json!("hello"), json!("GENERAL"), json!(10)]);
}

#[tokio::test]
async fn rooms_decode() {
    let chat = chat([Ok(json!([
        {"_id": "GENERAL", "t": "c", "name": "general"},
        {"_id": "abc", "t": "d"}
    ]))]);
    let rooms = chat.get_rooms().await.unwrap();
    assert_eq!(rooms.len(), 2);
    assert_eq!(rooms[0].name.as_deref(), Some("general"));
}

// ─── Failures ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn engine_errors_are_translated() {
    let chat = chat([Err(CallError::ConnectionLost), Err(CallError::NotConnected)]);
    assert!(matches!(chat.get_rooms().await, Err(ChatError::ConnectionLost)));
    assert!(matches!(chat.get_rooms().await, Err(ChatError::NotConnected)));
}

#[tokio::test(start_paused = true)]
async fn call_timeout_bounds_the_wait() {
    let transport = Scripted {
        silent: true,
        ..Default::default()
    };
    let chat = ChatClient::new(transport).with_call_timeout(Duration::from_secs(3));
    assert!(matches!(chat.get_rooms().await, Err(ChatError::TimedOut { ms: 3000 })));
}

// ─── Streams ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stream_subscriptions_use_room_keys() {
    let chat = chat([]);
    let (listener, _rx) = ChannelListener::new();
    let listener = Arc::new(listener);

    let messages = chat.subscribe_room_messages("GENERAL", weak(&listener)).await.unwrap();
    let typing = chat.subscribe_typing("GENERAL", weak(&listener)).await.unwrap();
    assert_ne!(messages, typing);

    let subs = chat.transport().subscribed.lock().unwrap().clone();
    assert_eq!(subs[0], ("stream-room-messages".to_string(), vec![json!("GENERAL"), json!(false)]));
    assert_eq!(subs[1], ("stream-notify-room".to_string(), vec![json!("GENERAL/typing"), json!(false)]));

    chat.unsubscribe(&messages);
    assert_eq!(*chat.transport().unsubscribed.lock().unwrap(), vec![messages]);
}

#[test]
fn pushes_decode_to_domain_events() {
    let message_push = SubscriptionEvent {
        kind: PushKind::Changed,
        collection: "stream-room-messages".into(),
        doc_id: Some("id".into()),
        fields: Some(json!({"eventName": "GENERAL", "args": [{"_id": "m", "rid": "GENERAL", "msg": "yo"}]})),
    };
    assert_eq!(ChatMessage::from_event(&message_push).unwrap().msg, "yo");

    let not_typing = SubscriptionEvent {
        collection: "stream-notify-room".into(),
        fields: Some(json!({"eventName": "GENERAL/deleteMessage", "args": [{"_id": "m"}]})),
        ..message_push.clone()
    };
    assert!(TypingEvent::from_event(&not_typing).is_none());

    let empty = SubscriptionEvent { fields: None, ..message_push };
    assert!(matches!(ChatMessage::from_event(&empty), Err(ChatError::InvalidResponse(_))));
}
