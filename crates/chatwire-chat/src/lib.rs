//! chatwire-chat: typed Rocket.Chat API over the realtime engine.
//!
//! [`ChatClient`] turns method names and JSON parameters into Rust calls
//! with validated arguments, explicit replay policies and typed results:
//!
//! - session: `login`, `login_with_token`, `logout`
//! - reads: `get_rooms`, `load_history`, `search_messages`
//! - writes: `send_message`, `update_message`, `delete_message`,
//!   `pin_message`, `unpin_message`, `star_message`, `set_reaction`
//! - streams: `subscribe_room_messages`, `subscribe_typing`, `unsubscribe`

pub mod client;
pub mod error;
pub mod model;

pub use client::ChatClient;
pub use error::ChatError;
pub use model::{ChatMessage, Page, Room, RoomType, Timestamp, Token, TypingEvent, UserRef};

/// Chat client over a live WebSocket connection.
pub type RealtimeChat = ChatClient<chatwire_ws::RealtimeClient>;
