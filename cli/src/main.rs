//! chatwire CLI: talk to a Rocket.Chat server from the terminal.
//!
//! Usage:
//! ```bash
//! # Check that the realtime endpoint answers the handshake
//! chatwire connect --url wss://open.rocket.chat/websocket
//!
//! # Post a message
//! chatwire send --url wss://... --user alice --password secret --room GENERAL --text "hi"
//!
//! # Follow a room until Ctrl-C
//! CHATWIRE_URL=wss://... CHATWIRE_USER=alice CHATWIRE_PASSWORD=secret chatwire watch --room GENERAL
//! ```

use std::env;
use std::process;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chatwire_chat::{ChatClient, ChatMessage, RealtimeChat, TypingEvent};
use chatwire_core::{ChannelListener, ConnectionEvent, ExponentialBackoff, SubscriptionListener};
use chatwire_ws::{ClientConfig, RealtimeClient};
use tracing_subscriber::EnvFilter;

const HANDSHAKE_WAIT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "connect" => cmd_connect(&args[2..]).await,
        "login" => cmd_login(&args[2..]).await,
        "rooms" => cmd_rooms(&args[2..]).await,
        "history" => cmd_history(&args[2..]).await,
        "send" => cmd_send(&args[2..]).await,
        "watch" => cmd_watch(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("chatwire {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("chatwire {}", env!("CARGO_PKG_VERSION"));
    println!("Rocket.Chat realtime client\n");
    println!("USAGE:");
    println!("    chatwire <COMMAND> [FLAGS]\n");
    println!("COMMANDS:");
    println!("    connect    Open a connection and print the session id");
    println!("    login      Log in and print the session token");
    println!("    rooms      List the rooms of the logged-in user");
    println!("    history    Print recent messages of a room");
    println!("    send       Post a message to a room");
    println!("    watch      Print a room's messages as they arrive");
    println!("    version    Print version");
    println!("    help       Print this help\n");
    println!("FLAGS:");
    println!("    --url <URL>          WebSocket endpoint        [env: CHATWIRE_URL]");
    println!("    --user <NAME>        Username                  [env: CHATWIRE_USER]");
    println!("    --password <PASS>    Password                  [env: CHATWIRE_PASSWORD]");
    println!("    --room <ID>          Room id (e.g. GENERAL)");
    println!("    --text <TEXT>        Message text (send)");
    println!("    --limit <N>          Number of messages (history, default 20)\n");
    println!("Logging is controlled by RUST_LOG (default: info).");
}

async fn cmd_connect(args: &[String]) -> Result<(), String> {
    let url = flag_or_env(args, "--url", "CHATWIRE_URL").ok_or("--url is required")?;
    let (client, session) = open(&url).await?;
    println!("  Status:  connected");
    println!("  Server:  {}", client.url());
    println!("  Session: {session}");
    client.close().await;
    Ok(())
}

async fn cmd_login(args: &[String]) -> Result<(), String> {
    let url = flag_or_env(args, "--url", "CHATWIRE_URL").ok_or("--url is required")?;
    let user = flag_or_env(args, "--user", "CHATWIRE_USER").ok_or("--user is required")?;
    let password =
        flag_or_env(args, "--password", "CHATWIRE_PASSWORD").ok_or("--password is required")?;
    let (client, _) = open(&url).await?;
    let chat = ChatClient::new(client);
    let token = chat.login(&user, &password).await.map_err(|e| e.to_string())?;
    println!("  User id: {}", token.user_id);
    println!("  Token:   {}", token.auth_token);
    if let Some(expires) = token.expires {
        println!("  Expires: {} (unix ms)", expires.millis);
    }
    chat.transport().close().await;
    Ok(())
}

async fn cmd_rooms(args: &[String]) -> Result<(), String> {
    let chat = logged_in(args).await?;
    let rooms = chat.get_rooms().await.map_err(|e| e.to_string())?;
    for room in &rooms {
        let name = room.display_name.as_deref().or(room.name.as_deref()).unwrap_or("-");
        println!("  {:<24} {:?}  {name}", room.id, room.kind);
    }
    println!("{} room(s)", rooms.len());
    chat.transport().close().await;
    Ok(())
}

async fn cmd_history(args: &[String]) -> Result<(), String> {
    let room = parse_flag(args, "--room").ok_or("--room is required")?;
    let limit = match parse_flag(args, "--limit") {
        Some(raw) => raw.parse().map_err(|_| format!("invalid --limit: {raw}"))?,
        None => 20,
    };
    let chat = logged_in(args).await?;
    let page = chat.load_history(&room, None, limit).await.map_err(|e| e.to_string())?;
    // Oldest first reads naturally in a terminal.
    for message in page.items.iter().rev() {
        print_message(message);
    }
    if page.has_more {
        println!("(more available)");
    }
    chat.transport().close().await;
    Ok(())
}

async fn cmd_send(args: &[String]) -> Result<(), String> {
    let room = parse_flag(args, "--room").ok_or("--room is required")?;
    let text = parse_flag(args, "--text").ok_or("--text is required")?;
    let chat = logged_in(args).await?;
    let message = chat.send_message(&room, &text).await.map_err(|e| e.to_string())?;
    println!("sent {}", message.id);
    chat.transport().close().await;
    Ok(())
}

async fn cmd_watch(args: &[String]) -> Result<(), String> {
    let room = parse_flag(args, "--room").ok_or("--room is required")?;
    let chat = logged_in(args).await?;

    let (listener, mut rx) = ChannelListener::new();
    let listener = Arc::new(listener);
    let as_dyn: Weak<dyn SubscriptionListener> = {
        let weak: Weak<ChannelListener> = Arc::downgrade(&listener);
        weak
    };
    chat.subscribe_room_messages(&room, as_dyn.clone())
        .await
        .map_err(|e| e.to_string())?;
    chat.subscribe_typing(&room, as_dyn).await.map_err(|e| e.to_string())?;
    let mut events = chat.transport().events();
    println!("watching {room}, Ctrl-C to stop");

    loop {
        tokio::select! {
            push = rx.recv() => {
                let Some((_, event)) = push else { break };
                if let Some(typing) = TypingEvent::from_event(&event) {
                    if typing.typing {
                        println!("  … {} is typing", typing.username);
                    }
                    continue;
                }
                match ChatMessage::from_event(&event) {
                    Ok(message) => print_message(&message),
                    Err(e) => tracing::debug!(error = %e, "skipping push"),
                }
            }
            event = events.recv() => match event {
                Ok(ConnectionEvent::GaveUp { attempts }) => {
                    return Err(format!("connection lost after {attempts} reconnect attempt(s)"));
                }
                Ok(ConnectionEvent::Connected { .. }) => {
                    // A fresh session needs the credentials again.
                    relogin(&chat, args).await?;
                }
                Ok(other) => tracing::debug!(event = ?other, "connection event"),
                Err(_) => {}
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    chat.transport().close().await;
    Ok(())
}

/// Connect and wait for the handshake.
async fn open(url: &str) -> Result<(RealtimeClient, String), String> {
    let config = ClientConfig::new(url).reconnect(ExponentialBackoff::default());
    let client = RealtimeClient::new(config).map_err(|e| e.to_string())?;
    let mut events = client.events();
    client.connect().await.map_err(|e| e.to_string())?;

    let session = tokio::time::timeout(HANDSHAKE_WAIT, async {
        loop {
            match events.recv().await {
                Ok(ConnectionEvent::Connected { session }) => return Ok(session),
                Ok(ConnectionEvent::GaveUp { attempts }) => {
                    return Err(format!("could not connect after {attempts} retries"));
                }
                Ok(ConnectionEvent::ConnectError { error }) => {
                    tracing::warn!(error = %error, "connect attempt failed");
                }
                Ok(_) => {}
                Err(e) => return Err(e.to_string()),
            }
        }
    })
    .await
    .map_err(|_| format!("no handshake within {}s", HANDSHAKE_WAIT.as_secs()))??;

    Ok((client, session))
}

async fn logged_in(args: &[String]) -> Result<RealtimeChat, String> {
    let url = flag_or_env(args, "--url", "CHATWIRE_URL").ok_or("--url is required")?;
    let (client, _) = open(&url).await?;
    let chat = ChatClient::new(client);
    relogin(&chat, args).await?;
    Ok(chat)
}

async fn relogin(chat: &RealtimeChat, args: &[String]) -> Result<(), String> {
    let user = flag_or_env(args, "--user", "CHATWIRE_USER").ok_or("--user is required")?;
    let password =
        flag_or_env(args, "--password", "CHATWIRE_PASSWORD").ok_or("--password is required")?;
    let token = chat.login(&user, &password).await.map_err(|e| e.to_string())?;
    tracing::info!(user_id = %token.user_id, "logged in");
    Ok(())
}

fn print_message(message: &ChatMessage) {
    let who = message.sender.as_ref().map(|u| u.username.as_str()).unwrap_or("?");
    println!("  [{}] {who}: {}", message.room_id, message.msg);
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

fn flag_or_env(args: &[String], flag: &str, var: &str) -> Option<String> {
    parse_flag(args, flag).or_else(|| env::var(var).ok().filter(|v| !v.is_empty()))
}
