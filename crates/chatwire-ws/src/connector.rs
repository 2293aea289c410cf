//! The physical transport seam.
//!
//! The engine only sees text frames: an outbound `Sink<String>` and an
//! inbound `Stream` of `Result<String, TransportError>`. [`WsConnector`]
//! provides them over `tokio-tungstenite`; tests plug in channels.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use chatwire_core::error::TransportError;

pub type Outbound = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
pub type Inbound = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Both halves of an open transport.
pub struct WireLink {
    pub sink: Outbound,
    pub stream: Inbound,
}

/// Opens transports. One call per connection attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<WireLink, TransportError>;
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<WireLink, TransportError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        let (sink, stream) = ws_stream.split();

        let sink = sink
            .sink_map_err(|e| TransportError::WebSocket(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, TransportError>(Message::Text(text.into()))));

        // Control frames are answered by tungstenite itself; a Close frame
        // is followed by end-of-stream.
        let stream = stream.filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        tracing::debug!("dropping non-UTF-8 binary frame");
                        None
                    }
                },
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::WebSocket(e.to_string()))),
            })
        });

        Ok(WireLink {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}
