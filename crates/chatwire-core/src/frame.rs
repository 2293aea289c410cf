//! DDP wire frames and their JSON codec.
//!
//! Every frame is a JSON object tagged by its `msg` field. Decoding goes
//! through a `serde_json::Value` first so that only text which is not JSON at
//! all is an error; JSON of an unexpected shape becomes [`Frame::Unknown`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FrameError, ServerError};

/// Protocol version we ask for in the handshake.
pub const DDP_VERSION: &str = "1";

/// Versions we can speak, most preferred first.
pub const DDP_SUPPORTED: [&str; 3] = ["1", "pre2", "pre1"];

/// Payload of an `added` / `changed` / `removed` push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Push {
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleared: Option<Vec<String>>,
}

/// One unit of the realtime protocol, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "lowercase")]
pub enum Frame {
    Connect {
        version: String,
        support: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<String>,
    },
    Connected {
        session: String,
    },
    Failed {
        version: String,
    },
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    Method {
        id: String,
        method: String,
        #[serde(default)]
        params: Vec<Value>,
    },
    Result {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(
            default,
            deserialize_with = "lenient_error",
            skip_serializing_if = "Option::is_none"
        )]
        error: Option<ServerError>,
    },
    Updated {
        #[serde(default)]
        methods: Vec<String>,
    },
    Sub {
        id: String,
        name: String,
        #[serde(default)]
        params: Vec<Value>,
    },
    Unsub {
        id: String,
    },
    Ready {
        #[serde(default)]
        subs: Vec<String>,
    },
    Nosub {
        id: String,
        #[serde(
            default,
            deserialize_with = "lenient_error",
            skip_serializing_if = "Option::is_none"
        )]
        error: Option<ServerError>,
    },
    Added(Push),
    Changed(Push),
    Removed(Push),
    Error {
        #[serde(default)]
        reason: String,
        #[serde(default, rename = "offendingMessage", skip_serializing_if = "Option::is_none")]
        offending_message: Option<Value>,
    },
    /// Anything we do not recognise. Kept verbatim.
    #[serde(skip)]
    Unknown(Value),
}

impl Frame {
    /// The handshake frame, optionally resuming a previous session.
    pub fn connect(session: Option<String>) -> Self {
        Self::Connect {
            version: DDP_VERSION.to_string(),
            support: DDP_SUPPORTED.iter().map(|v| v.to_string()).collect(),
            session,
        }
    }

    pub fn method(id: impl Into<String>, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self::Method {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    pub fn sub(id: impl Into<String>, name: impl Into<String>, params: Vec<Value>) -> Self {
        Self::Sub {
            id: id.into(),
            name: name.into(),
            params,
        }
    }

    /// Short name of the frame kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Connected { .. } => "connected",
            Self::Failed { .. } => "failed",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
            Self::Method { .. } => "method",
            Self::Result { .. } => "result",
            Self::Updated { .. } => "updated",
            Self::Sub { .. } => "sub",
            Self::Unsub { .. } => "unsub",
            Self::Ready { .. } => "ready",
            Self::Nosub { .. } => "nosub",
            Self::Added(_) => "added",
            Self::Changed(_) => "changed",
            Self::Removed(_) => "removed",
            Self::Error { .. } => "error",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Serialize a frame to its wire text.
pub fn encode(frame: &Frame) -> Result<String, FrameError> {
    match frame {
        Frame::Unknown(raw) => Ok(raw.to_string()),
        other => serde_json::to_string(other).map_err(FrameError::Encode),
    }
}

/// Parse wire text into a frame.
///
/// Fails only when `text` is not JSON. Unknown kinds and unexpected shapes
/// decode to [`Frame::Unknown`].
pub fn decode(text: &str) -> Result<Frame, FrameError> {
    let value: Value = serde_json::from_str(text).map_err(FrameError::Malformed)?;
    match Frame::deserialize(&value) {
        Ok(frame) => Ok(frame),
        Err(e) => {
            tracing::debug!(error = %e, "unrecognised frame shape");
            Ok(Frame::Unknown(value))
        }
    }
}

/// `error` fields decode whatever the server put there, so a reply with an
/// odd error still settles its call.
fn lenient_error<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<ServerError>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.filter(|v| !v.is_null()).map(ServerError::from_value))
}
