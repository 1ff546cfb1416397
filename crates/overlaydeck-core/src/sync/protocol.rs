//! Wire messages between windows and between a window and the relay.

use crate::config::WindowRole;
use crate::transform::{WidgetId, WidgetTransform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Identifier of one window (tab) taking part in a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(String);

impl WindowId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing id string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Message broadcast between windows of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncMessage {
    /// A widget's committed transform.
    Update {
        widget_id: WidgetId,
        transform: WidgetTransform,
        origin: WindowId,
    },
    /// A late window asks for every widget's state.
    RequestState { origin: WindowId },
}

impl SyncMessage {
    /// The window that sent the message.
    pub fn origin(&self) -> &WindowId {
        match self {
            Self::Update { origin, .. } | Self::RequestState { origin } => origin,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Messages sent to the relay server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a session
    Join { session: String, role: WindowRole },
    /// Leave current session
    Leave,
    /// Broadcast a committed transform
    Update {
        widget_id: WidgetId,
        transform: WidgetTransform,
        origin: WindowId,
    },
    /// Ask the session for every widget's state
    RequestState { origin: WindowId },
}

impl From<SyncMessage> for ClientMessage {
    fn from(message: SyncMessage) -> Self {
        match message {
            SyncMessage::Update {
                widget_id,
                transform,
                origin,
            } => Self::Update {
                widget_id,
                transform,
                origin,
            },
            SyncMessage::RequestState { origin } => Self::RequestState { origin },
        }
    }
}

/// Messages received from the relay server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirm session join with the last known transforms
    Joined {
        session: String,
        peer_count: usize,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        snapshot: BTreeMap<WidgetId, WidgetTransform>,
    },
    /// Peer joined the session
    PeerJoined { peer_id: String },
    /// Peer left the session
    PeerLeft { peer_id: String },
    /// Transform from another peer
    Update {
        from: String,
        widget_id: WidgetId,
        transform: WidgetTransform,
        origin: WindowId,
    },
    /// State request from another peer
    RequestState { from: String, origin: WindowId },
    /// Error message
    Error { message: String },
}

impl ServerMessage {
    /// The window-level message carried by this server message, if any.
    pub fn into_sync(self) -> Option<SyncMessage> {
        match self {
            Self::Update {
                widget_id,
                transform,
                origin,
                ..
            } => Some(SyncMessage::Update {
                widget_id,
                transform,
                origin,
            }),
            Self::RequestState { origin, .. } => Some(SyncMessage::RequestState { origin }),
            _ => None,
        }
    }
}
