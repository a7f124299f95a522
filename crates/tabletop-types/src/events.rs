use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    ChatMessage, ObjectCreatePayload, ObjectRef, ObjectUpdatePayload, Participant,
    WhiteboardObject,
};

/// Intents sent FROM client TO server over the room socket.
///
/// Wire shape: `{"type": "object_update", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientIntent {
    /// Joining happens when the socket is opened; kept for older clients.
    JoinRoom { session_token: String },

    ChatMessage { content: String },

    DiceRoll { formula: String },

    ObjectCreate(ObjectCreatePayload),

    ObjectUpdate(ObjectUpdatePayload),

    ObjectDelete(ObjectRef),

    /// GM only
    ObjectReveal(ObjectRef),

    /// GM only
    ObjectHide(ObjectRef),
}

impl ClientIntent {
    /// Wire name of the intent, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join_room",
            Self::ChatMessage { .. } => "chat_message",
            Self::DiceRoll { .. } => "dice_roll",
            Self::ObjectCreate(_) => "object_create",
            Self::ObjectUpdate(_) => "object_update",
            Self::ObjectDelete(_) => "object_delete",
            Self::ObjectReveal(_) => "object_reveal",
            Self::ObjectHide(_) => "object_hide",
        }
    }
}

/// Events sent FROM server TO clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Full snapshot, sent once right after a successful join
    RoomState {
        objects: Vec<WhiteboardObject>,
        messages: Vec<ChatMessage>,
        participants: Vec<Participant>,
    },

    ParticipantJoined(Participant),

    ParticipantLeft { id: Uuid },

    ObjectCreated(WhiteboardObject),

    ObjectUpdated(WhiteboardObject),

    ObjectDeleted { id: Uuid },

    ObjectRevealed(WhiteboardObject),

    ObjectHidden { id: Uuid },

    ChatBroadcast(ChatMessage),

    Error { code: ErrorCode, message: String },
}

impl ServerEvent {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AuthRequired,
    InvalidToken,
    RoomMismatch,
    InvalidDice,
}
