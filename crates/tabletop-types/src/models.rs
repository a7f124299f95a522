use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use tabletop_dice::{DiceGroup, DiceResults};

/// Default width and height of a canvas object created without a size.
pub const DEFAULT_OBJECT_SIZE: f64 = 200.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A joined identity inside one room. The session token is deliberately not
/// part of this shape; it is only ever handed to its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: Uuid,
    pub room_id: Uuid,
    pub name: String,
    pub is_gm: bool,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhiteboardObjectType {
    StickyNote,
    Image,
    Pdf,
}

impl WhiteboardObjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StickyNote => "sticky_note",
            Self::Image => "image",
            Self::Pdf => "pdf",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sticky_note" => Some(Self::StickyNote),
            "image" => Some(Self::Image),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

pub type Style = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhiteboardObject {
    pub id: Uuid,
    pub room_id: Uuid,
    #[serde(rename = "type")]
    pub kind: WhiteboardObjectType,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub z_index: i64,
    /// Note text for sticky notes, a reference URL for images and PDFs.
    pub content: Option<String>,
    pub asset_id: Option<Uuid>,
    pub hidden_from_players: bool,
    pub style: Option<Style>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMessageType {
    Text,
    DiceRoll,
}

impl ChatMessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::DiceRoll => "dice_roll",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "dice_roll" => Some(Self::DiceRoll),
            _ => None,
        }
    }
}

/// One entry of a room's append-only chat log. `sender_name` is copied at
/// send time and does not follow later renames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    #[serde(rename = "type")]
    pub kind: ChatMessageType,
    pub content: String,
    pub dice_formula: Option<String>,
    pub dice_results: Option<DiceResults>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: Uuid,
    pub room_id: Uuid,
    pub filename: String,
    pub storage_path: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

fn default_object_size() -> f64 {
    DEFAULT_OBJECT_SIZE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectCreatePayload {
    #[serde(rename = "type")]
    pub kind: WhiteboardObjectType,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default = "default_object_size")]
    pub width: f64,
    #[serde(default = "default_object_size")]
    pub height: f64,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub asset_id: Option<Uuid>,
    #[serde(default)]
    pub hidden_from_players: Option<bool>,
    #[serde(default)]
    pub style: Option<Style>,
}

impl ObjectCreatePayload {
    pub fn new(kind: WhiteboardObjectType) -> Self {
        Self {
            kind,
            x: 0.0,
            y: 0.0,
            width: DEFAULT_OBJECT_SIZE,
            height: DEFAULT_OBJECT_SIZE,
            content: None,
            asset_id: None,
            hidden_from_players: None,
            style: None,
        }
    }
}

/// Sparse update: only the fields that are present change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectUpdatePayload {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<Style>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
}

impl ObjectUpdatePayload {
    pub fn for_object(id: Uuid) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

/// Payload of intents and events that only name an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub id: Uuid,
}
