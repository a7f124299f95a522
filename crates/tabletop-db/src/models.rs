//! Database row types. These map directly to SQLite rows.
//! Distinct from tabletop-types models to keep the DB layer independent:
//! ids are UUID strings, timestamps RFC 3339 strings, JSON columns raw text.

#[derive(Debug, Clone)]
pub struct RoomRow {
    pub id: String,
    pub code: String,
    pub name: String,
    pub gm_secret: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct RoomSummaryRow {
    pub id: String,
    pub code: String,
    pub name: String,
    pub created_at: String,
    pub participant_count: u32,
}

#[derive(Debug, Clone)]
pub struct ParticipantRow {
    pub id: String,
    pub room_id: String,
    pub name: String,
    pub is_gm: bool,
    pub session_token: String,
    pub last_seen: String,
}

#[derive(Debug, Clone)]
pub struct ObjectRow {
    pub id: String,
    pub room_id: String,
    pub kind: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub z_index: i64,
    pub content: Option<String>,
    pub asset_id: Option<String>,
    pub hidden_from_players: bool,
    pub style: Option<String>,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

/// An object about to be inserted; `z_index` is assigned by the insert.
#[derive(Debug, Clone)]
pub struct NewObjectRow {
    pub id: String,
    pub room_id: String,
    pub kind: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub content: Option<String>,
    pub asset_id: Option<String>,
    pub hidden_from_players: bool,
    pub style: Option<String>,
    pub created_by: String,
    pub created_at: String,
}

/// Column changes for a sparse object update. `None` leaves the column alone.
#[derive(Debug, Clone, Default)]
pub struct ObjectChanges {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub content: Option<String>,
    pub style: Option<String>,
    pub z_index: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ChatMessageRow {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub kind: String,
    pub content: String,
    pub dice_formula: Option<String>,
    pub dice_results: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct AssetRow {
    pub id: String,
    pub room_id: String,
    pub filename: String,
    pub storage_path: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub uploaded_by: String,
    pub created_at: String,
}
