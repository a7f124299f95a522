use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use tabletop_db::models::{AssetRow, ChatMessageRow, ObjectRow, ParticipantRow, RoomRow};
use tabletop_types::models::{
    Asset, ChatMessage, ChatMessageType, Participant, Room, WhiteboardObject,
    WhiteboardObjectType,
};

/// Millisecond precision keeps stored timestamps lexically sortable.
pub(crate) fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("corrupt timestamp '{s}'"))
}

pub(crate) fn parse_id(s: &str) -> Result<Uuid> {
    s.parse().with_context(|| format!("corrupt id '{s}'"))
}

pub(crate) fn room_from_row(row: RoomRow) -> Result<Room> {
    Ok(Room {
        id: parse_id(&row.id)?,
        code: row.code,
        name: row.name,
        created_at: parse_time(&row.created_at)?,
    })
}

pub(crate) fn participant_from_row(row: ParticipantRow) -> Result<Participant> {
    Ok(Participant {
        id: parse_id(&row.id)?,
        room_id: parse_id(&row.room_id)?,
        name: row.name,
        is_gm: row.is_gm,
        last_seen: parse_time(&row.last_seen)?,
    })
}

pub(crate) fn object_from_row(row: ObjectRow) -> Result<WhiteboardObject> {
    let kind = WhiteboardObjectType::parse(&row.kind)
        .ok_or_else(|| anyhow!("corrupt object type '{}' on object '{}'", row.kind, row.id))?;
    let style = row
        .style
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .with_context(|| format!("corrupt style on object '{}'", row.id))?;

    Ok(WhiteboardObject {
        id: parse_id(&row.id)?,
        room_id: parse_id(&row.room_id)?,
        kind,
        x: row.x,
        y: row.y,
        width: row.width,
        height: row.height,
        z_index: row.z_index,
        content: row.content,
        asset_id: row.asset_id.as_deref().map(parse_id).transpose()?,
        hidden_from_players: row.hidden_from_players,
        style,
        created_by: parse_id(&row.created_by)?,
        created_at: parse_time(&row.created_at)?,
        updated_at: parse_time(&row.updated_at)?,
    })
}

pub(crate) fn chat_from_row(row: ChatMessageRow) -> Result<ChatMessage> {
    let kind = ChatMessageType::parse(&row.kind)
        .ok_or_else(|| anyhow!("corrupt message type '{}' on message '{}'", row.kind, row.id))?;
    let dice_results = row
        .dice_results
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .with_context(|| format!("corrupt dice results on message '{}'", row.id))?;

    Ok(ChatMessage {
        id: parse_id(&row.id)?,
        room_id: parse_id(&row.room_id)?,
        sender_id: parse_id(&row.sender_id)?,
        sender_name: row.sender_name,
        kind,
        content: row.content,
        dice_formula: row.dice_formula,
        dice_results,
        created_at: parse_time(&row.created_at)?,
    })
}

pub(crate) fn asset_from_row(row: AssetRow) -> Result<Asset> {
    Ok(Asset {
        id: parse_id(&row.id)?,
        room_id: parse_id(&row.room_id)?,
        filename: row.filename,
        storage_path: row.storage_path,
        mime_type: row.mime_type,
        size_bytes: u64::try_from(row.size_bytes).unwrap_or_default(),
        uploaded_by: parse_id(&row.uploaded_by)?,
        created_at: parse_time(&row.created_at)?,
    })
}
