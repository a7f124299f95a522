use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use bytes::Bytes;
use tracing::{error, info};
use uuid::Uuid;

use tabletop_store::{AssetStorage, NewAsset};
use tabletop_types::api::AssetUploadResponse;

use crate::state::AppState;

pub const SESSION_TOKEN_HEADER: &str = "x-session-token";
pub const FILENAME_HEADER: &str = "x-filename";

/// Accepted upload types and the extension they are stored under.
const ALLOWED_TYPES: &[(&str, &str)] = &[
    ("image/png", ".png"),
    ("image/jpeg", ".jpg"),
    ("image/gif", ".gif"),
    ("image/webp", ".webp"),
    ("application/pdf", ".pdf"),
];

fn extension_for(mime_type: &str) -> Option<&'static str> {
    ALLOWED_TYPES
        .iter()
        .find(|(mime, _)| *mime == mime_type)
        .map(|(_, ext)| *ext)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn internal(e: anyhow::Error) -> StatusCode {
    error!("Asset upload failed: {:#}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Raw-body upload. The participant's session token must belong to the room
/// named in the path.
pub async fn upload_asset(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, StatusCode> {
    let token = header_str(&headers, SESSION_TOKEN_HEADER)
        .filter(|t| !t.is_empty())
        .ok_or(StatusCode::UNAUTHORIZED)?;
    let participant = state
        .rooms
        .participant_by_token(token)
        .await
        .map_err(internal)?
        .ok_or(StatusCode::UNAUTHORIZED)?;
    let room = state
        .rooms
        .room_by_code(&code)
        .await
        .map_err(internal)?
        .filter(|room| room.id == participant.room_id)
        .ok_or(StatusCode::NOT_FOUND)?;

    let mime_type = header_str(&headers, header::CONTENT_TYPE.as_str())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase())
        .ok_or(StatusCode::UNSUPPORTED_MEDIA_TYPE)?;
    let ext = extension_for(&mime_type).ok_or(StatusCode::UNSUPPORTED_MEDIA_TYPE)?;

    if body.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if body.len() > state.max_upload_bytes {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }

    let asset_id = Uuid::new_v4();
    let stored_name = format!("{asset_id}{ext}");
    let relative = AssetStorage::relative_path(room.id, asset_id, ext);
    let filename = header_str(&headers, FILENAME_HEADER)
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| stored_name.clone());

    state.storage.write(&relative, &body).await.map_err(internal)?;
    let asset = state
        .assets
        .record(NewAsset {
            id: asset_id,
            room_id: room.id,
            uploaded_by: participant.id,
            filename,
            storage_path: relative,
            mime_type,
            size_bytes: body.len() as u64,
        })
        .await
        .map_err(internal)?;

    info!(
        "{} uploaded {} ({} bytes) to room {}",
        participant.name, asset.filename, asset.size_bytes, room.code
    );

    Ok((
        StatusCode::CREATED,
        Json(AssetUploadResponse {
            id: asset.id,
            filename: asset.filename,
            mime_type: asset.mime_type,
            size_bytes: asset.size_bytes,
            url: format!("/uploads/{}/{}", room.id, stored_name),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_known_types_map_to_extensions() {
        assert_eq!(extension_for("image/png"), Some(".png"));
        assert_eq!(extension_for("image/jpeg"), Some(".jpg"));
        assert_eq!(extension_for("application/pdf"), Some(".pdf"));
        assert_eq!(extension_for("image/svg+xml"), None);
        assert_eq!(extension_for("text/html"), None);
    }
}
