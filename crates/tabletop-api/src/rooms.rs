use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use tracing::{error, warn};
use uuid::Uuid;

use tabletop_types::api::{CreateRoomRequest, JoinRoomRequest, RoomListResponse};

use crate::state::AppState;

const MAX_ROOM_NAME: usize = 100;
const MAX_PARTICIPANT_NAME: usize = 50;

fn valid_name(name: &str, max: usize) -> Option<&str> {
    let name = name.trim();
    let len = name.chars().count();
    (len >= 1 && len <= max).then_some(name)
}

fn internal(e: anyhow::Error) -> StatusCode {
    error!("Room store error: {:#}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn list_rooms(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let rooms = state.rooms.list_rooms().await.map_err(internal)?;
    Ok(Json(RoomListResponse { rooms }))
}

pub async fn create_room(
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let name = valid_name(&req.name, MAX_ROOM_NAME).ok_or(StatusCode::BAD_REQUEST)?;
    let created = state.rooms.create_room(name).await.map_err(internal)?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn join_room(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(req): Json<JoinRoomRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let name = valid_name(&req.name, MAX_PARTICIPANT_NAME).ok_or(StatusCode::BAD_REQUEST)?;
    let joined = state
        .rooms
        .join_room(&code, name, req.gm_secret.as_deref())
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(joined))
}

pub async fn delete_room(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let paths = state
        .rooms
        .delete_room(room_id)
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;

    if let Err(e) = state.storage.delete_all(room_id, &paths).await {
        warn!("Failed to remove assets for room {}: {:#}", room_id, e);
    }
    Ok(Json(json!({ "success": true })))
}
