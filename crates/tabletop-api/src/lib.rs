//! REST surface: room lifecycle and asset upload.

pub mod assets;
pub mod rooms;
pub mod state;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};

pub use state::{AppState, AppStateInner};

/// Routes under `/api`. `{room}` is a room id for DELETE and a room code
/// elsewhere.
pub fn router(state: AppState) -> Router {
    // Bodies over the limit are rejected with 413 before the handler runs
    let upload_limit = state.max_upload_bytes;

    Router::new()
        .route("/api/health", get(rooms::health))
        .route("/api/rooms", get(rooms::list_rooms).post(rooms::create_room))
        .route("/api/rooms/{room}", delete(rooms::delete_room))
        .route("/api/rooms/{room}/join", post(rooms::join_room))
        .route(
            "/api/rooms/{room}/assets",
            post(assets::upload_asset).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .with_state(state)
}
