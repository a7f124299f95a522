mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use tabletop_api::AppStateInner;
use tabletop_db::Database;
use tabletop_gateway::{Gateway, cleanup, connection};
use tabletop_store::{
    AssetCatalog, AssetStorage, CanvasStore, ChatLog, Clock, RoomDirectory, SystemClock,
};

use crate::config::Config;

#[derive(Deserialize)]
struct WsParams {
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tabletop=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database and storage
    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let db = Arc::new(Database::open(&config.db_path)?);
    let storage = AssetStorage::new(config.uploads_dir.clone()).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let rooms = RoomDirectory::new(db.clone(), clock.clone());
    let gateway = Gateway::new(
        rooms.clone(),
        CanvasStore::new(db.clone(), clock.clone()),
        ChatLog::new(db.clone(), clock.clone()).with_history_limit(config.chat_history),
    );
    let app_state = Arc::new(AppStateInner {
        rooms,
        assets: AssetCatalog::new(db, clock),
        storage: storage.clone(),
        max_upload_bytes: config.max_upload_bytes,
    });

    // Background idle-room sweep
    tokio::spawn(cleanup::run_cleanup_loop(
        gateway.clone(),
        storage,
        config.cleanup_interval,
        config.idle_after,
    ));

    let ws_route = Router::new()
        .route("/ws/{code}", get(ws_upgrade))
        .with_state(gateway);

    let app = Router::new()
        .merge(tabletop_api::router(app_state))
        .merge(ws_route)
        .nest_service("/uploads", ServeDir::new(&config.uploads_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Tabletop server listening on {}", addr);
    info!(
        "Idle rooms are reclaimed after {} hours (sweep every {:?})",
        config.idle_hours, config.cleanup_interval
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn ws_upgrade(
    State(gateway): State<Gateway>,
    Path(code): Path<String>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_socket(socket, gateway, code, params.token))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
