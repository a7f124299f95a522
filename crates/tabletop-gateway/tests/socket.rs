//! Room sockets served by axum on a real listener, driven by a
//! tokio-tungstenite client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use tabletop_db::Database;
use tabletop_gateway::{Gateway, connection};
use tabletop_store::{CanvasStore, ChatLog, RoomDirectory, SystemClock};
use tabletop_types::events::{ErrorCode, ServerEvent};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn ws_upgrade(
    State(gateway): State<Gateway>,
    Path(code): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let token = params.get("token").cloned();
    ws.on_upgrade(move |socket| connection::handle_socket(socket, gateway, code, token))
}

async fn serve() -> (String, Gateway, RoomDirectory) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let clock = Arc::new(SystemClock);
    let rooms = RoomDirectory::new(db.clone(), clock.clone());
    let gateway = Gateway::new(
        rooms.clone(),
        CanvasStore::new(db.clone(), clock.clone()),
        ChatLog::new(db, clock),
    );

    let app = Router::new()
        .route("/ws/{code}", get(ws_upgrade))
        .with_state(gateway.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    (format!("ws://{addr}"), gateway, rooms)
}

async fn open(base: &str, path: &str) -> Socket {
    let (ws, _) = tokio_tungstenite::connect_async(format!("{base}{path}"))
        .await
        .unwrap();
    ws
}

/// Next decoded event, or `None` once the server has closed the socket.
async fn next_event(ws: &mut Socket) -> Option<ServerEvent> {
    loop {
        match timeout(Duration::from_secs(5), ws.next()).await.expect("timed out") {
            Some(Ok(Message::Text(text))) => return Some(serde_json::from_str(&text).unwrap()),
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
            Some(Ok(_)) => {}
        }
    }
}

#[tokio::test]
async fn rejected_sockets_get_a_typed_error_then_close() {
    let (base, gateway, rooms) = serve().await;
    let a = rooms.create_room("A").await.unwrap();
    let b = rooms.create_room("B").await.unwrap();
    let code = &a.room.code;

    let cases = [
        (format!("/ws/{code}"), ErrorCode::AuthRequired),
        (format!("/ws/{code}?token=bogus"), ErrorCode::InvalidToken),
        (format!("/ws/{code}?token={}", b.session_token), ErrorCode::RoomMismatch),
    ];
    for (path, expected) in cases {
        let mut ws = open(&base, &path).await;
        match next_event(&mut ws).await {
            Some(ServerEvent::Error { code, .. }) => assert_eq!(code, expected, "{path}"),
            other => panic!("{path}: expected an error frame, got {other:?}"),
        }
        assert_eq!(next_event(&mut ws).await, None, "{path}: socket left open");
    }

    assert!(!gateway.registry().is_room_live(a.room.id).await);
    assert!(!gateway.registry().is_room_live(b.room.id).await);
}

#[tokio::test]
async fn closing_a_socket_announces_the_departure_once() {
    let (base, gateway, rooms) = serve().await;
    let room = rooms.create_room("Keep").await.unwrap();
    let code = &room.room.code;
    let player = rooms.join_room(code, "Aria", None).await.unwrap().unwrap();

    let mut gm = open(&base, &format!("/ws/{code}?token={}", room.session_token)).await;
    assert!(matches!(next_event(&mut gm).await, Some(ServerEvent::RoomState { .. })));

    let mut aria = open(&base, &format!("/ws/{code}?token={}", player.session_token)).await;
    assert!(matches!(next_event(&mut aria).await, Some(ServerEvent::RoomState { .. })));
    match next_event(&mut gm).await {
        Some(ServerEvent::ParticipantJoined(p)) => assert_eq!(p.id, player.participant.id),
        other => panic!("expected participant_joined, got {other:?}"),
    }

    aria.close(None).await.unwrap();

    assert_eq!(
        next_event(&mut gm).await,
        Some(ServerEvent::ParticipantLeft {
            id: player.participant.id
        })
    );
    assert!(
        timeout(Duration::from_millis(300), gm.next()).await.is_err(),
        "departure announced more than once"
    );
    assert_eq!(gateway.registry().connections_in_room(room.room.id).await.len(), 1);
}
