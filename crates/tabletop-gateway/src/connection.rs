use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use tabletop_types::events::ServerEvent;

use crate::protocol::{Gateway, JoinError, Session};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Serve one room socket. `code` and `token` come from the upgrade request.
pub async fn handle_socket(socket: WebSocket, gateway: Gateway, code: String, token: Option<String>) {
    let (mut sender, receiver) = socket.split();

    let participant = match gateway.authenticate(&code, token.as_deref()).await {
        Ok(p) => p,
        Err(e) => {
            warn!("Rejected socket for room {}: {}", code, e);
            reject(&mut sender, &e).await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let session = match gateway.join(participant, tx).await {
        Ok(s) => s,
        Err(e) => {
            warn!("Join for room {} failed: {:#}", code, e);
            reject(&mut sender, &e).await;
            return;
        }
    };

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Queued events -> socket, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Socket -> protocol
    let (stop_tx, stop_rx) = oneshot::channel();
    let gateway_recv = gateway.clone();
    let session_recv = session.clone();
    let mut recv_task = tokio::spawn(async move {
        pump_inbound(&gateway_recv, &session_recv, receiver, stop_rx, &pong_flag_recv).await;
    });

    tokio::select! {
        _ = &mut send_task => {
            // Let an intent that is already being applied finish its broadcast
            let _ = stop_tx.send(());
            let _ = recv_task.await;
        }
        _ = &mut recv_task => send_task.abort(),
    }

    gateway.leave(&session).await;
    info!(
        "{} ({}) disconnected from room {}",
        session.participant.name,
        session.participant.id,
        session.room_id()
    );
}

/// Send the typed error, if the client caused it, then close.
async fn reject<S>(sender: &mut S, error: &JoinError)
where
    S: Sink<Message> + Unpin,
{
    if let Some(event) = error.to_event() {
        if let Ok(text) = serde_json::to_string(&event) {
            let _ = sender.send(Message::Text(text.into())).await;
        }
    }
    let _ = sender.send(Message::Close(None)).await;
}

/// Feed inbound frames to the gateway until the socket ends or `stop` fires.
///
/// `stop` is only checked between frames, so an intent is never cut off
/// between its store write and its broadcast.
async fn pump_inbound<S>(
    gateway: &Gateway,
    session: &Session,
    mut frames: S,
    mut stop: oneshot::Receiver<()>,
    pong_received: &AtomicBool,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let frame = tokio::select! {
            biased;
            frame = frames.next() => frame,
            _ = &mut stop => break,
        };
        match frame {
            Some(Ok(Message::Text(text))) => gateway.handle_text(session, &text).await,
            Some(Ok(Message::Pong(_))) => pong_received.store(true, Ordering::Release),
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            Some(Ok(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::stream;
    use tabletop_db::Database;
    use tabletop_store::{CanvasStore, ChatLog, RoomDirectory, SystemClock};

    use super::*;

    #[tokio::test]
    async fn stop_lets_received_intents_finish() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let clock = Arc::new(SystemClock);
        let rooms = RoomDirectory::new(db.clone(), clock.clone());
        let gateway = Gateway::new(
            rooms.clone(),
            CanvasStore::new(db.clone(), clock.clone()),
            ChatLog::new(db, clock),
        );
        let room = rooms.create_room("Keep").await.unwrap();
        let participant = gateway
            .authenticate(&room.room.code, Some(&room.session_token))
            .await
            .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = gateway.join(participant, tx).await.unwrap();
        assert!(matches!(rx.recv().await, Some(ServerEvent::RoomState { .. })));

        // The frame is already buffered when the send side gives up
        let frame = r#"{"type":"object_create","payload":{"type":"sticky_note","content":"late"}}"#;
        let frames = stream::iter(vec![Ok::<_, axum::Error>(Message::Text(frame.to_string().into()))])
            .chain(stream::pending());
        let (stop_tx, stop_rx) = oneshot::channel();
        stop_tx.send(()).unwrap();
        let pong = AtomicBool::new(false);

        tokio::time::timeout(
            Duration::from_secs(5),
            pump_inbound(&gateway, &session, frames, stop_rx, &pong),
        )
        .await
        .expect("stop was not honoured");

        match rx.try_recv() {
            Ok(ServerEvent::ObjectCreated(obj)) => assert_eq!(obj.content.as_deref(), Some("late")),
            other => panic!("expected object_created, got {other:?}"),
        }
    }
}
