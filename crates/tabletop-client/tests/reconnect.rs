use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use tabletop_client::{Backoff, Status, TabletopClient};
use tabletop_types::events::{ClientIntent, ErrorCode, ServerEvent};

fn quick(max_attempts: u32) -> Backoff {
    Backoff {
        base: Duration::from_millis(10),
        cap: Duration::from_millis(40),
        max_attempts,
        max_jitter: Duration::ZERO,
    }
}

async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed")
}

fn snapshot() -> ServerEvent {
    ServerEvent::RoomState {
        objects: vec![],
        messages: vec![],
        participants: vec![],
    }
}

async fn send_event<S>(ws: &mut S, event: &ServerEvent)
where
    S: futures_util::Sink<Message> + Unpin,
    S::Error: std::fmt::Debug,
{
    ws.send(Message::Text(serde_json::to_string(event).unwrap().into()))
        .await
        .unwrap();
}

/// Accepts sockets forever. Each one gets a room snapshot; the first is then
/// closed by the server, later ones forward inbound text to `inbound`.
async fn flaky_server(
    listener: TcpListener,
    paths: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedSender<String>,
) {
    let mut accepted = 0;
    while let Ok((stream, _)) = listener.accept().await {
        accepted += 1;
        let paths = paths.clone();
        let inbound = inbound.clone();
        let first = accepted == 1;
        tokio::spawn(async move {
            let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                let _ = paths.send(req.uri().to_string());
                Ok(resp)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .unwrap();
            send_event(&mut ws, &snapshot()).await;
            if first {
                ws.close(None).await.ok();
                return;
            }
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(text) = msg {
                    let _ = inbound.send(text.to_string());
                }
            }
        });
    }
}

#[tokio::test]
async fn reconnects_after_server_drop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (paths_tx, mut paths) = mpsc::unbounded_channel();
    let (inbound_tx, mut inbound) = mpsc::unbounded_channel();
    tokio::spawn(flaky_server(listener, paths_tx, inbound_tx));

    let mut client = TabletopClient::new(&format!("ws://{addr}"), quick(5)).unwrap();
    let mut events = client.take_event_rx().unwrap();
    let mut statuses = client.take_status_rx().unwrap();
    assert!(client.take_event_rx().is_none());

    client.connect("ABC234", "secret").unwrap();
    assert_eq!(next(&mut paths).await, "/ws/ABC234?token=secret");
    assert_eq!(next(&mut statuses).await, Status::Connected);
    assert_eq!(next(&mut events).await, snapshot());

    // The server hangs up on the first socket
    assert_eq!(next(&mut statuses).await, Status::ConnectionLost);
    assert_eq!(
        next(&mut statuses).await,
        Status::Reconnecting {
            attempt: 1,
            delay: Duration::from_millis(10)
        }
    );
    assert_eq!(next(&mut paths).await, "/ws/ABC234?token=secret");
    assert_eq!(next(&mut statuses).await, Status::Connected);
    assert_eq!(next(&mut events).await, snapshot());

    let intent = ClientIntent::ChatMessage {
        content: "back again".into(),
    };
    assert!(client.send(&intent));
    let sent: ClientIntent = serde_json::from_str(&next(&mut inbound).await).unwrap();
    assert_eq!(sent, intent);

    client.disconnect().unwrap();
    let mut dropped = false;
    for _ in 0..100 {
        if !client.send(&intent) {
            dropped = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(dropped, "send still accepted after disconnect");
    assert!(
        timeout(Duration::from_millis(100), statuses.recv()).await.is_err(),
        "explicit disconnect must not trigger a reconnect"
    );
}

#[tokio::test]
async fn gives_up_when_server_is_gone() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut client = TabletopClient::new(&format!("ws://{addr}"), quick(3)).unwrap();
    let mut statuses = client.take_status_rx().unwrap();
    client.connect("ABC234", "secret").unwrap();

    let mut seen = Vec::new();
    loop {
        let status = next(&mut statuses).await;
        seen.push(status);
        if status == Status::GaveUp {
            break;
        }
    }

    let ms = Duration::from_millis;
    assert_eq!(
        seen,
        vec![
            Status::ConnectionLost,
            Status::Reconnecting { attempt: 1, delay: ms(10) },
            Status::Reconnecting { attempt: 2, delay: ms(20) },
            Status::Reconnecting { attempt: 3, delay: ms(40) },
            Status::GaveUp,
        ]
    );
    assert!(timeout(ms(100), statuses.recv()).await.is_err());
}

#[tokio::test]
async fn send_before_open_is_dropped() {
    let client = TabletopClient::new("ws://127.0.0.1:9", quick(0)).unwrap();
    let intent = ClientIntent::DiceRoll {
        formula: "1d20".into(),
    };
    assert!(!client.send(&intent));
    assert!(matches!(
        client.try_send(&intent),
        Err(tabletop_client::ClientError::NotConnected)
    ));
}

#[tokio::test]
async fn refused_credentials_stop_the_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (accepted_tx, mut accepted) = mpsc::unbounded_channel();

    // Upgrades every socket, then turns the token away
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let accepted_tx = accepted_tx.clone();
            tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let _ = accepted_tx.send(());
                let refusal = ServerEvent::error(ErrorCode::InvalidToken, "Invalid session token");
                send_event(&mut ws, &refusal).await;
                ws.close(None).await.ok();
            });
        }
    });

    let mut client = TabletopClient::new(&format!("ws://{addr}"), quick(5)).unwrap();
    let mut events = client.take_event_rx().unwrap();
    let mut statuses = client.take_status_rx().unwrap();
    client.connect("ABC234", "revoked").unwrap();

    assert!(matches!(
        next(&mut events).await,
        ServerEvent::Error {
            code: ErrorCode::InvalidToken,
            ..
        }
    ));
    assert_eq!(next(&mut statuses).await, Status::Rejected(ErrorCode::InvalidToken));

    // No retry: one upgrade, and nothing more to report
    next(&mut accepted).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(accepted.try_recv().is_err());
    assert!(statuses.try_recv().is_err());
    assert!(!client.send(&ClientIntent::ChatMessage {
        content: "hello?".into()
    }));
}

#[tokio::test]
async fn closed_before_snapshot_counts_as_a_failed_attempt() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Upgrades, then hangs up without ever sending the room state
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                ws.close(None).await.ok();
            });
        }
    });

    let mut client = TabletopClient::new(&format!("ws://{addr}"), quick(2)).unwrap();
    let mut statuses = client.take_status_rx().unwrap();
    client.connect("ABC234", "secret").unwrap();

    let mut seen = Vec::new();
    loop {
        let status = next(&mut statuses).await;
        seen.push(status);
        if status == Status::GaveUp {
            break;
        }
    }
    assert!(!seen.contains(&Status::Connected));
    assert_eq!(seen.iter().filter(|s| **s == Status::ConnectionLost).count(), 1);
    assert_eq!(seen.len(), 4);
}
