//! WebSocket room client that survives transport drops.
//!
//! A background driver task owns the [`Controller`] and the socket. The
//! handle only queues commands and, while the session is joined, hands text
//! frames straight to the writer.

use std::future::pending;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Sleep, sleep};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use tabletop_types::events::{ClientIntent, ErrorCode, ServerEvent};

use crate::backoff::Backoff;
use crate::controller::{Action, Controller, Status, Target};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not connected")]
    NotConnected,
    #[error("client driver has stopped")]
    DriverStopped,
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
    #[error("failed to encode intent: {0}")]
    Encode(#[from] serde_json::Error),
}

type WriterSlot = Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>;

enum Command {
    Connect(Target),
    Disconnect,
}

enum TransportEvent {
    /// The server accepted the join and sent its snapshot
    Joined {
        generation: u64,
        writer: mpsc::UnboundedSender<String>,
    },
    Rejected {
        generation: u64,
        code: ErrorCode,
    },
    Closed {
        generation: u64,
    },
}

/// Handle to a reconnecting room connection.
pub struct TabletopClient {
    server_url: Url,
    commands: mpsc::UnboundedSender<Command>,
    writer: WriterSlot,
    event_rx: Option<mpsc::UnboundedReceiver<ServerEvent>>,
    status_rx: Option<mpsc::UnboundedReceiver<Status>>,
}

impl TabletopClient {
    /// `server_url` is the WebSocket origin, e.g. `ws://localhost:3001`.
    /// Must be called inside a tokio runtime.
    pub fn new(server_url: &str, backoff: Backoff) -> Result<Self, ClientError> {
        let server_url =
            Url::parse(server_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        if server_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(server_url.to_string()));
        }

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let writer: WriterSlot = Arc::new(Mutex::new(None));

        let driver = Driver {
            controller: Controller::new(backoff),
            server_url: server_url.clone(),
            writer: writer.clone(),
            event_tx,
            status_tx,
            transport: None,
            timer: None,
            rng: StdRng::from_os_rng(),
        };
        tokio::spawn(driver.run(command_rx));

        Ok(Self {
            server_url,
            commands,
            writer,
            event_rx: Some(event_rx),
            status_rx: Some(status_rx),
        })
    }

    /// Take the decoded server events (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::UnboundedReceiver<ServerEvent>> {
        self.event_rx.take()
    }

    /// Take the connection status notifications (can only be called once).
    pub fn take_status_rx(&mut self) -> Option<mpsc::UnboundedReceiver<Status>> {
        self.status_rx.take()
    }

    pub fn server_url(&self) -> &str {
        self.server_url.as_str()
    }

    /// Open a session for `code`, replacing any current one.
    pub fn connect(&self, code: &str, token: &str) -> Result<(), ClientError> {
        self.commands
            .send(Command::Connect(Target {
                code: code.to_string(),
                token: token.to_string(),
            }))
            .map_err(|_| ClientError::DriverStopped)
    }

    /// Close the session for good; no reconnect follows.
    pub fn disconnect(&self) -> Result<(), ClientError> {
        self.commands
            .send(Command::Disconnect)
            .map_err(|_| ClientError::DriverStopped)
    }

    /// Send an intent if the session is joined. Nothing is queued for later.
    pub fn try_send(&self, intent: &ClientIntent) -> Result<(), ClientError> {
        let text = serde_json::to_string(intent)?;
        let writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        match writer.as_ref() {
            Some(tx) if tx.send(text).is_ok() => Ok(()),
            _ => Err(ClientError::NotConnected),
        }
    }

    /// Like [`try_send`](Self::try_send), reporting only whether the frame
    /// was handed to an open transport.
    pub fn send(&self, intent: &ClientIntent) -> bool {
        self.try_send(intent).is_ok()
    }
}

/// `<origin>/ws/<code>?token=<token>`, with both parts percent-encoded.
fn socket_url(base: &Url, target: &Target) -> Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().extend(["ws", target.code.as_str()]);
    }
    url.query_pairs_mut()
        .clear()
        .append_pair("token", &target.token);
    url
}

/// Errors after which the same credentials can never succeed.
fn is_auth_failure(code: ErrorCode) -> bool {
    matches!(
        code,
        ErrorCode::AuthRequired | ErrorCode::InvalidToken | ErrorCode::RoomMismatch
    )
}

struct Driver {
    controller: Controller,
    server_url: Url,
    writer: WriterSlot,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    status_tx: mpsc::UnboundedSender<Status>,
    transport: Option<JoinHandle<()>>,
    timer: Option<Pin<Box<Sleep>>>,
    rng: StdRng,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let (transport_tx, mut transport_rx) = mpsc::unbounded_channel();

        loop {
            let actions = tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Connect(target)) => self.controller.connect(target),
                    Some(Command::Disconnect) => self.controller.disconnect(),
                    None => {
                        // Handle dropped: shut everything down
                        let actions = self.controller.disconnect();
                        self.apply(actions, &transport_tx);
                        return;
                    }
                },
                Some(event) = transport_rx.recv() => match event {
                    TransportEvent::Joined { generation, writer } => {
                        let actions = self.controller.on_open(generation);
                        if !actions.is_empty() {
                            *self.writer.lock().unwrap_or_else(|e| e.into_inner()) = Some(writer);
                        }
                        actions
                    }
                    TransportEvent::Rejected { generation, code } => {
                        self.controller.on_rejected(generation, code)
                    }
                    TransportEvent::Closed { generation } => {
                        let jitter = self.controller.backoff().jitter(&mut self.rng);
                        self.controller.on_close(generation, jitter)
                    }
                },
                () = wait_for(&mut self.timer) => {
                    self.timer = None;
                    self.controller.on_timer()
                }
            };
            self.apply(actions, &transport_tx);
        }
    }

    fn apply(&mut self, actions: Vec<Action>, transport_tx: &mpsc::UnboundedSender<TransportEvent>) {
        for action in actions {
            match action {
                Action::Open { generation, target } => {
                    if let Some(old) = self.transport.take() {
                        old.abort();
                    }
                    let url = socket_url(&self.server_url, &target);
                    debug!("Opening room socket for {} (attempt generation {})", target.code, generation);
                    self.transport = Some(tokio::spawn(run_transport(
                        url.to_string(),
                        generation,
                        transport_tx.clone(),
                        self.event_tx.clone(),
                    )));
                }
                Action::Close => {
                    if let Some(old) = self.transport.take() {
                        old.abort();
                    }
                }
                Action::Schedule(delay) => self.timer = Some(Box::pin(sleep(delay))),
                Action::CancelTimer => self.timer = None,
                Action::Notify(status) => {
                    match status {
                        Status::Connected => info!("Room socket connected"),
                        Status::ConnectionLost => warn!("Room socket lost"),
                        Status::Reconnecting { attempt, delay } => {
                            info!("Reconnecting (attempt {}) in {:?}", attempt, delay)
                        }
                        Status::GaveUp => warn!("Giving up on room socket"),
                        Status::Rejected(code) => warn!("Server refused the session: {:?}", code),
                    }
                    let _ = self.status_tx.send(status);
                }
            }
        }

        if !self.controller.can_send() {
            *self.writer.lock().unwrap_or_else(|e| e.into_inner()) = None;
        }
    }
}

async fn wait_for(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.await,
        None => pending().await,
    }
}

/// One socket, from connect to close. Ends with `Rejected` if the server
/// refused the credentials, `Closed` otherwise.
///
/// The session only counts as joined once the room snapshot arrives; an
/// upgrade the server then closes is a failed attempt.
async fn run_transport(
    url: String,
    generation: u64,
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
) {
    let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            debug!("Connect failed: {}", e);
            let _ = transport_tx.send(TransportEvent::Closed { generation });
            return;
        }
    };

    let (mut sink, mut source) = stream.split();
    let (writer, mut outgoing) = mpsc::unbounded_channel::<String>();
    let mut writer = Some(writer);

    loop {
        tokio::select! {
            out = outgoing.recv() => {
                let Some(text) = out else { break };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            msg = source.next() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => {
                        let rejected = match &event {
                            ServerEvent::Error { code, .. } if is_auth_failure(*code) => Some(*code),
                            _ => None,
                        };
                        if matches!(event, ServerEvent::RoomState { .. }) {
                            if let Some(writer) = writer.take() {
                                let _ = transport_tx.send(TransportEvent::Joined { generation, writer });
                            }
                        }
                        let _ = event_tx.send(event);

                        if let Some(code) = rejected {
                            let _ = sink.close().await;
                            let _ = transport_tx.send(TransportEvent::Rejected { generation, code });
                            return;
                        }
                    }
                    Err(e) => debug!("Ignoring malformed server frame: {}", e),
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    }

    let _ = sink.close().await;
    let _ = transport_tx.send(TransportEvent::Closed { generation });
}
