use std::sync::{Arc, Mutex};

use anyhow::Result;
use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use tabletop_dice::{RandomSource, RngSource};
use tabletop_store::{CanvasStore, ChatLog, RoomDirectory};
use tabletop_types::events::{ClientIntent, ErrorCode, ServerEvent};
use tabletop_types::models::{ObjectCreatePayload, ObjectUpdatePayload, Participant};

use crate::registry::{Binding, ConnId, EventSender, Registry};
use crate::sequencer::Sequencer;

type SharedDice = Arc<Mutex<Box<dyn RandomSource + Send>>>;

fn shared_dice(source: impl RandomSource + Send + 'static) -> SharedDice {
    let boxed: Box<dyn RandomSource + Send> = Box::new(source);
    Arc::new(Mutex::new(boxed))
}

/// Why a connection could not join its room.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error("Session token required")]
    AuthRequired,
    #[error("Invalid session token")]
    InvalidToken,
    #[error("Token does not belong to this room")]
    RoomMismatch,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl JoinError {
    /// Wire code for the client, when the failure is the client's fault.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::AuthRequired => Some(ErrorCode::AuthRequired),
            Self::InvalidToken => Some(ErrorCode::InvalidToken),
            Self::RoomMismatch => Some(ErrorCode::RoomMismatch),
            Self::Store(_) => None,
        }
    }

    pub fn to_event(&self) -> Option<ServerEvent> {
        self.code().map(|code| ServerEvent::error(code, self.to_string()))
    }
}

/// A joined connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub conn_id: ConnId,
    pub participant: Participant,
}

impl Session {
    pub fn room_id(&self) -> Uuid {
        self.participant.room_id
    }

    pub fn is_gm(&self) -> bool {
        self.participant.is_gm
    }
}

/// Room protocol: authenticates connections, replays the room snapshot and
/// turns client intents into store mutations plus registry broadcasts.
///
/// Transport-agnostic: a connection is just an [`EventSender`].
#[derive(Clone)]
pub struct Gateway {
    rooms: RoomDirectory,
    canvas: CanvasStore,
    chat: ChatLog,
    registry: Registry,
    sequencer: Sequencer,
    dice: SharedDice,
}

impl Gateway {
    pub fn new(rooms: RoomDirectory, canvas: CanvasStore, chat: ChatLog) -> Self {
        Self {
            rooms,
            canvas,
            chat,
            registry: Registry::new(),
            sequencer: Sequencer::new(),
            dice: shared_dice(RngSource(StdRng::from_os_rng())),
        }
    }

    /// Replace the dice source, e.g. with a fixed sequence in tests.
    pub fn with_dice_source(mut self, source: impl RandomSource + Send + 'static) -> Self {
        self.dice = shared_dice(source);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn rooms(&self) -> &RoomDirectory {
        &self.rooms
    }

    /// Resolve a session token against the room the socket was opened for.
    pub async fn authenticate(
        &self,
        room_code: &str,
        token: Option<&str>,
    ) -> Result<Participant, JoinError> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(JoinError::AuthRequired)?;
        let participant = self
            .rooms
            .participant_by_token(token)
            .await?
            .ok_or(JoinError::InvalidToken)?;
        match self.rooms.room_by_code(room_code).await? {
            Some(room) if room.id == participant.room_id => Ok(participant),
            _ => Err(JoinError::RoomMismatch),
        }
    }

    /// Register an authenticated connection and bring it up to date.
    ///
    /// The snapshot goes out before anything else can be queued for the new
    /// connection, since every broadcast into the room waits on the same guard.
    /// A participant whose room was reclaimed after `authenticate` is turned
    /// away with `InvalidToken`.
    pub async fn join(&self, participant: Participant, tx: EventSender) -> Result<Session, JoinError> {
        let room_id = participant.room_id;
        let conn_id = Uuid::new_v4();
        let _guard = self.sequencer.lock(room_id).await;

        if !self.rooms.touch(participant.id).await? {
            return Err(JoinError::InvalidToken);
        }

        let binding = Binding {
            participant_id: participant.id,
            room_id,
            is_gm: participant.is_gm,
        };
        self.registry.add(conn_id, binding, tx).await;

        let snapshot = async {
            let objects = self.canvas.list(room_id, participant.is_gm).await?;
            let messages = self.chat.recent(room_id).await?;
            let participants = self.rooms.participants(room_id).await?;
            anyhow::Ok((objects, messages, participants))
        };
        let (objects, messages, participants) = match snapshot.await {
            Ok(s) => s,
            Err(e) => {
                self.registry.remove(conn_id).await;
                return Err(e.into());
            }
        };

        let joined = participants
            .iter()
            .find(|p| p.id == participant.id)
            .cloned()
            .unwrap_or(participant);

        self.registry
            .send_to(
                conn_id,
                ServerEvent::RoomState {
                    objects,
                    messages,
                    participants,
                },
            )
            .await;
        self.registry
            .broadcast(room_id, &ServerEvent::ParticipantJoined(joined.clone()), Some(conn_id))
            .await;

        info!(
            "{} ({}) joined room {}{}",
            joined.name,
            joined.id,
            room_id,
            if joined.is_gm { " as GM" } else { "" }
        );
        Ok(Session {
            conn_id,
            participant: joined,
        })
    }

    /// Handle one raw text frame. Anything that is not a known intent is dropped.
    pub async fn handle_text(&self, session: &Session, text: &str) {
        match serde_json::from_str::<ClientIntent>(text) {
            Ok(intent) => self.handle_intent(session, intent).await,
            Err(e) => {
                warn!(
                    "{} ({}) sent a malformed frame: {} -- raw: {}",
                    session.participant.name,
                    session.participant.id,
                    e,
                    text.chars().take(200).collect::<String>()
                );
            }
        }
    }

    pub async fn handle_intent(&self, session: &Session, intent: ClientIntent) {
        let kind = intent.kind();
        debug!("{} -> {}", session.participant.id, kind);

        let _guard = self.sequencer.lock(session.room_id()).await;
        if let Err(e) = self.dispatch(session, intent).await {
            warn!(
                "{} from {} in room {} failed: {:#}",
                kind,
                session.participant.id,
                session.room_id(),
                e
            );
        }
    }

    /// Deregister a connection. Only the first call for a session announces
    /// the departure.
    pub async fn leave(&self, session: &Session) {
        let _guard = self.sequencer.lock(session.room_id()).await;
        let Some(binding) = self.registry.remove(session.conn_id).await else {
            return;
        };
        self.registry
            .broadcast(
                binding.room_id,
                &ServerEvent::ParticipantLeft {
                    id: binding.participant_id,
                },
                None,
            )
            .await;
        info!(
            "{} ({}) left room {}",
            session.participant.name, binding.participant_id, binding.room_id
        );
    }

    async fn dispatch(&self, session: &Session, intent: ClientIntent) -> Result<()> {
        match intent {
            ClientIntent::JoinRoom { .. } => Ok(()),
            ClientIntent::ChatMessage { content } => self.chat_message(session, content).await,
            ClientIntent::DiceRoll { formula } => self.dice_roll(session, formula).await,
            ClientIntent::ObjectCreate(payload) => self.object_create(session, payload).await,
            ClientIntent::ObjectUpdate(payload) => self.object_update(session, payload).await,
            ClientIntent::ObjectDelete(r) => self.object_delete(session, r.id).await,
            ClientIntent::ObjectReveal(r) => self.set_visibility(session, r.id, false).await,
            ClientIntent::ObjectHide(r) => self.set_visibility(session, r.id, true).await,
        }
    }

    async fn chat_message(&self, session: &Session, content: String) -> Result<()> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(());
        }
        let msg = self.chat.post_text(&session.participant, content.to_string()).await?;
        self.registry
            .broadcast(session.room_id(), &ServerEvent::ChatBroadcast(msg), None)
            .await;
        Ok(())
    }

    async fn dice_roll(&self, session: &Session, formula: String) -> Result<()> {
        let formula = formula.trim();
        if formula.is_empty() {
            return Ok(());
        }

        let rolled = {
            let mut source = self.dice.lock().unwrap_or_else(|e| e.into_inner());
            tabletop_dice::roll(formula, &mut **source)
        };
        let results = match rolled {
            Ok(results) => results,
            Err(e) => {
                trace!("rejected formula {:?}: {}", formula, e);
                self.registry
                    .send_to(
                        session.conn_id,
                        ServerEvent::error(
                            ErrorCode::InvalidDice,
                            format!("Invalid dice formula: {formula}"),
                        ),
                    )
                    .await;
                return Ok(());
            }
        };

        let msg = self.chat.post_roll(&session.participant, &results).await?;
        self.registry
            .broadcast(session.room_id(), &ServerEvent::ChatBroadcast(msg), None)
            .await;
        Ok(())
    }

    async fn object_create(&self, session: &Session, payload: ObjectCreatePayload) -> Result<()> {
        let obj = self
            .canvas
            .create(session.room_id(), session.participant.id, payload)
            .await?;
        let hidden = obj.hidden_from_players;
        let event = ServerEvent::ObjectCreated(obj);

        self.registry.send_to(session.conn_id, event.clone()).await;
        if hidden {
            self.registry
                .send_to_gms(session.room_id(), &event, Some(session.conn_id))
                .await;
        } else {
            self.registry
                .broadcast(session.room_id(), &event, Some(session.conn_id))
                .await;
        }
        Ok(())
    }

    async fn object_update(&self, session: &Session, payload: ObjectUpdatePayload) -> Result<()> {
        // Players cannot see hidden objects, so they cannot edit them either.
        if !session.is_gm() {
            match self.canvas.get(payload.id, session.room_id()).await? {
                Some(obj) if !obj.hidden_from_players => {}
                _ => return Ok(()),
            }
        }

        let Some(obj) = self.canvas.update(session.room_id(), &payload).await? else {
            return Ok(());
        };
        let hidden = obj.hidden_from_players;
        let event = ServerEvent::ObjectUpdated(obj);
        if hidden {
            self.registry
                .send_to_gms(session.room_id(), &event, Some(session.conn_id))
                .await;
        } else {
            self.registry
                .broadcast(session.room_id(), &event, Some(session.conn_id))
                .await;
        }
        Ok(())
    }

    async fn object_delete(&self, session: &Session, id: Uuid) -> Result<()> {
        self.canvas.delete(id, session.room_id()).await?;
        self.registry
            .broadcast(
                session.room_id(),
                &ServerEvent::ObjectDeleted { id },
                Some(session.conn_id),
            )
            .await;
        Ok(())
    }

    async fn set_visibility(&self, session: &Session, id: Uuid, hidden: bool) -> Result<()> {
        if !session.is_gm() {
            return Ok(());
        }
        let Some(obj) = self
            .canvas
            .set_visibility(id, session.room_id(), hidden)
            .await?
        else {
            return Ok(());
        };

        let event = if hidden {
            ServerEvent::ObjectHidden { id: obj.id }
        } else {
            ServerEvent::ObjectRevealed(obj)
        };
        self.registry.broadcast(session.room_id(), &event, None).await;
        Ok(())
    }
}
