use std::sync::Arc;

use anyhow::{Result, bail};
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::info;
use uuid::Uuid;

use tabletop_db::Database;
use tabletop_db::models::{ParticipantRow, RoomRow};
use tabletop_types::api::{CreateRoomResponse, JoinRoomResponse, RoomSummary};
use tabletop_types::models::{Participant, Room};

use crate::clock::Clock;
use crate::convert::{format_time, parse_id, parse_time, participant_from_row, room_from_row};

pub const ROOM_CODE_LENGTH: usize = 6;
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

const SECRET_LENGTH: usize = 32;
const CODE_ATTEMPTS: usize = 16;
const GM_NAME: &str = "Game Master";

/// Room and participant lookups, plus room lifecycle.
#[derive(Clone)]
pub struct RoomDirectory {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl RoomDirectory {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Create a room and its canonical GM participant.
    pub async fn create_room(&self, name: &str) -> Result<CreateRoomResponse> {
        let now = format_time(self.clock.now());
        let name = name.to_string();

        self.db
            .call(move |db| {
                let code = unused_code(db)?;
                let room = RoomRow {
                    id: Uuid::new_v4().to_string(),
                    code,
                    name,
                    gm_secret: random_secret(),
                    created_at: now.clone(),
                };
                let gm = ParticipantRow {
                    id: Uuid::new_v4().to_string(),
                    room_id: room.id.clone(),
                    name: GM_NAME.to_string(),
                    is_gm: true,
                    session_token: random_secret(),
                    last_seen: now,
                };
                db.create_room(&room, &gm)?;
                info!("Room {} ({}) created", room.code, room.id);

                let gm_secret = room.gm_secret.clone();
                let session_token = gm.session_token.clone();
                Ok(CreateRoomResponse {
                    room: room_from_row(room)?,
                    gm_secret,
                    session_token,
                    participant: participant_from_row(gm)?,
                })
            })
            .await
    }

    /// Join by room code. The participant is a GM only when `gm_secret`
    /// matches the room's secret; nothing stops several GM sessions.
    pub async fn join_room(
        &self,
        code: &str,
        name: &str,
        gm_secret: Option<&str>,
    ) -> Result<Option<JoinRoomResponse>> {
        let code = code.to_uppercase();
        let name = name.to_string();
        let gm_secret = gm_secret.map(str::to_string);
        let now = format_time(self.clock.now());

        self.db
            .call(move |db| {
                let Some(room) = db.get_room_by_code(&code)? else {
                    return Ok(None);
                };
                let is_gm = gm_secret.as_deref() == Some(room.gm_secret.as_str());
                let participant = ParticipantRow {
                    id: Uuid::new_v4().to_string(),
                    room_id: room.id.clone(),
                    name,
                    is_gm,
                    session_token: random_secret(),
                    last_seen: now,
                };
                db.create_participant(&participant)?;

                let session_token = participant.session_token.clone();
                Ok(Some(JoinRoomResponse {
                    room: room_from_row(room)?,
                    session_token,
                    participant: participant_from_row(participant)?,
                }))
            })
            .await
    }

    pub async fn room_by_code(&self, code: &str) -> Result<Option<Room>> {
        let code = code.to_uppercase();
        self.db
            .call(move |db| db.get_room_by_code(&code)?.map(room_from_row).transpose())
            .await
    }

    pub async fn participant_by_token(&self, token: &str) -> Result<Option<Participant>> {
        let token = token.to_string();
        self.db
            .call(move |db| {
                db.get_participant_by_token(&token)?
                    .map(participant_from_row)
                    .transpose()
            })
            .await
    }

    pub async fn participants(&self, room_id: Uuid) -> Result<Vec<Participant>> {
        self.db
            .call(move |db| {
                db.list_participants(&room_id.to_string())?
                    .into_iter()
                    .map(participant_from_row)
                    .collect()
            })
            .await
    }

    /// Refresh a participant's last-activity timestamp.
    pub async fn touch(&self, participant_id: Uuid) -> Result<bool> {
        let now = format_time(self.clock.now());
        self.db
            .call(move |db| db.touch_participant(&participant_id.to_string(), &now))
            .await
    }

    pub async fn list_rooms(&self) -> Result<Vec<RoomSummary>> {
        self.db
            .call(|db| {
                db.list_room_summaries()?
                    .into_iter()
                    .map(|row| {
                        Ok(RoomSummary {
                            id: parse_id(&row.id)?,
                            code: row.code,
                            name: row.name,
                            created_at: parse_time(&row.created_at)?,
                            participant_count: row.participant_count,
                        })
                    })
                    .collect()
            })
            .await
    }

    pub async fn room_ids(&self) -> Result<Vec<Uuid>> {
        self.db
            .call(|db| db.all_room_ids()?.iter().map(|id| parse_id(id)).collect())
            .await
    }

    /// Delete a room and everything it owns. Returns the storage paths of its
    /// assets, or `None` if the room does not exist.
    pub async fn delete_room(&self, room_id: Uuid) -> Result<Option<Vec<String>>> {
        let paths = self
            .db
            .call(move |db| db.delete_room(&room_id.to_string()))
            .await?;
        if paths.is_some() {
            info!("Room {} deleted", room_id);
        }
        Ok(paths)
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

fn random_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LENGTH)
        .map(|_| char::from(ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())]))
        .collect()
}

fn unused_code(db: &Database) -> Result<String> {
    for _ in 0..CODE_ATTEMPTS {
        let code = random_code();
        if !db.room_code_exists(&code)? {
            return Ok(code);
        }
    }
    bail!("could not find a free room code after {} attempts", CODE_ATTEMPTS)
}

fn random_secret() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::clock::ManualClock;

    fn directory() -> (RoomDirectory, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()));
        let db = Arc::new(Database::open_in_memory().unwrap());
        (RoomDirectory::new(db, clock.clone()), clock)
    }

    #[tokio::test]
    async fn create_room_makes_gm() {
        let (rooms, _) = directory();
        let created = rooms.create_room("Tomb of Horrors").await.unwrap();

        assert_eq!(created.room.code.len(), ROOM_CODE_LENGTH);
        assert!(created.room.code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b)));
        assert!(created.participant.is_gm);
        assert_eq!(created.participant.name, "Game Master");
        assert_eq!(created.session_token.len(), 32);

        let found = rooms.participant_by_token(&created.session_token).await.unwrap().unwrap();
        assert_eq!(found.id, created.participant.id);
    }

    #[tokio::test]
    async fn join_is_case_insensitive_and_checks_secret() {
        let (rooms, _) = directory();
        let created = rooms.create_room("Keep").await.unwrap();
        let lower = created.room.code.to_lowercase();

        let player = rooms.join_room(&lower, "Aria", None).await.unwrap().unwrap();
        assert!(!player.participant.is_gm);

        let wrong = rooms.join_room(&lower, "Bram", Some("nope")).await.unwrap().unwrap();
        assert!(!wrong.participant.is_gm);

        let gm = rooms
            .join_room(&created.room.code, "Co-GM", Some(&created.gm_secret))
            .await
            .unwrap()
            .unwrap();
        assert!(gm.participant.is_gm);

        assert_eq!(rooms.participants(created.room.id).await.unwrap().len(), 4);
        assert!(rooms.join_room("ZZZZZZ", "Nobody", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn touch_refreshes_last_seen() {
        let (rooms, clock) = directory();
        let created = rooms.create_room("Keep").await.unwrap();

        clock.advance(Duration::hours(2));
        assert!(rooms.touch(created.participant.id).await.unwrap());

        let p = rooms.participant_by_token(&created.session_token).await.unwrap().unwrap();
        assert_eq!(p.last_seen, clock.now());
    }

    #[tokio::test]
    async fn list_and_delete() {
        let (rooms, _) = directory();
        let a = rooms.create_room("A").await.unwrap();
        rooms.join_room(&a.room.code, "P", None).await.unwrap();

        let listed = rooms.list_rooms().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].participant_count, 2);

        assert_eq!(rooms.delete_room(a.room.id).await.unwrap(), Some(vec![]));
        assert!(rooms.room_by_code(&a.room.code).await.unwrap().is_none());
        assert!(rooms.delete_room(a.room.id).await.unwrap().is_none());
    }
}
