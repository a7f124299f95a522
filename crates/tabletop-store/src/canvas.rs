use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use tabletop_db::Database;
use tabletop_db::models::{NewObjectRow, ObjectChanges};
use tabletop_types::models::{ObjectCreatePayload, ObjectUpdatePayload, WhiteboardObject};

use crate::clock::Clock;
use crate::convert::{format_time, object_from_row};

/// Authoritative whiteboard state for every room.
///
/// The store performs no role checks. Callers decide who may hide, reveal or
/// see hidden objects; `list` only filters on the flag it is given.
#[derive(Clone)]
pub struct CanvasStore {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl CanvasStore {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub async fn list(&self, room_id: Uuid, include_hidden: bool) -> Result<Vec<WhiteboardObject>> {
        self.db
            .call(move |db| {
                db.list_objects(&room_id.to_string(), include_hidden)?
                    .into_iter()
                    .map(object_from_row)
                    .collect()
            })
            .await
    }

    pub async fn get(&self, id: Uuid, room_id: Uuid) -> Result<Option<WhiteboardObject>> {
        self.db
            .call(move |db| {
                db.get_object(&id.to_string(), &room_id.to_string())?
                    .map(object_from_row)
                    .transpose()
            })
            .await
    }

    /// Insert a new object on top of everything else in the room.
    pub async fn create(
        &self,
        room_id: Uuid,
        creator_id: Uuid,
        payload: ObjectCreatePayload,
    ) -> Result<WhiteboardObject> {
        let style = payload.style.as_ref().map(serde_json::to_string).transpose()?;
        let row = NewObjectRow {
            id: Uuid::new_v4().to_string(),
            room_id: room_id.to_string(),
            kind: payload.kind.as_str().to_string(),
            x: payload.x,
            y: payload.y,
            width: payload.width,
            height: payload.height,
            content: payload.content,
            asset_id: payload.asset_id.map(|id| id.to_string()),
            hidden_from_players: payload.hidden_from_players.unwrap_or(false),
            style,
            created_by: creator_id.to_string(),
            created_at: format_time(self.clock.now()),
        };

        self.db
            .call(move |db| object_from_row(db.insert_object(&row)?))
            .await
    }

    /// Sparse merge of the fields present in `payload`. `None` when the object
    /// is not in this room.
    pub async fn update(
        &self,
        room_id: Uuid,
        payload: &ObjectUpdatePayload,
    ) -> Result<Option<WhiteboardObject>> {
        let changes = ObjectChanges {
            x: payload.x,
            y: payload.y,
            width: payload.width,
            height: payload.height,
            content: payload.content.clone(),
            style: payload.style.as_ref().map(serde_json::to_string).transpose()?,
            z_index: payload.z_index,
        };
        let id = payload.id.to_string();
        let now = format_time(self.clock.now());

        self.db
            .call(move |db| {
                db.update_object(&id, &room_id.to_string(), &changes, &now)?
                    .map(object_from_row)
                    .transpose()
            })
            .await
    }

    /// Returns whether a row was removed.
    pub async fn delete(&self, id: Uuid, room_id: Uuid) -> Result<bool> {
        self.db
            .call(move |db| db.delete_object(&id.to_string(), &room_id.to_string()))
            .await
    }

    pub async fn set_visibility(
        &self,
        id: Uuid,
        room_id: Uuid,
        hidden: bool,
    ) -> Result<Option<WhiteboardObject>> {
        let now = format_time(self.clock.now());
        self.db
            .call(move |db| {
                db.set_object_hidden(&id.to_string(), &room_id.to_string(), hidden, &now)?
                    .map(object_from_row)
                    .transpose()
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use tabletop_types::models::{DEFAULT_OBJECT_SIZE, Style, WhiteboardObjectType};

    use super::*;
    use crate::clock::ManualClock;
    use crate::rooms::RoomDirectory;

    struct Fixture {
        canvas: CanvasStore,
        clock: Arc<ManualClock>,
        room: Uuid,
        gm: Uuid,
    }

    async fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()));
        let db = Arc::new(Database::open_in_memory().unwrap());
        let created = RoomDirectory::new(db.clone(), clock.clone())
            .create_room("Canvas")
            .await
            .unwrap();
        Fixture {
            canvas: CanvasStore::new(db, clock.clone()),
            clock,
            room: created.room.id,
            gm: created.participant.id,
        }
    }

    #[tokio::test]
    async fn create_applies_defaults_and_stacks() {
        let f = fixture().await;

        let kinds = [
            WhiteboardObjectType::StickyNote,
            WhiteboardObjectType::Image,
            WhiteboardObjectType::Pdf,
        ];
        let mut z = Vec::new();
        for kind in kinds {
            let obj = f.canvas.create(f.room, f.gm, ObjectCreatePayload::new(kind)).await.unwrap();
            assert_eq!(obj.width, DEFAULT_OBJECT_SIZE);
            assert_eq!(obj.height, DEFAULT_OBJECT_SIZE);
            assert!(!obj.hidden_from_players);
            assert_eq!(obj.created_by, f.gm);
            z.push(obj.z_index);
        }
        assert_eq!(z, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn update_is_sparse_and_refreshes_timestamp() {
        let f = fixture().await;
        let mut payload = ObjectCreatePayload::new(WhiteboardObjectType::StickyNote);
        payload.x = 10.0;
        payload.content = Some("orc ambush".into());
        payload.style = Some(Style::from([("color".to_string(), "#ffeb3b".to_string())]));
        let obj = f.canvas.create(f.room, f.gm, payload).await.unwrap();

        f.clock.advance(Duration::seconds(5));
        let mut update = ObjectUpdatePayload::for_object(obj.id);
        update.y = Some(42.0);
        let updated = f.canvas.update(f.room, &update).await.unwrap().unwrap();

        assert_eq!(updated.x, 10.0);
        assert_eq!(updated.y, 42.0);
        assert_eq!(updated.content.as_deref(), Some("orc ambush"));
        assert_eq!(updated.style, obj.style);
        assert_eq!(updated.created_at, obj.created_at);
        assert_eq!(updated.updated_at, f.clock.now());
    }

    #[tokio::test]
    async fn update_missing_or_foreign_object_is_none() {
        let f = fixture().await;
        let obj = f
            .canvas
            .create(f.room, f.gm, ObjectCreatePayload::new(WhiteboardObjectType::Image))
            .await
            .unwrap();

        let missing = ObjectUpdatePayload::for_object(Uuid::new_v4());
        assert!(f.canvas.update(f.room, &missing).await.unwrap().is_none());

        let foreign = ObjectUpdatePayload::for_object(obj.id);
        assert!(f.canvas.update(Uuid::new_v4(), &foreign).await.unwrap().is_none());
        assert!(f.canvas.set_visibility(obj.id, Uuid::new_v4(), true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn visibility_controls_listing() {
        let f = fixture().await;
        let mut hidden = ObjectCreatePayload::new(WhiteboardObjectType::StickyNote);
        hidden.hidden_from_players = Some(true);
        let secret = f.canvas.create(f.room, f.gm, hidden).await.unwrap();
        let open = f
            .canvas
            .create(f.room, f.gm, ObjectCreatePayload::new(WhiteboardObjectType::StickyNote))
            .await
            .unwrap();

        let players = f.canvas.list(f.room, false).await.unwrap();
        assert_eq!(players.iter().map(|o| o.id).collect::<Vec<_>>(), vec![open.id]);
        assert_eq!(f.canvas.list(f.room, true).await.unwrap().len(), 2);

        let revealed = f.canvas.set_visibility(secret.id, f.room, false).await.unwrap().unwrap();
        assert!(!revealed.hidden_from_players);
        assert_eq!(f.canvas.list(f.room, false).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delete_reports_whether_anything_went() {
        let f = fixture().await;
        let obj = f
            .canvas
            .create(f.room, f.gm, ObjectCreatePayload::new(WhiteboardObjectType::Pdf))
            .await
            .unwrap();

        assert!(!f.canvas.delete(obj.id, Uuid::new_v4()).await.unwrap());
        assert!(f.canvas.delete(obj.id, f.room).await.unwrap());
        assert!(!f.canvas.delete(obj.id, f.room).await.unwrap());
        assert!(f.canvas.list(f.room, true).await.unwrap().is_empty());
    }
}
