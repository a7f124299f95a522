use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{Connection, Row, params, params_from_iter};

use crate::Database;
use crate::models::{
    AssetRow, ChatMessageRow, NewObjectRow, ObjectChanges, ObjectRow, ParticipantRow, RoomRow,
    RoomSummaryRow,
};

const OBJECT_COLUMNS: &str = "id, room_id, type, x, y, width, height, z_index, content, asset_id,
     hidden_from_players, style, created_by, created_at, updated_at";

const PARTICIPANT_COLUMNS: &str = "id, room_id, name, is_gm, session_token, last_seen";

impl Database {
    // -- Rooms --

    /// Insert a room together with its first participant in one transaction.
    pub fn create_room(&self, room: &RoomRow, owner: &ParticipantRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO rooms (id, code, name, gm_secret, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![room.id, room.code, room.name, room.gm_secret, room.created_at],
            )?;
            insert_participant(&tx, owner)?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn room_code_exists(&self, code: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM rooms WHERE code = ?1", [code], |row| row.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn get_room_by_code(&self, code: &str) -> Result<Option<RoomRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, code, name, gm_secret, created_at FROM rooms WHERE code = ?1",
                [code],
                room_from_row,
            )
            .optional()
        })
    }

    pub fn get_room_by_id(&self, id: &str) -> Result<Option<RoomRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, code, name, gm_secret, created_at FROM rooms WHERE id = ?1",
                [id],
                room_from_row,
            )
            .optional()
        })
    }

    pub fn list_room_summaries(&self) -> Result<Vec<RoomSummaryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.code, r.name, r.created_at, COUNT(p.id)
                 FROM rooms r
                 LEFT JOIN participants p ON p.room_id = r.id
                 GROUP BY r.id
                 ORDER BY r.created_at DESC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(RoomSummaryRow {
                        id: row.get(0)?,
                        code: row.get(1)?,
                        name: row.get(2)?,
                        created_at: row.get(3)?,
                        participant_count: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn all_room_ids(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM rooms")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Delete a room and everything it owns. Returns the storage paths of the
    /// room's assets so the caller can remove the files, or `None` if the
    /// room did not exist.
    pub fn delete_room(&self, id: &str) -> Result<Option<Vec<String>>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let paths = {
                let mut stmt = tx.prepare("SELECT storage_path FROM assets WHERE room_id = ?1")?;
                stmt.query_map([id], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            let deleted = tx.execute("DELETE FROM rooms WHERE id = ?1", [id])?;
            tx.commit()?;

            Ok((deleted > 0).then_some(paths))
        })
    }

    // -- Participants --

    pub fn create_participant(&self, participant: &ParticipantRow) -> Result<()> {
        self.with_conn(|conn| insert_participant(conn, participant))
    }

    pub fn get_participant_by_token(&self, token: &str) -> Result<Option<ParticipantRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE session_token = ?1"),
                [token],
                participant_from_row,
            )
            .optional()
        })
    }

    pub fn list_participants(&self, room_id: &str) -> Result<Vec<ParticipantRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE room_id = ?1 ORDER BY rowid"
            ))?;
            let rows = stmt
                .query_map([room_id], participant_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn touch_participant(&self, id: &str, last_seen: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE participants SET last_seen = ?2 WHERE id = ?1",
                params![id, last_seen],
            )?;
            Ok(updated > 0)
        })
    }

    // -- Whiteboard objects --

    pub fn list_objects(&self, room_id: &str, include_hidden: bool) -> Result<Vec<ObjectRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {OBJECT_COLUMNS} FROM whiteboard_objects
                 WHERE room_id = ?1 AND (?2 OR hidden_from_players = 0)
                 ORDER BY z_index, rowid"
            ))?;
            let rows = stmt
                .query_map(params![room_id, include_hidden], object_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Insert an object on top of the room's stack. The z-index is computed
    /// inside the INSERT, so concurrent creates cannot read the same maximum.
    pub fn insert_object(&self, obj: &NewObjectRow) -> Result<ObjectRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO whiteboard_objects
                    (id, room_id, type, x, y, width, height, z_index, content, asset_id,
                     hidden_from_players, style, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7,
                     (SELECT COALESCE(MAX(z_index), 0) + 1 FROM whiteboard_objects WHERE room_id = ?2),
                     ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
                params![
                    obj.id,
                    obj.room_id,
                    obj.kind,
                    obj.x,
                    obj.y,
                    obj.width,
                    obj.height,
                    obj.content,
                    obj.asset_id,
                    obj.hidden_from_players,
                    obj.style,
                    obj.created_by,
                    obj.created_at,
                ],
            )?;
            query_object(conn, &obj.id, &obj.room_id)?
                .ok_or_else(|| anyhow::anyhow!("object {} vanished after insert", obj.id))
        })
    }

    pub fn get_object(&self, id: &str, room_id: &str) -> Result<Option<ObjectRow>> {
        self.with_conn(|conn| query_object(conn, id, room_id))
    }

    /// Apply a sparse update. Returns the updated row, or `None` when no
    /// object with that id exists in the room.
    pub fn update_object(
        &self,
        id: &str,
        room_id: &str,
        changes: &ObjectChanges,
        updated_at: &str,
    ) -> Result<Option<ObjectRow>> {
        let mut sets = vec!["updated_at = ?"];
        let mut values = vec![Value::Text(updated_at.to_string())];

        let reals = [
            ("x = ?", changes.x),
            ("y = ?", changes.y),
            ("width = ?", changes.width),
            ("height = ?", changes.height),
        ];
        for (clause, value) in reals {
            if let Some(v) = value {
                sets.push(clause);
                values.push(Value::Real(v));
            }
        }
        if let Some(content) = &changes.content {
            sets.push("content = ?");
            values.push(Value::Text(content.clone()));
        }
        if let Some(style) = &changes.style {
            sets.push("style = ?");
            values.push(Value::Text(style.clone()));
        }
        if let Some(z) = changes.z_index {
            sets.push("z_index = ?");
            values.push(Value::Integer(z));
        }

        values.push(Value::Text(id.to_string()));
        values.push(Value::Text(room_id.to_string()));

        let sql = format!(
            "UPDATE whiteboard_objects SET {} WHERE id = ? AND room_id = ?",
            sets.join(", ")
        );

        self.with_conn(|conn| {
            let updated = conn.execute(&sql, params_from_iter(values.iter()))?;
            if updated == 0 {
                return Ok(None);
            }
            query_object(conn, id, room_id)
        })
    }

    pub fn set_object_hidden(
        &self,
        id: &str,
        room_id: &str,
        hidden: bool,
        updated_at: &str,
    ) -> Result<Option<ObjectRow>> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE whiteboard_objects SET hidden_from_players = ?3, updated_at = ?4
                 WHERE id = ?1 AND room_id = ?2",
                params![id, room_id, hidden, updated_at],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            query_object(conn, id, room_id)
        })
    }

    pub fn delete_object(&self, id: &str, room_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM whiteboard_objects WHERE id = ?1 AND room_id = ?2",
                params![id, room_id],
            )?;
            Ok(deleted > 0)
        })
    }

    // -- Chat --

    pub fn insert_chat_message(&self, msg: &ChatMessageRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chat_messages
                    (id, room_id, sender_id, sender_name, type, content, dice_formula, dice_results, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    msg.id,
                    msg.room_id,
                    msg.sender_id,
                    msg.sender_name,
                    msg.kind,
                    msg.content,
                    msg.dice_formula,
                    msg.dice_results,
                    msg.created_at,
                ],
            )?;
            Ok(())
        })
    }

    /// The `limit` most recent messages of a room, oldest first.
    pub fn recent_chat_messages(&self, room_id: &str, limit: u32) -> Result<Vec<ChatMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, room_id, sender_id, sender_name, type, content, dice_formula, dice_results, created_at
                 FROM chat_messages
                 WHERE room_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;
            let mut rows = stmt
                .query_map(params![room_id, limit], |row| {
                    Ok(ChatMessageRow {
                        id: row.get(0)?,
                        room_id: row.get(1)?,
                        sender_id: row.get(2)?,
                        sender_name: row.get(3)?,
                        kind: row.get(4)?,
                        content: row.get(5)?,
                        dice_formula: row.get(6)?,
                        dice_results: row.get(7)?,
                        created_at: row.get(8)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(rows)
        })
    }

    // -- Assets --

    pub fn insert_asset(&self, asset: &AssetRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO assets
                    (id, room_id, filename, storage_path, mime_type, size_bytes, uploaded_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    asset.id,
                    asset.room_id,
                    asset.filename,
                    asset.storage_path,
                    asset.mime_type,
                    asset.size_bytes,
                    asset.uploaded_by,
                    asset.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_asset(&self, id: &str) -> Result<Option<AssetRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, room_id, filename, storage_path, mime_type, size_bytes, uploaded_by, created_at
                 FROM assets WHERE id = ?1",
                [id],
                |row| {
                    Ok(AssetRow {
                        id: row.get(0)?,
                        room_id: row.get(1)?,
                        filename: row.get(2)?,
                        storage_path: row.get(3)?,
                        mime_type: row.get(4)?,
                        size_bytes: row.get(5)?,
                        uploaded_by: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                },
            )
            .optional()
        })
    }
}

fn insert_participant(conn: &Connection, p: &ParticipantRow) -> Result<()> {
    conn.execute(
        "INSERT INTO participants (id, room_id, name, is_gm, session_token, last_seen)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![p.id, p.room_id, p.name, p.is_gm, p.session_token, p.last_seen],
    )?;
    Ok(())
}

fn query_object(conn: &Connection, id: &str, room_id: &str) -> Result<Option<ObjectRow>> {
    conn.query_row(
        &format!("SELECT {OBJECT_COLUMNS} FROM whiteboard_objects WHERE id = ?1 AND room_id = ?2"),
        params![id, room_id],
        object_from_row,
    )
    .optional()
}

fn room_from_row(row: &Row<'_>) -> rusqlite::Result<RoomRow> {
    Ok(RoomRow {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        gm_secret: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn participant_from_row(row: &Row<'_>) -> rusqlite::Result<ParticipantRow> {
    Ok(ParticipantRow {
        id: row.get(0)?,
        room_id: row.get(1)?,
        name: row.get(2)?,
        is_gm: row.get(3)?,
        session_token: row.get(4)?,
        last_seen: row.get(5)?,
    })
}

fn object_from_row(row: &Row<'_>) -> rusqlite::Result<ObjectRow> {
    Ok(ObjectRow {
        id: row.get(0)?,
        room_id: row.get(1)?,
        kind: row.get(2)?,
        x: row.get(3)?,
        y: row.get(4)?,
        width: row.get(5)?,
        height: row.get(6)?,
        z_index: row.get(7)?,
        content: row.get(8)?,
        asset_id: row.get(9)?,
        hidden_from_players: row.get(10)?,
        style: row.get(11)?,
        created_by: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
