use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use tabletop_db::Database;
use tabletop_db::models::ChatMessageRow;
use tabletop_types::MAX_CHAT_HISTORY;
use tabletop_types::models::{ChatMessage, ChatMessageType, DiceResults, Participant};

use crate::clock::Clock;
use crate::convert::{chat_from_row, format_time};

/// Append-only chat and dice-roll log, read back through a bounded window.
#[derive(Clone)]
pub struct ChatLog {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    history_limit: u32,
}

impl ChatLog {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            clock,
            history_limit: MAX_CHAT_HISTORY,
        }
    }

    pub fn with_history_limit(mut self, limit: u32) -> Self {
        self.history_limit = limit;
        self
    }

    pub async fn post_text(&self, sender: &Participant, content: String) -> Result<ChatMessage> {
        let row = self.row(sender, ChatMessageType::Text, content, None, None);
        self.insert(row).await
    }

    /// Record a roll. The sender's name is copied into the message as it is now.
    pub async fn post_roll(&self, sender: &Participant, results: &DiceResults) -> Result<ChatMessage> {
        let row = self.row(
            sender,
            ChatMessageType::DiceRoll,
            format!("rolled {}", results.formula),
            Some(results.formula.clone()),
            Some(serde_json::to_string(results)?),
        );
        self.insert(row).await
    }

    /// The most recent messages in the room, oldest first.
    pub async fn recent(&self, room_id: Uuid) -> Result<Vec<ChatMessage>> {
        let limit = self.history_limit;
        self.db
            .call(move |db| {
                db.recent_chat_messages(&room_id.to_string(), limit)?
                    .into_iter()
                    .map(chat_from_row)
                    .collect()
            })
            .await
    }

    fn row(
        &self,
        sender: &Participant,
        kind: ChatMessageType,
        content: String,
        dice_formula: Option<String>,
        dice_results: Option<String>,
    ) -> ChatMessageRow {
        ChatMessageRow {
            id: Uuid::new_v4().to_string(),
            room_id: sender.room_id.to_string(),
            sender_id: sender.id.to_string(),
            sender_name: sender.name.clone(),
            kind: kind.as_str().to_string(),
            content,
            dice_formula,
            dice_results,
            created_at: format_time(self.clock.now()),
        }
    }

    async fn insert(&self, row: ChatMessageRow) -> Result<ChatMessage> {
        self.db
            .call(move |db| {
                db.insert_chat_message(&row)?;
                chat_from_row(row)
            })
            .await
    }
}
