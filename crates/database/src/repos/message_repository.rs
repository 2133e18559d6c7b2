//! Repository for message data access operations.

use std::collections::{BTreeMap, BTreeSet};

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, info};

use crate::entities::{
    timestamp_now, ConversationId, Message, MessageId, MessageKind, NewMessage, UserId,
};
use crate::types::{DatabaseError, DatabaseResult};

const MESSAGE_COLUMNS: &str =
    "id, chat_id, sender_id, kind, content, attachment_url, created_at, updated_at";

/// Repository for message and read receipt persistence
#[derive(Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a new message. Fails with `NotFound` if the conversation does not exist.
    pub async fn create(&self, new_message: &NewMessage) -> DatabaseResult<Message> {
        new_message.validate()?;

        let mut tx = self.pool.begin().await?;

        let chat_exists = sqlx::query("SELECT 1 FROM chats WHERE id = ?")
            .bind(new_message.conversation_id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !chat_exists {
            return Err(DatabaseError::not_found("conversation", new_message.conversation_id));
        }

        let now = timestamp_now();
        let result = sqlx::query(
            r#"
            INSERT INTO messages (chat_id, sender_id, kind, content, attachment_url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new_message.conversation_id)
        .bind(new_message.sender_id)
        .bind(new_message.kind.as_str())
        .bind(&new_message.content)
        .bind(&new_message.attachment_url)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE chats SET updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(new_message.conversation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let message = Message {
            id: result.last_insert_rowid(),
            conversation_id: new_message.conversation_id,
            sender_id: new_message.sender_id,
            kind: new_message.kind,
            content: new_message.content.clone(),
            attachment_url: new_message.attachment_url.clone(),
            read_by: BTreeSet::new(),
            created_at: now.clone(),
            updated_at: now,
        };

        info!(
            message_id = message.id,
            conversation_id = message.conversation_id,
            sender_id = message.sender_id,
            kind = %message.kind,
            "message persisted"
        );
        Ok(message)
    }

    /// Find a message by id, including its read set
    pub async fn find_by_id(&self, message_id: MessageId) -> DatabaseResult<Option<Message>> {
        let row = sqlx::query(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"))
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut message = message_from_row(&row)?;
        message.read_by = self.read_by(message_id).await?;
        Ok(Some(message))
    }

    /// List messages of a conversation oldest first
    pub async fn find_by_conversation(
        &self,
        conversation_id: ConversationId,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_id = ? ORDER BY created_at ASC, id ASC LIMIT ? OFFSET ?"
        ))
        .bind(conversation_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = rows
            .iter()
            .map(message_from_row)
            .collect::<DatabaseResult<Vec<_>>>()?;

        let read_rows = sqlx::query(
            r#"
            SELECT mr.message_id, mr.user_id
            FROM message_reads mr
            JOIN messages m ON m.id = mr.message_id
            WHERE m.chat_id = ?
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        let mut readers: BTreeMap<MessageId, BTreeSet<UserId>> = BTreeMap::new();
        for row in read_rows {
            let message_id: MessageId = row.try_get("message_id")?;
            let user_id: UserId = row.try_get("user_id")?;
            readers.entry(message_id).or_default().insert(user_id);
        }

        for message in &mut messages {
            if let Some(read_by) = readers.remove(&message.id) {
                message.read_by = read_by;
            }
        }

        Ok(messages)
    }

    /// Add `user_id` to the read set of a message.
    ///
    /// Returns `true` when the reader was newly added. Marking twice is a no-op
    /// and leaves `updated_at` untouched.
    pub async fn mark_read(&self, message_id: MessageId, user_id: UserId) -> DatabaseResult<bool> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT 1 FROM messages WHERE id = ?")
            .bind(message_id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !exists {
            return Err(DatabaseError::not_found("message", message_id));
        }

        let now = timestamp_now();
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at) VALUES (?, ?, ?)",
        )
        .bind(message_id)
        .bind(user_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if inserted {
            sqlx::query("UPDATE messages SET updated_at = ? WHERE id = ?")
                .bind(&now)
                .bind(message_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        debug!(message_id, user_id, inserted, "read receipt recorded");
        Ok(inserted)
    }

    /// Users that have read a message
    pub async fn read_by(&self, message_id: MessageId) -> DatabaseResult<BTreeSet<UserId>> {
        let rows = sqlx::query("SELECT user_id FROM message_reads WHERE message_id = ?")
            .bind(message_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<UserId, _>("user_id").map_err(DatabaseError::from))
            .collect()
    }
}

fn message_from_row(row: &SqliteRow) -> DatabaseResult<Message> {
    let kind: String = row.try_get("kind")?;

    Ok(Message {
        id: row.try_get("id")?,
        conversation_id: row.try_get("chat_id")?,
        sender_id: row.try_get("sender_id")?,
        kind: kind.parse::<MessageKind>()?,
        content: row.try_get("content")?,
        attachment_url: row.try_get("attachment_url")?,
        read_by: BTreeSet::new(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
