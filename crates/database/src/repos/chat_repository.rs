//! Repository for conversation data access operations.

use std::collections::BTreeSet;

use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::entities::{timestamp_now, Conversation, ConversationId, UserId};
use crate::types::{DatabaseError, DatabaseResult};

/// Repository for conversations and their membership
#[derive(Clone)]
pub struct ChatRepository {
    pool: SqlitePool,
}

impl ChatRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a conversation with the given participants. Duplicates are collapsed.
    pub async fn create(&self, participants: &[UserId]) -> DatabaseResult<Conversation> {
        let participants: BTreeSet<UserId> = participants.iter().copied().collect();
        if participants.is_empty() {
            return Err(DatabaseError::Validation(
                "a conversation needs at least one participant".to_string(),
            ));
        }
        if let Some(invalid) = participants.iter().find(|id| **id <= 0) {
            return Err(DatabaseError::Validation(format!(
                "participant id {invalid} is not a valid user id"
            )));
        }

        let now = timestamp_now();
        let mut tx = self.pool.begin().await?;

        let chat_id = sqlx::query("INSERT INTO chats (created_at, updated_at) VALUES (?, ?)")
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        for user_id in &participants {
            sqlx::query("INSERT INTO chat_users (chat_id, user_id, joined_at) VALUES (?, ?, ?)")
                .bind(chat_id)
                .bind(user_id)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(chat_id, participants = participants.len(), "conversation created");

        Ok(Conversation {
            id: chat_id,
            participants: participants.into_iter().collect(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub async fn find_by_id(&self, chat_id: ConversationId) -> DatabaseResult<Option<Conversation>> {
        let row = sqlx::query("SELECT id, created_at, updated_at FROM chats WHERE id = ?")
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Conversation {
            id: row.try_get("id")?,
            participants: self.participants(chat_id).await?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    /// Participants of a conversation in ascending id order
    pub async fn participants(&self, chat_id: ConversationId) -> DatabaseResult<Vec<UserId>> {
        let rows = sqlx::query("SELECT user_id FROM chat_users WHERE chat_id = ? ORDER BY user_id")
            .bind(chat_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<UserId, _>("user_id").map_err(DatabaseError::from))
            .collect()
    }

    pub async fn is_participant(&self, chat_id: ConversationId, user_id: UserId) -> DatabaseResult<bool> {
        let row = sqlx::query("SELECT 1 FROM chat_users WHERE chat_id = ? AND user_id = ?")
            .bind(chat_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Add a participant. Returns `false` if they were already a member.
    pub async fn add_participant(&self, chat_id: ConversationId, user_id: UserId) -> DatabaseResult<bool> {
        if self.find_by_id(chat_id).await?.is_none() {
            return Err(DatabaseError::not_found("conversation", chat_id));
        }

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO chat_users (chat_id, user_id, joined_at) VALUES (?, ?, ?)",
        )
        .bind(chat_id)
        .bind(user_id)
        .bind(timestamp_now())
        .execute(&self.pool)
        .await?
        .rows_affected()
            == 1;

        Ok(inserted)
    }

    /// Conversations a user takes part in, most recently active first
    pub async fn find_by_user(&self, user_id: UserId) -> DatabaseResult<Vec<ConversationId>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id
            FROM chats c
            JOIN chat_users cu ON cu.chat_id = c.id
            WHERE cu.user_id = ?
            ORDER BY c.updated_at DESC, c.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<ConversationId, _>("id").map_err(DatabaseError::from))
            .collect()
    }
}
