//! Persistence collaborator used by the delivery path.

use async_trait::async_trait;
use chatwire_database::{
    ChatRepository, ConversationId, DatabaseResult, Message, MessageId, MessageRepository,
    NewMessage, Pool, UserId,
};

/// What the delivery path needs from storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Save a new message, returning it with its generated id and timestamps.
    async fn persist_message(&self, message: &NewMessage) -> DatabaseResult<Message>;

    /// Add `user_id` to the read set of a message. Idempotent; returns whether
    /// the reader was newly added.
    async fn mark_read(&self, message_id: MessageId, user_id: UserId) -> DatabaseResult<bool>;

    async fn find_message(&self, message_id: MessageId) -> DatabaseResult<Option<Message>>;

    async fn messages_for_conversation(
        &self,
        conversation_id: ConversationId,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<Vec<Message>>;

    async fn is_participant(&self, conversation_id: ConversationId, user_id: UserId) -> DatabaseResult<bool>;
}

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteMessageStore {
    messages: MessageRepository,
    chats: ChatRepository,
}

impl SqliteMessageStore {
    pub fn new(pool: Pool) -> Self {
        Self {
            messages: MessageRepository::new(pool.clone()),
            chats: ChatRepository::new(pool),
        }
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn persist_message(&self, message: &NewMessage) -> DatabaseResult<Message> {
        self.messages.create(message).await
    }

    async fn mark_read(&self, message_id: MessageId, user_id: UserId) -> DatabaseResult<bool> {
        self.messages.mark_read(message_id, user_id).await
    }

    async fn find_message(&self, message_id: MessageId) -> DatabaseResult<Option<Message>> {
        self.messages.find_by_id(message_id).await
    }

    async fn messages_for_conversation(
        &self,
        conversation_id: ConversationId,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<Vec<Message>> {
        self.messages
            .find_by_conversation(conversation_id, limit, offset)
            .await
    }

    async fn is_participant(&self, conversation_id: ConversationId, user_id: UserId) -> DatabaseResult<bool> {
        self.chats.is_participant(conversation_id, user_id).await
    }
}
