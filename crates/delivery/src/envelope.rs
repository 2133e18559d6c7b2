//! Wire shapes pushed to connected clients.

use chatwire_database::{ConversationId, Message, MessageId, MessageKind, UserId};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A chat message as seen by one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MessageEnvelope {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    #[schema(value_type = String, example = "text")]
    pub kind: MessageKind,
    pub content: Option<String>,
    pub attachment_url: Option<String>,
    pub read_by: Vec<UserId>,
    pub created_at: String,
    pub updated_at: String,
    pub is_mine: bool,
}

impl MessageEnvelope {
    pub fn new(message: &Message, is_mine: bool) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            kind: message.kind,
            content: message.content.clone(),
            attachment_url: message.attachment_url.clone(),
            read_by: message.read_by.iter().copied().collect(),
            created_at: message.created_at.clone(),
            updated_at: message.updated_at.clone(),
            is_mine,
        }
    }

    /// Envelope with `is_mine` computed for `recipient`.
    pub fn for_recipient(message: &Message, recipient: UserId) -> Self {
        Self::new(message, message.sender_id == recipient)
    }
}

/// Read receipt, both the event and its wire form.
///
/// Serializes as `{"type":"message_read","message_id":..,"user_id":..,"conversation_id":..}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "message_read")]
pub struct ReadReceipt {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub conversation_id: ConversationId,
}
