//! Conversation entity

use serde::{Deserialize, Serialize};

use super::{ConversationId, UserId};

/// A conversation and the users allowed to take part in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub participants: Vec<UserId>,
    pub created_at: String,
    pub updated_at: String,
}

impl Conversation {
    pub fn has_participant(&self, user_id: UserId) -> bool {
        self.participants.contains(&user_id)
    }
}
