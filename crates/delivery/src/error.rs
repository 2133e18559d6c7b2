use chatwire_auth::AuthError;
use chatwire_database::{ConversationId, DatabaseError, MessageId};
use thiserror::Error;

use crate::connection::ConnectionId;

/// Failures of the delivery core. Nothing here is retried automatically.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("authentication rejected: {0}")]
    AuthRejected(#[from] AuthError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("persistence failed: {0}")]
    Persistence(#[from] DatabaseError),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("connection {0} could not keep up with its outbound queue")]
    SlowConsumer(ConnectionId),

    #[error("message {message_id} does not belong to conversation {conversation_id}")]
    ConversationMismatch {
        message_id: MessageId,
        conversation_id: ConversationId,
    },

    #[error("coordinator is not running")]
    CoordinatorUnavailable,
}

impl DeliveryError {
    /// Whether the underlying store reported a missing row.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DeliveryError::Persistence(err) if err.is_not_found())
    }
}

pub type DeliveryResult<T> = Result<T, DeliveryError>;
