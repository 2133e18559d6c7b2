//! Persist-then-deliver glue between storage and the coordinator.

use std::sync::Arc;

use chatwire_database::{DatabaseError, Message, NewMessage};
use tracing::{info, warn};

use crate::connection::ConnectionId;
use crate::coordinator::{CoordinatorHandle, DeliveryEvent};
use crate::envelope::ReadReceipt;
use crate::error::{DeliveryError, DeliveryResult};
use crate::store::MessageStore;

#[derive(Clone)]
pub struct DeliveryService {
    store: Arc<dyn MessageStore>,
    coordinator: CoordinatorHandle,
}

impl DeliveryService {
    pub fn new(store: Arc<dyn MessageStore>, coordinator: CoordinatorHandle) -> Self {
        Self { store, coordinator }
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.coordinator
    }

    /// Persist a new message, then fan it out to its conversation.
    ///
    /// Nothing is delivered if persistence fails.
    pub async fn send_message(&self, new_message: NewMessage) -> DeliveryResult<Message> {
        let message = self.store.persist_message(&new_message).await.map_err(|err| {
            warn!(
                conversation_id = new_message.conversation_id,
                sender_id = new_message.sender_id,
                error = %err,
                "message persistence failed"
            );
            DeliveryError::Persistence(err)
        })?;

        self.coordinator
            .submit_for_delivery(DeliveryEvent::ChatMessage(message.clone()))
            .await?;

        info!(
            message_id = message.id,
            conversation_id = message.conversation_id,
            "message submitted for delivery"
        );
        Ok(message)
    }

    /// Record a read receipt, then fan it out to the receipt's conversation.
    ///
    /// The message must belong to `receipt.conversation_id`. `origin` is the
    /// acknowledging connection, which is left out of the fan-out.
    pub async fn acknowledge_read(
        &self,
        receipt: ReadReceipt,
        origin: Option<ConnectionId>,
    ) -> DeliveryResult<bool> {
        let message = self
            .store
            .find_message(receipt.message_id)
            .await?
            .ok_or_else(|| DatabaseError::not_found("message", receipt.message_id))?;

        if message.conversation_id != receipt.conversation_id {
            return Err(DeliveryError::ConversationMismatch {
                message_id: receipt.message_id,
                conversation_id: receipt.conversation_id,
            });
        }

        let newly_read = self
            .store
            .mark_read(receipt.message_id, receipt.user_id)
            .await?;

        self.coordinator
            .submit_for_delivery(DeliveryEvent::ReadReceipt { receipt, origin })
            .await?;

        info!(
            message_id = receipt.message_id,
            user_id = receipt.user_id,
            conversation_id = receipt.conversation_id,
            newly_read,
            "read receipt submitted for delivery"
        );
        Ok(newly_read)
    }
}
