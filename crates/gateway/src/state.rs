//! Shared application state for the gateway

use std::sync::Arc;

use axum::http::HeaderMap;
use chatwire_auth::{bearer_token, Identity, IdentityVerifier};
use chatwire_config::RealtimeConfig;
use chatwire_database::{ChatRepository, Pool};
use chatwire_delivery::{CoordinatorHandle, DeliveryService, MessageStore};

use crate::error::{GatewayError, GatewayResult};

#[derive(Clone)]
pub struct GatewayState {
    /// Database connection pool
    pub pool: Pool,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub delivery: DeliveryService,
    /// Queue sizes and heartbeat timings for socket sessions
    pub realtime: RealtimeConfig,
}

impl GatewayState {
    pub fn new(
        pool: Pool,
        verifier: Arc<dyn IdentityVerifier>,
        delivery: DeliveryService,
        realtime: RealtimeConfig,
    ) -> Self {
        Self {
            pool,
            verifier,
            delivery,
            realtime,
        }
    }

    pub fn coordinator(&self) -> &CoordinatorHandle {
        self.delivery.coordinator()
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        self.delivery.store()
    }

    pub fn chats(&self) -> ChatRepository {
        ChatRepository::new(self.pool.clone())
    }

    /// Resolve the caller from the `Authorization` header, falling back to an
    /// explicit token (the `?token=` query parameter of socket handshakes).
    pub fn authenticate(&self, headers: &HeaderMap, fallback: Option<&str>) -> GatewayResult<Identity> {
        let header_token = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token);

        let token = header_token
            .or(fallback)
            .ok_or_else(|| GatewayError::AuthenticationFailed("Missing authentication token".to_string()))?;

        Ok(self.verifier.verify(token)?)
    }

    /// Fail with 403 unless `identity` takes part in the conversation.
    pub async fn ensure_participant(&self, conversation_id: i64, identity: &Identity) -> GatewayResult<()> {
        if self.store().is_participant(conversation_id, identity.user_id).await? {
            Ok(())
        } else {
            Err(GatewayError::AuthorizationFailed(format!(
                "user {} is not a participant of conversation {}",
                identity.user_id, conversation_id
            )))
        }
    }
}
