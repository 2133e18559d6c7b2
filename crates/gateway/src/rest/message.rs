//! Message REST endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chatwire_auth::Identity;
use chatwire_database::{ConversationId, MessageId, MessageKind, NewMessage};
use chatwire_delivery::{MessageEnvelope, ReadReceipt};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::{GatewayError, GatewayResult};
use crate::state::GatewayState;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateMessageRequest {
    pub conversation_id: ConversationId,
    /// One of `text`, `image`, `video`, `audio`, `file`. Defaults to `text`.
    pub kind: Option<String>,
    pub content: Option<String>,
    pub attachment_url: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListMessagesQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListMessagesQuery {
    fn page(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MarkReadQuery {
    pub message_id: Option<MessageId>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MarkReadResponse {
    pub message_id: MessageId,
    pub user_id: i64,
    pub conversation_id: ConversationId,
    /// False when the caller had already read the message.
    pub newly_read: bool,
}

/// Create message routes
pub fn create_message_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/api/messages", post(create_message))
        .route("/api/messages/read", post(mark_read))
        .route("/api/messages/chat/:chat_id", get(list_messages))
        .route("/api/messages/:message_id", get(get_message))
}

#[utoipa::path(
    post,
    path = "/api/messages",
    tag = "messages",
    request_body = CreateMessageRequest,
    responses(
        (status = 201, description = "Message stored and delivered", body = MessageEnvelope),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Not a participant", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn create_message(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateMessageRequest>,
) -> GatewayResult<impl IntoResponse> {
    let kind = match payload.kind.as_deref().map(str::trim) {
        None | Some("") => MessageKind::Text,
        Some(kind) => kind
            .parse::<MessageKind>()
            .map_err(|_| GatewayError::InvalidRequest(format!("unknown message kind '{kind}'")))?,
    };

    state
        .ensure_participant(payload.conversation_id, &identity)
        .await?;

    let new_message = NewMessage {
        conversation_id: payload.conversation_id,
        sender_id: identity.user_id,
        kind,
        content: payload.content,
        attachment_url: payload.attachment_url,
    };
    new_message.validate()?;

    let message = state.delivery.send_message(new_message).await?;

    Ok((StatusCode::CREATED, Json(MessageEnvelope::new(&message, true))))
}

#[utoipa::path(
    get,
    path = "/api/messages/chat/{chat_id}",
    tag = "messages",
    params(
        ("chat_id" = i64, Path, description = "Conversation id"),
        ListMessagesQuery
    ),
    responses(
        (status = 200, description = "Messages oldest first", body = Vec<MessageEnvelope>),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Not a participant", body = ErrorResponse)
    )
)]
pub async fn list_messages(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(chat_id): Path<ConversationId>,
    Query(query): Query<ListMessagesQuery>,
) -> GatewayResult<Json<Vec<MessageEnvelope>>> {
    state.ensure_participant(chat_id, &identity).await?;

    let (limit, offset) = query.page();
    let messages = state
        .store()
        .messages_for_conversation(chat_id, limit, offset)
        .await?;

    Ok(Json(
        messages
            .iter()
            .map(|message| MessageEnvelope::for_recipient(message, identity.user_id))
            .collect(),
    ))
}

#[utoipa::path(
    get,
    path = "/api/messages/{message_id}",
    tag = "messages",
    params(
        ("message_id" = i64, Path, description = "Message id")
    ),
    responses(
        (status = 200, description = "Message details", body = MessageEnvelope),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Not a participant", body = ErrorResponse),
        (status = 404, description = "Message not found", body = ErrorResponse)
    )
)]
pub async fn get_message(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(message_id): Path<MessageId>,
) -> GatewayResult<Json<MessageEnvelope>> {
    let message = state
        .store()
        .find_message(message_id)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("message {message_id} not found")))?;

    state
        .ensure_participant(message.conversation_id, &identity)
        .await?;

    Ok(Json(MessageEnvelope::for_recipient(&message, identity.user_id)))
}

/// Mark a message as read and notify everyone connected to its conversation.
#[utoipa::path(
    post,
    path = "/api/messages/read",
    tag = "messages",
    params(MarkReadQuery),
    responses(
        (status = 200, description = "Read receipt recorded", body = MarkReadResponse),
        (status = 400, description = "Missing message_id", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Not a participant", body = ErrorResponse),
        (status = 404, description = "Message not found", body = ErrorResponse)
    )
)]
pub async fn mark_read(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<MarkReadQuery>,
) -> GatewayResult<Json<MarkReadResponse>> {
    let message_id = query
        .message_id
        .filter(|id| *id > 0)
        .ok_or_else(|| GatewayError::InvalidRequest("message_id must be a positive integer".to_string()))?;

    let message = state
        .store()
        .find_message(message_id)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("message {message_id} not found")))?;

    state
        .ensure_participant(message.conversation_id, &identity)
        .await?;

    let receipt = ReadReceipt {
        message_id,
        user_id: identity.user_id,
        conversation_id: message.conversation_id,
    };
    let newly_read = state.delivery.acknowledge_read(receipt, None).await?;

    Ok(Json(MarkReadResponse {
        message_id,
        user_id: identity.user_id,
        conversation_id: message.conversation_id,
        newly_read,
    }))
}
