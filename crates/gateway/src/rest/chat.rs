//! Conversation REST endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use chatwire_auth::Identity;
use chatwire_database::{Conversation, ConversationId, UserId};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{GatewayError, GatewayResult};
use crate::state::GatewayState;

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatResponse {
    pub id: ConversationId,
    /// Participant user ids in ascending order
    pub participants: Vec<UserId>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Conversation> for ChatResponse {
    fn from(chat: Conversation) -> Self {
        Self {
            id: chat.id,
            participants: chat.participants,
            created_at: chat.created_at,
            updated_at: chat.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateChatRequest {
    /// Other participants. The caller is always added.
    #[serde(default)]
    pub participants: Vec<UserId>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddParticipantRequest {
    pub user_id: UserId,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AddParticipantResponse {
    pub chat_id: ConversationId,
    pub user_id: UserId,
    /// False when the user was already a participant.
    pub added: bool,
}

/// Create chat routes
pub fn create_chat_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/api/chats", get(list_chats).post(create_chat))
        .route("/api/chats/:chat_id", get(get_chat))
        .route("/api/chats/:chat_id/users", get(list_participants).post(add_participant))
}

#[utoipa::path(
    post,
    path = "/api/chats",
    tag = "chats",
    request_body = CreateChatRequest,
    responses(
        (status = 201, description = "Conversation created", body = ChatResponse),
        (status = 400, description = "Invalid participant id", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn create_chat(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateChatRequest>,
) -> GatewayResult<impl IntoResponse> {
    let mut participants = payload.participants;
    participants.push(identity.user_id);

    let chat = state.chats().create(&participants).await?;

    Ok((StatusCode::CREATED, Json(ChatResponse::from(chat))))
}

#[utoipa::path(
    get,
    path = "/api/chats",
    tag = "chats",
    responses(
        (status = 200, description = "Conversations of the caller, most recently active first", body = Vec<ChatResponse>),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn list_chats(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
) -> GatewayResult<Json<Vec<ChatResponse>>> {
    let chats = state.chats();
    let ids = chats.find_by_user(identity.user_id).await?;

    let mut response = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(chat) = chats.find_by_id(id).await? {
            response.push(chat.into());
        }
    }

    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/api/chats/{chat_id}",
    tag = "chats",
    params(
        ("chat_id" = i64, Path, description = "Conversation id")
    ),
    responses(
        (status = 200, description = "Conversation details", body = ChatResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Not a participant", body = ErrorResponse),
        (status = 404, description = "Conversation not found", body = ErrorResponse)
    )
)]
pub async fn get_chat(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(chat_id): Path<ConversationId>,
) -> GatewayResult<Json<ChatResponse>> {
    let chat = visible_chat(&state, chat_id, &identity).await?;
    Ok(Json(chat.into()))
}

#[utoipa::path(
    get,
    path = "/api/chats/{chat_id}/users",
    tag = "chats",
    params(
        ("chat_id" = i64, Path, description = "Conversation id")
    ),
    responses(
        (status = 200, description = "Participant user ids", body = Vec<i64>),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Not a participant", body = ErrorResponse),
        (status = 404, description = "Conversation not found", body = ErrorResponse)
    )
)]
pub async fn list_participants(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(chat_id): Path<ConversationId>,
) -> GatewayResult<Json<Vec<UserId>>> {
    let chat = visible_chat(&state, chat_id, &identity).await?;
    Ok(Json(chat.participants))
}

/// Invite another user into a conversation the caller already belongs to.
#[utoipa::path(
    post,
    path = "/api/chats/{chat_id}/users",
    tag = "chats",
    params(
        ("chat_id" = i64, Path, description = "Conversation id")
    ),
    request_body = AddParticipantRequest,
    responses(
        (status = 200, description = "Participant added", body = AddParticipantResponse),
        (status = 400, description = "Invalid user id", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Not a participant", body = ErrorResponse),
        (status = 404, description = "Conversation not found", body = ErrorResponse)
    )
)]
pub async fn add_participant(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(chat_id): Path<ConversationId>,
    Json(payload): Json<AddParticipantRequest>,
) -> GatewayResult<Json<AddParticipantResponse>> {
    if payload.user_id <= 0 {
        return Err(GatewayError::InvalidRequest(format!(
            "user id {} is not a valid user id",
            payload.user_id
        )));
    }

    visible_chat(&state, chat_id, &identity).await?;
    let added = state.chats().add_participant(chat_id, payload.user_id).await?;

    Ok(Json(AddParticipantResponse {
        chat_id,
        user_id: payload.user_id,
        added,
    }))
}

/// 404 for unknown conversations, 403 for ones the caller is not part of.
async fn visible_chat(
    state: &GatewayState,
    chat_id: ConversationId,
    identity: &Identity,
) -> GatewayResult<Conversation> {
    let chat = state
        .chats()
        .find_by_id(chat_id)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("conversation {chat_id} not found")))?;

    if !chat.has_participant(identity.user_id) {
        return Err(GatewayError::AuthorizationFailed(format!(
            "user {} is not a participant of conversation {}",
            identity.user_id, chat_id
        )));
    }

    Ok(chat)
}
