//! Chat WebSocket handshake

use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use chatwire_database::ConversationId;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::state::GatewayState;
use crate::websocket::session;

#[derive(Debug, Deserialize)]
pub struct ChatSocketQuery {
    pub chat_id: Option<String>,
    pub token: Option<String>,
}

/// `GET /ws/chat?chat_id=<id>`
///
/// The caller is authenticated and checked for membership before the
/// upgrade, so a rejected handshake never reaches the coordinator.
pub async fn chat_websocket_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ChatSocketQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> GatewayResult<Response> {
    let identity = state
        .authenticate(&headers, query.token.as_deref())
        .map_err(|err| {
            warn!(error = %err, "websocket handshake rejected");
            err
        })?;

    let conversation_id = parse_conversation_id(query.chat_id.as_deref())?;
    state.ensure_participant(conversation_id, &identity).await?;

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    info!(
        user_id = identity.user_id,
        conversation_id,
        "websocket handshake accepted"
    );

    Ok(ws
        .on_failed_upgrade(move |err| {
            warn!(error = %err, conversation_id, "websocket upgrade failed");
        })
        .on_upgrade(move |socket| session::run(socket, state, identity, conversation_id)))
}

fn parse_conversation_id(raw: Option<&str>) -> GatewayResult<ConversationId> {
    let raw = raw
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| GatewayError::InvalidRequest("chat_id is required".to_string()))?;

    match raw.parse::<ConversationId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(GatewayError::InvalidRequest(format!("invalid chat_id '{raw}'"))),
    }
}
