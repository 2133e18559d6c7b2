//! # Chatwire Gateway Crate
//!
//! HTTP and WebSocket surface of the chat backend.
//!
//! ## Architecture
//!
//! - **REST**: conversations, message submission, history and read marking, with OpenAPI documentation
//! - **WebSocket**: `/ws/chat`, one socket per user per conversation, backed by the delivery coordinator
//! - **State**: shared pool, identity verifier and delivery service
//! - **Middleware**: bearer authentication, CORS and request logging

pub mod error;
pub mod middleware;
pub mod rest;
pub mod state;
pub mod websocket;

pub use error::{ErrorResponse, GatewayError, GatewayResult};
pub use middleware::auth_middleware;
pub use state::GatewayState;

use std::sync::Arc;

use axum::{http::Method, middleware as axum_middleware, routing::get, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        rest::health::health_check,
        rest::chat::create_chat,
        rest::chat::list_chats,
        rest::chat::get_chat,
        rest::chat::list_participants,
        rest::chat::add_participant,
        rest::message::create_message,
        rest::message::list_messages,
        rest::message::get_message,
        rest::message::mark_read,
    ),
    components(
        schemas(
            rest::health::HealthResponse,
            rest::chat::ChatResponse,
            rest::chat::CreateChatRequest,
            rest::chat::AddParticipantRequest,
            rest::chat::AddParticipantResponse,
            rest::message::CreateMessageRequest,
            rest::message::MarkReadResponse,
            chatwire_delivery::MessageEnvelope,
            chatwire_delivery::CoordinatorStats,
            ErrorResponse,
        )
    ),
    tags(
        (name = "chats", description = "Conversations and their participants"),
        (name = "messages", description = "Message submission, history and read receipts"),
        (name = "health", description = "Liveness"),
    )
)]
pub struct ApiDoc;

/// Create the main application router with all routes
pub fn create_router(state: GatewayState) -> Router {
    let arc_state = Arc::new(state);

    let authenticated = rest::create_rest_routes().route_layer(axum_middleware::from_fn_with_state(
        arc_state.clone(),
        auth_middleware,
    ));

    Router::new()
        .merge(authenticated)
        .merge(rest::create_public_routes())
        .merge(websocket::create_websocket_routes())
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .with_state(arc_state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any),
        )
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
}
