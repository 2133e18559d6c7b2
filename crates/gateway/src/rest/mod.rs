//! REST API endpoints for the gateway

pub mod chat;
pub mod health;
pub mod message;

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::state::GatewayState;

/// Routes that require an authenticated caller
pub fn create_rest_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .merge(chat::create_chat_routes())
        .merge(message::create_message_routes())
}

/// Routes open to anyone
pub fn create_public_routes() -> Router<Arc<GatewayState>> {
    Router::new().route("/health", get(health::health_check))
}

pub use chat::*;
pub use health::*;
pub use message::*;
