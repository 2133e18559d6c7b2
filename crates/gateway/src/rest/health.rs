use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use chatwire_delivery::CoordinatorStats;
use chrono::Utc;
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::state::GatewayState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub database: bool,
    pub coordinator: Option<CoordinatorStats>,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Database or coordinator is down", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<Arc<GatewayState>>) -> (StatusCode, Json<HealthResponse>) {
    let database = match chatwire_database::ping(&state.pool).await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "health check: database unreachable");
            false
        }
    };
    let coordinator = state.coordinator().stats().await.ok();

    let healthy = database && coordinator.is_some();
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if healthy { "ok" } else { "degraded" }.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            database,
            coordinator,
        }),
    )
}
