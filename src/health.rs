use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{error, instrument};

use crate::{config::StorageBackend, state::AppState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[instrument(skip(state))]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let backend = state.store.backend();
    let timestamp = OffsetDateTime::now_utc();
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                database: match backend {
                    StorageBackend::Memory => "in-memory",
                    StorageBackend::Postgres => "connected",
                },
                error: None,
                timestamp,
            }),
        ),
        Err(e) => {
            error!(error = %e, "health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(HealthResponse {
                    status: "error",
                    database: "disconnected",
                    error: Some(e.to_string()),
                    timestamp,
                }),
            )
        }
    }
}
