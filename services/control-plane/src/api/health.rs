//! Health check endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// "ok" or "degraded".
    pub status: String,
    pub service: String,
    pub version: String,
    /// Current timestamp (ISO 8601).
    pub timestamp: String,
    /// Number of installed resource definitions (readiness only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definitions: Option<usize>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/livez", get(livez))
}

/// Liveness plus identity: 200 whenever the server is accepting requests.
async fn healthz() -> impl IntoResponse {
    Json(response(None))
}

/// Ready once the store answers.
async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let definitions = state.store().list_definitions().await.len();
    (StatusCode::OK, Json(response(Some(definitions))))
}

async fn livez() -> impl IntoResponse {
    StatusCode::OK
}

fn response(definitions: Option<usize>) -> HealthResponse {
    HealthResponse {
        status: "ok".to_string(),
        service: "sortie-control-plane".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        definitions,
    }
}
