// src/routes/health.rs
//! Liveness endpoint.
//!
//! Used by container orchestrators and CI to check that the service answers
//! HTTP. It reports whether a completion service is configured but never
//! calls it, and never touches the database.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    ai_enabled: bool,
}

/// Handle `GET /health`.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        ai_enabled: state.config.gemini_api_key.is_some(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
