use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::{MetricsSnapshot, SystemHealth};
use crate::AppState;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/metrics", get(handler))
}

#[derive(Serialize)]
struct MetricsResponse {
    #[serde(flatten)]
    counters: MetricsSnapshot,
    active_sessions: usize,
    system_health: SystemHealth,
}

/// Counters, per-agent completion outcomes and latency, and the health roll-up.
async fn handler(State(state): State<AppState>) -> Json<MetricsResponse> {
    // ---
    let counters = state.metrics.snapshot();
    let system_health = SystemHealth::from_snapshot(&counters, state.config.gemini_api_key.is_some());

    Json(MetricsResponse {
        counters,
        active_sessions: state.memory.sessions().len().await,
        system_health,
    })
}
