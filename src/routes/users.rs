use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::config::MAX_HISTORY_DAYS;
use crate::error::ApiError;
use crate::memory::{compact_sessions, CompactContext, Session, UserPattern, DEFAULT_COMPACT_SIZE};
use crate::AppState;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/users/{user_id}/history", get(history))
        .route("/users/{user_id}/patterns", get(patterns))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    days: Option<u32>,
}

#[derive(Serialize)]
struct HistoryResponse {
    user_id: String,
    days: u32,
    context: CompactContext,
    sessions: Vec<Session>,
}

#[derive(Serialize)]
struct PatternsResponse {
    user_id: String,
    patterns: Vec<UserPattern>,
}

/// Finalized sessions newest first, with their compacted context.
async fn history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    // ---
    let days = params.days.unwrap_or(state.config.history_days);
    if !(1..=MAX_HISTORY_DAYS).contains(&days) {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {MAX_HISTORY_DAYS}, got {days}"
        )));
    }

    let sessions = state.memory.history(&user_id, i64::from(days)).await?;
    let context = compact_sessions(&sessions, DEFAULT_COMPACT_SIZE);

    Ok(Json(HistoryResponse {
        user_id,
        days,
        context,
        sessions,
    }))
}

async fn patterns(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<PatternsResponse>, ApiError> {
    // ---
    let patterns = state.memory.bank().get_patterns(&user_id).await?;
    Ok(Json(PatternsResponse { user_id, patterns }))
}
