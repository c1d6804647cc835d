use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::AppState;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/sessions/{user_id}", get(handler))
}

#[derive(Serialize)]
struct SessionsResponse {
    user_id: String,
    data_ids: Vec<String>,
}

/// Data ids uploaded by `user_id`, oldest first. Unknown users get an empty list.
async fn handler(State(state): State<AppState>, Path(user_id): Path<String>) -> Json<SessionsResponse> {
    // ---
    let data_ids = state.uploads_for(&user_id).await;
    Json(SessionsResponse { user_id, data_ids })
}
