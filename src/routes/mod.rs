use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

mod ai;
mod chat;
mod data;
mod health;
mod metrics;
mod sessions;
mod upload;
mod users;

// ---

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(upload::router())
        .merge(data::router())
        .merge(sessions::router())
        .merge(users::router())
        .merge(chat::router())
        .merge(ai::router())
        .merge(metrics::router())
        .merge(health::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
