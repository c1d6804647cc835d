//! `/ai/*` endpoints serving generated navigation-bar copy.
//!
//! Each handler always answers 200; [`NavbarGenerator`](crate::navbar::NavbarGenerator)
//! swaps in mock content whenever the completion service lets it down.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::navbar::{ActionItem, HealthAlert, HealthStatus, MetricsInput, NavLink};
use crate::AppState;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/ai/navbar-greeting", post(greeting))
        .route("/ai/health-status-badge", post(health_status))
        .route("/ai/nav-recommendations", post(nav_recommendations))
        .route("/ai/action-items", post(action_items))
        .route("/ai/health-alert", post(health_alert))
}

#[derive(Debug, Deserialize)]
struct GreetingRequest {
    #[serde(default)]
    metrics: MetricsInput,
    #[serde(default)]
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct MetricsRequest {
    #[serde(default)]
    metrics: MetricsInput,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NavRequest {
    #[serde(default)]
    metrics: MetricsInput,
    #[serde(default)]
    current_page: String,
}

#[derive(Debug, Deserialize)]
struct AlertRequest {
    #[serde(default)]
    anomalies: Vec<Value>,
}

#[derive(Serialize)]
struct GreetingResponse {
    greeting: String,
}

#[derive(Serialize)]
struct StatusResponse {
    status: HealthStatus,
}

#[derive(Serialize)]
struct NavResponse {
    recommendations: Vec<NavLink>,
}

#[derive(Serialize)]
struct ActionsResponse {
    actions: Vec<ActionItem>,
}

#[derive(Serialize)]
struct AlertResponse {
    alert: Option<HealthAlert>,
}

async fn greeting(State(state): State<AppState>, Json(req): Json<GreetingRequest>) -> Json<GreetingResponse> {
    Json(GreetingResponse {
        greeting: state.navbar.greeting(&req.metrics, &req.timestamp).await,
    })
}

async fn health_status(State(state): State<AppState>, Json(req): Json<MetricsRequest>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.navbar.health_status(&req.metrics).await,
    })
}

async fn nav_recommendations(State(state): State<AppState>, Json(req): Json<NavRequest>) -> Json<NavResponse> {
    Json(NavResponse {
        recommendations: state.navbar.nav_recommendations(&req.metrics, &req.current_page).await,
    })
}

async fn action_items(State(state): State<AppState>, Json(req): Json<MetricsRequest>) -> Json<ActionsResponse> {
    Json(ActionsResponse {
        actions: state.navbar.action_items(&req.metrics).await,
    })
}

async fn health_alert(State(state): State<AppState>, Json(req): Json<AlertRequest>) -> Json<AlertResponse> {
    Json(AlertResponse {
        alert: state.navbar.alert(&req.anomalies).await,
    })
}
