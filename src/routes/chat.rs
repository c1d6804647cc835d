use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::llm::complete_with_policy;
use crate::state::{Agent, ChatExchange};
use crate::{AppState, Summary};

const APOLOGY: &str = "I'm having trouble right now. Please try again later.";

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/chat", post(chat))
        .route("/chat/history", get(history))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    data_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    response: String,
    has_context: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn build_prompt(message: &str, summary: Option<&Summary>) -> String {
    // ---
    let context = summary
        .map(|s| {
            format!(
                "User's Health Data:\n- Steps: {:.0}/day\n- Heart Rate: {:.0} bpm\n- Sleep: {:.1} hours\n- Water: {:.0} ml\n\n",
                s.steps(),
                s.heart_rate(),
                s.sleep(),
                s.water()
            )
        })
        .unwrap_or_default();

    format!(
        "You are a helpful health assistant. {context}\nUser Question: {message}\n\n\
         Provide a helpful, personalized response."
    )
}

/// Upstream failure is reported in the body, never as an HTTP error.
async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Result<Json<ChatResponse>, ApiError> {
    // ---
    if req.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }

    let summary = match &req.data_id {
        Some(id) => state.dataset(id).await.map(|d| d.report.summary),
        None => None,
    };
    let has_context = summary.is_some();
    let prompt = build_prompt(&req.message, summary.as_ref());

    let started = Instant::now();
    let outcome = complete_with_policy(state.llm.as_ref(), &prompt, state.policy).await;
    state
        .metrics
        .record_completion(Agent::Chat, started.elapsed(), outcome.is_ok());

    let response = match outcome {
        Ok(text) => ChatResponse {
            response: text,
            has_context,
            error: None,
        },
        Err(e) => {
            warn!(error = %e, "chat completion failed");
            state.metrics.record_fallback(Agent::Chat);
            ChatResponse {
                response: APOLOGY.to_string(),
                has_context,
                error: Some(e.to_string()),
            }
        }
    };

    state
        .push_chat(ChatExchange {
            message: req.message,
            response: response.response.clone(),
            has_context,
            timestamp: Utc::now(),
        })
        .await;

    info!(has_context, ok = response.error.is_none(), "POST /chat answered");
    Ok(Json(response))
}

async fn history(State(state): State<AppState>) -> Json<Vec<ChatExchange>> {
    Json(state.chat_history.read().await.iter().cloned().collect())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::Metric;

    #[test]
    fn test_prompt_context() {
        // ---
        let summary: Summary = [
            (Metric::Steps, 8_000.4),
            (Metric::HeartRate, 71.6),
            (Metric::Sleep, 7.26),
            (Metric::Water, 1_850.0),
        ]
        .into_iter()
        .collect();
        let with = build_prompt("How am I doing?", Some(&summary));
        assert!(with.contains("Steps: 8000/day"));
        assert!(with.contains("Heart Rate: 72 bpm"));
        assert!(with.contains("Sleep: 7.3 hours"));
        assert!(with.contains("Water: 1850 ml"));

        let sparse: Summary = [(Metric::Steps, 8_000.0)].into_iter().collect();
        assert!(build_prompt("hi", Some(&sparse)).contains("Water: 0 ml"));
        assert!(with.contains("User Question: How am I doing?"));

        assert!(!build_prompt("hi", None).contains("User's Health Data"));
    }
}
