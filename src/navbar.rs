//! Generated UI copy for the navigation bar.
//!
//! Every generator asks the completion service first and falls back to a
//! deterministic mock when the call fails or the reply does not parse into
//! the expected shape. Callers always get schema-valid content.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Timelike};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::llm::{complete_with_policy, extract_delimited, CompletionPolicy, CompletionService};
use crate::state::{Agent, Metrics};

const MAX_GREETING_CHARS: usize = 100;

// ---

/// Averages supplied by the dashboard. Missing fields read as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsInput {
    pub avg_steps: f64,
    pub avg_heart_rate: f64,
    pub avg_sleep: f64,
    pub avg_water: f64,
}

impl MetricsInput {
    fn describe(&self) -> String {
        // ---
        format!(
            "- Steps: {:.0}/day\n- Heart Rate: {:.0} bpm\n- Sleep: {:.1} hours\n- Water: {:.1}L/day",
            self.avg_steps, self.avg_heart_rate, self.avg_sleep, self.avg_water
        )
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub color: String,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NavLink {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ActionItem {
    pub title: String,
    pub message: String,
    pub urgency: Urgency,
    pub action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Critical,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HealthAlert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub message: String,
    pub details: String,
}

#[derive(Clone)]
pub struct NavbarGenerator {
    service: Arc<dyn CompletionService>,
    policy: CompletionPolicy,
    metrics: Arc<Metrics>,
}

impl NavbarGenerator {
    // ---
    pub fn new(service: Arc<dyn CompletionService>, policy: CompletionPolicy, metrics: Arc<Metrics>) -> Self {
        Self {
            service,
            policy,
            metrics,
        }
    }

    #[instrument(skip(self, metrics))]
    pub async fn greeting(&self, metrics: &MetricsInput, timestamp: &str) -> String {
        // ---
        let prompt = format!(
            "Generate a brief, friendly greeting (max 20 words) for a health tracking app \
             based on these metrics:\n{}\n\nTime: {timestamp}\n\n\
             Keep it encouraging and personalized. No JSON, just the greeting text.",
            metrics.describe()
        );

        match self.complete(&prompt).await {
            Some(text) => {
                let greeting = text.trim().trim_matches('"').trim();
                if greeting.is_empty() {
                    self.metrics.record_fallback(Agent::Navbar);
                    mock_greeting(metrics, timestamp)
                } else {
                    truncate_greeting(greeting)
                }
            }
            None => mock_greeting(metrics, timestamp),
        }
    }

    #[instrument(skip_all)]
    pub async fn health_status(&self, metrics: &MetricsInput) -> HealthStatus {
        // ---
        let prompt = format!(
            "Assess the health status based on these metrics:\n{}\n\n\
             Provide JSON response with:\n\
             - status: One of \"Excellent\", \"Good\", \"Fair\", \"Needs Attention\"\n\
             - color: One of \"emerald\", \"blue\", \"yellow\", \"red\"\n\
             - score: 0-100 health score\n\n\
             Example: {{\"status\": \"Good\", \"color\": \"blue\", \"score\": 78}}",
            metrics.describe()
        );

        self.ask::<HealthStatus>(&prompt, '{', '}')
            .await
            .filter(|s| s.score <= 100 && !s.status.is_empty())
            .unwrap_or_else(|| mock_health_status(metrics))
    }

    #[instrument(skip(self, metrics))]
    pub async fn nav_recommendations(&self, metrics: &MetricsInput, current_page: &str) -> Vec<NavLink> {
        // ---
        let prompt = format!(
            "Based on health metrics, suggest 2 next actions for a health tracking app user:\n{}\n\
             - Current page: {current_page}\n\n\
             Respond with JSON array of 2 recommendations with \"label\" and \"path\" fields.\n\
             Paths should be: /trends, /insights, /forecast, /health-assistant, /wellness-center, /\n\n\
             Example: [{{\"label\": \"View Sleep Trends\", \"icon\": \"TrendingUp\", \"path\": \"/trends\"}}]",
            metrics.describe()
        );

        self.ask::<Vec<NavLink>>(&prompt, '[', ']')
            .await
            .filter(|links| !links.is_empty())
            .unwrap_or_else(|| mock_nav_recommendations(current_page))
    }

    #[instrument(skip_all)]
    pub async fn action_items(&self, metrics: &MetricsInput) -> Vec<ActionItem> {
        // ---
        let prompt = format!(
            "Generate 1-2 actionable health recommendations based on these metrics:\n{}\n\n\
             Respond with JSON array with fields: title, message, urgency (high/medium/low), action (route path).\n\n\
             Example: [{{\"title\": \"Low Activity\", \"message\": \"Try a 15-minute walk\", \
             \"urgency\": \"high\", \"action\": \"/wellness-center\"}}]",
            metrics.describe()
        );

        self.ask::<Vec<ActionItem>>(&prompt, '[', ']')
            .await
            .filter(|items| !items.is_empty())
            .unwrap_or_else(|| mock_action_items(metrics))
    }

    /// `None` when there is nothing to alert about; the service is not asked.
    #[instrument(skip_all, fields(anomalies = anomalies.len()))]
    pub async fn alert(&self, anomalies: &[Value]) -> Option<HealthAlert> {
        // ---
        if anomalies.is_empty() {
            return None;
        }

        let listed: Vec<String> = anomalies
            .iter()
            .map(|a| format!("- {}", anomaly_reason(a).unwrap_or("Unknown issue")))
            .collect();
        let prompt = format!(
            "Create a brief health alert based on these anomalies:\n{}\n\n\
             Respond with JSON: {{\"type\": \"critical\" or \"warning\", \"message\": \"...\", \"details\": \"...\"}}\n\
             Keep message under 60 chars, details under 100 chars.",
            listed.join("\n")
        );

        match self.ask::<HealthAlert>(&prompt, '{', '}').await {
            Some(alert) => Some(alert),
            None => mock_alert(anomalies),
        }
    }

    /// One policy-wrapped call. `None` means the caller should use its mock.
    async fn complete(&self, prompt: &str) -> Option<String> {
        // ---
        let started = Instant::now();
        let outcome = complete_with_policy(self.service.as_ref(), prompt, self.policy).await;
        self.metrics
            .record_completion(Agent::Navbar, started.elapsed(), outcome.is_ok());

        match outcome {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(error = %e, "navbar generation failed, using mock content");
                self.metrics.record_fallback(Agent::Navbar);
                None
            }
        }
    }

    /// Call the service and decode the delimited JSON in its reply.
    async fn ask<T: DeserializeOwned>(&self, prompt: &str, open: char, close: char) -> Option<T> {
        // ---
        let text = self.complete(prompt).await?;
        let parsed = extract_delimited(&text, open, close).and_then(|json| serde_json::from_str(json).ok());
        if parsed.is_none() {
            debug!("navbar reply did not match the expected shape");
            self.metrics.record_fallback(Agent::Navbar);
        }
        parsed
    }
}

fn truncate_greeting(greeting: &str) -> String {
    // ---
    if greeting.chars().count() > MAX_GREETING_CHARS {
        let head: String = greeting.chars().take(MAX_GREETING_CHARS - 3).collect();
        format!("{head}...")
    } else {
        greeting.to_string()
    }
}

/// Hour of an RFC 3339 timestamp in its own offset; noon when unparsable.
fn hour_of(timestamp: &str) -> u32 {
    DateTime::parse_from_rfc3339(timestamp.trim()).map(|t| t.hour()).unwrap_or(12)
}

pub fn mock_greeting(metrics: &MetricsInput, timestamp: &str) -> String {
    // ---
    let time_of_day = match hour_of(timestamp) {
        h if h < 12 => "morning",
        h if h < 17 => "afternoon",
        _ => "evening",
    };
    let steps_status = if metrics.avg_steps >= 8_000.0 {
        "Great job with your steps"
    } else if metrics.avg_steps >= 5_000.0 {
        "Keep moving"
    } else {
        "Time to get active"
    };
    format!("Good {time_of_day}! {steps_status}.")
}

pub fn mock_health_status(metrics: &MetricsInput) -> HealthStatus {
    // ---
    let score = metrics.avg_steps / 10_000.0 * 0.3
        + metrics.avg_sleep / 8.0 * 0.3
        + (100.0 - (metrics.avg_heart_rate - 70.0).abs()) / 100.0 * 0.2
        + metrics.avg_water / 2.5 * 0.2;

    let (status, color, score) = if score >= 0.8 {
        ("Excellent", "emerald", 85)
    } else if score >= 0.6 {
        ("Good", "blue", 72)
    } else {
        ("Needs Attention", "red", 45)
    };
    HealthStatus {
        status: status.to_string(),
        color: color.to_string(),
        score,
    }
}

fn link(label: &str, icon: &str, path: &str) -> NavLink {
    NavLink {
        label: label.to_string(),
        icon: Some(icon.to_string()),
        path: path.to_string(),
    }
}

/// Fixed suggestions per page; unknown pages get the dashboard's.
pub fn mock_nav_recommendations(current_page: &str) -> Vec<NavLink> {
    // ---
    match current_page {
        "/trends" => vec![
            link("Check Forecast", "Zap", "/forecast"),
            link("View Dashboard", "BarChart3", "/"),
        ],
        "/insights" => vec![
            link("Chat with AI", "MessageCircle", "/health-assistant"),
            link("Wellness Hub", "Heart", "/wellness-center"),
        ],
        _ => vec![
            link("View Trends", "TrendingUp", "/trends"),
            link("Get Insights", "Lightbulb", "/insights"),
        ],
    }
}

fn action(title: &str, message: &str, urgency: Urgency, path: &str) -> ActionItem {
    ActionItem {
        title: title.to_string(),
        message: message.to_string(),
        urgency,
        action: path.to_string(),
    }
}

pub fn mock_action_items(metrics: &MetricsInput) -> Vec<ActionItem> {
    // ---
    let mut items = Vec::new();
    if metrics.avg_steps < 5_000.0 {
        items.push(action("Low Activity", "Try a 15-minute walk", Urgency::High, "/wellness-center"));
    }
    if metrics.avg_sleep < 6.5 {
        items.push(action("Inadequate Sleep", "Aim for 7-9 hours tonight", Urgency::High, "/insights"));
    }
    if items.is_empty() {
        items.push(action("Keep it Up!", "Your health looks great", Urgency::Low, "/"));
    }
    items
}

fn anomaly_reason(anomaly: &Value) -> Option<&str> {
    anomaly
        .get("reason")
        .or_else(|| anomaly.get("message"))
        .and_then(Value::as_str)
}

pub fn mock_alert(anomalies: &[Value]) -> Option<HealthAlert> {
    // ---
    let first = anomalies.first()?;
    Some(HealthAlert {
        kind: AlertKind::Warning,
        message: format!("{} metrics need attention", anomalies.len()),
        details: anomaly_reason(first).unwrap_or("Review your health data").to_string(),
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::llm::testing::{fast_policy, FailingCompletion, ScriptedCompletion};
    use serde_json::json;

    fn generator(service: impl CompletionService + 'static) -> (NavbarGenerator, Arc<Metrics>) {
        // ---
        let metrics = Arc::new(Metrics::default());
        (
            NavbarGenerator::new(Arc::new(service), fast_policy(), Arc::clone(&metrics)),
            metrics,
        )
    }

    fn active() -> MetricsInput {
        MetricsInput {
            avg_steps: 9_000.0,
            avg_heart_rate: 70.0,
            avg_sleep: 8.0,
            avg_water: 2.5,
        }
    }

    #[test]
    fn test_metrics_input_defaults_missing_fields() {
        // ---
        let input: MetricsInput = serde_json::from_value(json!({"avgSteps": 4200})).unwrap();
        assert_eq!(input.avg_steps, 4_200.0);
        assert_eq!(input.avg_sleep, 0.0);
    }

    #[test]
    fn test_mock_greeting_time_of_day() {
        // ---
        let m = active();
        assert_eq!(mock_greeting(&m, "2024-05-01T08:30:00Z"), "Good morning! Great job with your steps.");
        assert_eq!(mock_greeting(&m, "2024-05-01T19:00:00+02:00"), "Good evening! Great job with your steps.");
        let lazy = MetricsInput::default();
        assert_eq!(mock_greeting(&lazy, "not a time"), "Good afternoon! Time to get active.");
    }

    #[test]
    fn test_mock_health_status_bands() {
        // ---
        assert_eq!(mock_health_status(&active()).status, "Excellent");
        let fair = MetricsInput {
            avg_steps: 6_000.0,
            avg_heart_rate: 75.0,
            avg_sleep: 6.5,
            avg_water: 1.5,
        };
        assert_eq!(mock_health_status(&fair).color, "blue");
        assert_eq!(mock_health_status(&MetricsInput::default()).score, 45);
    }

    #[test]
    fn test_mock_nav_and_actions() {
        // ---
        assert_eq!(mock_nav_recommendations("/trends")[0].path, "/forecast");
        assert_eq!(mock_nav_recommendations("/unknown"), mock_nav_recommendations("/"));

        let tired = MetricsInput {
            avg_steps: 3_000.0,
            avg_sleep: 5.0,
            ..MetricsInput::default()
        };
        let titles: Vec<String> = mock_action_items(&tired).into_iter().map(|a| a.title).collect();
        assert_eq!(titles, vec!["Low Activity", "Inadequate Sleep"]);
        assert_eq!(mock_action_items(&active())[0].urgency, Urgency::Low);
    }

    #[test]
    fn test_mock_alert() {
        // ---
        assert!(mock_alert(&[]).is_none());
        let alert = mock_alert(&[json!({"reason": "High heart rate"}), json!({})]).unwrap();
        assert_eq!(alert.message, "2 metrics need attention");
        assert_eq!(alert.details, "High heart rate");
        assert_eq!(mock_alert(&[json!({})]).unwrap().details, "Review your health data");
    }

    #[tokio::test]
    async fn test_failing_service_uses_mocks() {
        // ---
        let (nav, metrics) = generator(FailingCompletion);
        let m = active();

        assert_eq!(nav.greeting(&m, "2024-05-01T08:00:00Z").await, mock_greeting(&m, "2024-05-01T08:00:00Z"));
        assert_eq!(nav.health_status(&m).await, mock_health_status(&m));
        assert_eq!(nav.nav_recommendations(&m, "/insights").await, mock_nav_recommendations("/insights"));
        assert_eq!(nav.action_items(&m).await, mock_action_items(&m));
        assert_eq!(nav.alert(&[json!({"reason": "x"})]).await, mock_alert(&[json!({"reason": "x"})]));
        assert_eq!(nav.alert(&[]).await, None);

        let snap = metrics.snapshot();
        assert_eq!(snap.completion_calls, 5);
        assert_eq!(snap.fallbacks, 5);
    }

    #[tokio::test]
    async fn test_parses_model_replies() {
        // ---
        let (nav, _) = generator(ScriptedCompletion::replying(
            "Here you go: {\"status\": \"Fair\", \"color\": \"yellow\", \"score\": 61}",
        ));
        let status = nav.health_status(&active()).await;
        assert_eq!(status.status, "Fair");
        assert_eq!(status.score, 61);

        let (nav, _) = generator(ScriptedCompletion::replying(
            r#"[{"title": "Hydrate", "message": "Drink water", "urgency": "medium", "action": "/insights"}]"#,
        ));
        let items = nav.action_items(&active()).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].urgency, Urgency::Medium);

        let (nav, _) = generator(ScriptedCompletion::replying(r#"[{"label": "Trends", "path": "/trends"}]"#));
        let links = nav.nav_recommendations(&active(), "/").await;
        assert_eq!(links[0].icon, None);
    }

    #[tokio::test]
    async fn test_unparsable_reply_falls_back() {
        // ---
        let (nav, metrics) = generator(ScriptedCompletion::replying("I cannot help with that."));
        assert_eq!(nav.health_status(&active()).await, mock_health_status(&active()));

        let (nav, _) = generator(ScriptedCompletion::replying(r#"{"status": "Good", "color": "blue", "score": 250}"#));
        assert_eq!(nav.health_status(&active()).await, mock_health_status(&active()));

        assert_eq!(metrics.snapshot().fallbacks, 1);
        assert_eq!(metrics.snapshot().completion_failures, 0);
    }

    #[tokio::test]
    async fn test_greeting_is_trimmed_and_capped() {
        // ---
        let (nav, _) = generator(ScriptedCompletion::replying("  \"Hello there!\"  "));
        assert_eq!(nav.greeting(&active(), "").await, "Hello there!");

        let long = "a".repeat(150);
        let (nav, _) = generator(ScriptedCompletion::replying(&long));
        let greeting = nav.greeting(&active(), "").await;
        assert_eq!(greeting.chars().count(), 100);
        assert!(greeting.ends_with("..."));
    }
}
