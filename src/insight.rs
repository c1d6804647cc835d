//! LLM insight agent.
//!
//! Builds a prompt from one analysis snapshot, asks the completion service for
//! a JSON assessment, and normalizes whatever comes back into an
//! [`InsightReport`]. The agent never returns an error: a failed call resolves
//! to the rule-based fallback and an unparsable reply to line heuristics. The
//! [`InsightSource`] on the report says which path produced it.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::llm::{complete_with_policy, extract_delimited, CompletionPolicy, CompletionService};
use crate::models::{Anomaly, Insight, Priority, Summary, Trends};
use crate::state::{Agent, Metrics};

const MAX_RECOMMENDATIONS: usize = 3;
const MAX_RISKS: usize = 2;
const HEURISTIC_SCORE: f64 = 75.0;

// ---

/// Whether the report is backed by a model answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightStatus {
    Success,
    Error,
}

/// Which stage produced the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightSource {
    /// Model reply decoded as JSON.
    Parsed,
    /// Model reply scanned line by line.
    Heuristic,
    /// Model unreachable; computed from the summary alone.
    Fallback,
}

/// Assessment shape requested from the model. Missing fields default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Assessment {
    // ---
    pub wellness_score: f64,
    pub recommendations: Vec<String>,
    pub risks: Vec<String>,
    pub positive_patterns: Vec<String>,
    pub summary: String,
}

impl Default for Assessment {
    fn default() -> Self {
        Self {
            wellness_score: HEURISTIC_SCORE,
            recommendations: Vec::new(),
            risks: Vec::new(),
            positive_patterns: Vec::new(),
            summary: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightReport {
    // ---
    pub status: InsightStatus,
    pub source: InsightSource,
    pub insights: Vec<Insight>,
    pub assessment: Assessment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InsightReport {
    pub fn ai_powered(&self) -> bool {
        self.status == InsightStatus::Success
    }
}

/// Read-only context the agent reasons over.
#[derive(Debug, Clone, Copy)]
pub struct InsightContext<'a> {
    pub summary: &'a Summary,
    pub trends: &'a Trends,
    pub anomalies: &'a [Anomaly],
}

#[derive(Clone)]
pub struct InsightAgent {
    service: Arc<dyn CompletionService>,
    policy: CompletionPolicy,
    metrics: Arc<Metrics>,
}

impl InsightAgent {
    // ---
    pub fn new(service: Arc<dyn CompletionService>, policy: CompletionPolicy, metrics: Arc<Metrics>) -> Self {
        Self {
            service,
            policy,
            metrics,
        }
    }

    #[instrument(skip_all, fields(provider = self.service.name()))]
    pub async fn generate(&self, ctx: InsightContext<'_>) -> InsightReport {
        // ---
        let prompt = build_prompt(ctx);
        let started = Instant::now();
        let outcome = complete_with_policy(self.service.as_ref(), &prompt, self.policy).await;
        self.metrics
            .record_completion(Agent::Insight, started.elapsed(), outcome.is_ok());

        match outcome {
            Ok(text) => {
                let (assessment, source) = parse_response(&text);
                info!(?source, "insight agent answered");
                InsightReport {
                    status: InsightStatus::Success,
                    source,
                    insights: to_insights(&assessment),
                    assessment,
                    error: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "insight agent falling back to rule-based assessment");
                self.metrics.record_fallback(Agent::Insight);
                let assessment = fallback_assessment(ctx.summary);
                InsightReport {
                    status: InsightStatus::Error,
                    source: InsightSource::Fallback,
                    insights: to_insights(&assessment),
                    assessment,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

pub fn build_prompt(ctx: InsightContext<'_>) -> String {
    // ---
    let trends = serde_json::to_string_pretty(ctx.trends).unwrap_or_else(|_| "{}".to_string());
    let anomalies = serde_json::to_string_pretty(ctx.anomalies).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"
You are a health analysis AI. Analyze this health data and provide personalized insights:

HEALTH METRICS:
- Average Steps: {steps:.0}/day
- Average Heart Rate: {hr:.0} bpm
- Average Sleep: {sleep:.1} hours
- Average Water: {water:.0} ml

TRENDS DETECTED:
{trends}

ANOMALIES FOUND:
{anomalies}

Please provide:
1. Overall wellness assessment (score 0-100)
2. Top 3 personalized recommendations
3. Health risks to monitor
4. Positive patterns to maintain

Respond ONLY with JSON in exactly this shape:
{{
  "wellness_score": number,
  "recommendations": ["rec1", "rec2", "rec3"],
  "risks": ["risk1", "risk2"],
  "positive_patterns": ["pattern1", "pattern2"],
  "summary": "brief overall assessment"
}}
"#,
        steps = ctx.summary.steps(),
        hr = ctx.summary.heart_rate(),
        sleep = ctx.summary.sleep(),
        water = ctx.summary.water(),
    )
}

/// Decode the outermost JSON object in `text`, else fall back to line scanning.
pub fn parse_response(text: &str) -> (Assessment, InsightSource) {
    // ---
    let decoded = extract_delimited(text, '{', '}')
        .and_then(|json| serde_json::from_str::<Assessment>(json).ok());

    match decoded {
        Some(mut assessment) => {
            assessment.wellness_score = assessment.wellness_score.clamp(0.0, 100.0);
            (assessment, InsightSource::Parsed)
        }
        None => (scan_lines(text), InsightSource::Heuristic),
    }
}

/// Crude keyword classification. First matching keyword wins per line.
fn scan_lines(text: &str) -> Assessment {
    // ---
    let mut assessment = Assessment {
        summary: "Analysis completed".to_string(),
        ..Assessment::default()
    };

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let lower = line.to_lowercase();
        if lower.contains("recommend") {
            assessment.recommendations.push(line.to_string());
        } else if lower.contains("risk") {
            assessment.risks.push(line.to_string());
        } else if lower.contains("positive") || lower.contains("good") {
            assessment.positive_patterns.push(line.to_string());
        }
    }

    assessment
}

/// Assessment computed from the summary alone.
pub fn fallback_assessment(summary: &Summary) -> Assessment {
    // ---
    let steps = summary.steps();
    let sleep = summary.sleep();
    let hr = summary.heart_rate();

    let mut recommendations = Vec::new();
    if steps < 8_000.0 {
        recommendations.push("Increase daily steps to 8,000+".to_string());
    }
    if sleep < 7.0 {
        recommendations.push("Aim for 7-9 hours of sleep".to_string());
    }
    if hr > 85.0 {
        recommendations.push("Monitor heart rate patterns".to_string());
    }
    recommendations.truncate(MAX_RECOMMENDATIONS);

    Assessment {
        wellness_score: (steps / 100.0 + sleep * 10.0 + (100.0 - hr)).clamp(0.0, 100.0),
        recommendations,
        risks: vec!["Insufficient data for risk assessment".to_string()],
        positive_patterns: vec!["Regular health monitoring".to_string()],
        summary: "Basic health assessment completed".to_string(),
    }
}

fn to_insights(assessment: &Assessment) -> Vec<Insight> {
    // ---
    let recommendations = assessment
        .recommendations
        .iter()
        .take(MAX_RECOMMENDATIONS)
        .map(|rec| Insight::recommendation("AI Recommendation", rec.as_str(), Priority::Medium));
    let risks = assessment
        .risks
        .iter()
        .take(MAX_RISKS)
        .map(|risk| Insight::warning("Health Risk", risk.as_str(), Priority::High));

    recommendations.chain(risks).collect()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::llm::testing::{fast_policy, FailingCompletion, ScriptedCompletion, StalledCompletion};
    use crate::models::{InsightKind, Metric};

    fn summary() -> Summary {
        // ---
        [
            (Metric::Steps, 7_500.0),
            (Metric::HeartRate, 75.0),
            (Metric::Sleep, 6.5),
            (Metric::Water, 1_800.0),
        ]
        .into_iter()
        .collect()
    }

    fn agent(service: Arc<dyn CompletionService>) -> InsightAgent {
        InsightAgent::new(service, fast_policy(), Arc::new(Metrics::default()))
    }

    async fn run(agent: &InsightAgent) -> InsightReport {
        // ---
        let summary = summary();
        let trends = Trends::new();
        agent
            .generate(InsightContext {
                summary: &summary,
                trends: &trends,
                anomalies: &[],
            })
            .await
    }

    #[test]
    fn test_prompt_embeds_metrics_and_schema() {
        // ---
        let summary = summary();
        let trends = Trends::new();
        let prompt = build_prompt(InsightContext {
            summary: &summary,
            trends: &trends,
            anomalies: &[],
        });

        assert!(prompt.contains("Average Steps: 7500/day"));
        assert!(prompt.contains("Average Sleep: 6.5 hours"));
        assert!(prompt.contains("\"wellness_score\": number"));
    }

    #[test]
    fn test_parse_fenced_json() {
        // ---
        let reply = "Here you go:\n```json\n{\"wellness_score\": 82, \"recommendations\": [\"Walk more\"], \"risks\": [], \"summary\": \"Solid\"}\n```";
        let (assessment, source) = parse_response(reply);

        assert_eq!(source, InsightSource::Parsed);
        assert_eq!(assessment.wellness_score, 82.0);
        assert_eq!(assessment.recommendations, vec!["Walk more"]);
        assert!(assessment.positive_patterns.is_empty());
    }

    #[test]
    fn test_parse_falls_back_to_heuristics() {
        // ---
        let reply = "I recommend more sleep.\nThere is a RISK of dehydration.\nGood step count!\n{ truncated";
        let (assessment, source) = parse_response(reply);

        assert_eq!(source, InsightSource::Heuristic);
        assert_eq!(assessment.wellness_score, 75.0);
        assert_eq!(assessment.recommendations, vec!["I recommend more sleep."]);
        assert_eq!(assessment.risks, vec!["There is a RISK of dehydration."]);
        assert_eq!(assessment.positive_patterns, vec!["Good step count!"]);
    }

    #[test]
    fn test_fallback_assessment_rules() {
        // ---
        let poor: Summary = [(Metric::Steps, 4_000.0), (Metric::Sleep, 5.0), (Metric::HeartRate, 90.0)]
            .into_iter()
            .collect();
        let assessment = fallback_assessment(&poor);

        // 40 + 50 + 10
        assert_eq!(assessment.wellness_score, 100.0);
        assert_eq!(assessment.recommendations.len(), 3);

        let empty = fallback_assessment(&Summary::default());
        // 0 + 0 + 100
        assert_eq!(empty.wellness_score, 100.0);
        assert_eq!(empty.recommendations, vec!["Increase daily steps to 8,000+", "Aim for 7-9 hours of sleep"]);

        let racing: Summary = [(Metric::HeartRate, 220.0)].into_iter().collect();
        assert_eq!(fallback_assessment(&racing).wellness_score, 0.0);
    }

    #[tokio::test]
    async fn test_successful_reply_is_normalized() {
        // ---
        let reply = r#"{"wellness_score": 64, "recommendations": ["a", "b", "c", "d"], "risks": ["x", "y", "z"]}"#;
        let report = run(&agent(Arc::new(ScriptedCompletion::replying(reply)))).await;

        assert_eq!(report.status, InsightStatus::Success);
        assert_eq!(report.source, InsightSource::Parsed);
        assert!(report.error.is_none());
        assert_eq!(report.insights.len(), 5);
        assert_eq!(report.insights[0].kind, InsightKind::Recommendation);
        assert_eq!(report.insights[4].kind, InsightKind::Warning);
        assert_eq!(report.insights[4].priority, Priority::High);
    }

    #[tokio::test]
    async fn test_service_failure_never_raises() {
        // ---
        let report = run(&agent(Arc::new(FailingCompletion))).await;

        assert_eq!(report.status, InsightStatus::Error);
        assert_eq!(report.source, InsightSource::Fallback);
        assert!(report.error.as_deref().unwrap_or_default().contains("503"));
        assert!(!report.ai_powered());
        assert_eq!(report.assessment.summary, "Basic health assessment completed");
    }

    #[tokio::test]
    async fn test_timeout_feeds_fallback() {
        // ---
        let metrics = Arc::new(Metrics::default());
        let agent = InsightAgent::new(Arc::new(StalledCompletion), fast_policy(), metrics.clone());
        let report = run(&agent).await;

        assert_eq!(report.source, InsightSource::Fallback);
        assert_eq!(metrics.snapshot().fallbacks, 1);
    }
}
