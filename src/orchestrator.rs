//! Runs one full analysis pass over an uploaded snapshot.
//!
//! Stage order:
//! 1. summarize, then trend and anomaly detection as two independent tasks
//! 2. merge their outputs into the insight context
//! 3. insight agent, evaluator and wellness scorer joined together
//! 4. assemble the [`AnalysisReport`]
//!
//! Nothing is exposed until every stage has finished, so a report always
//! reflects a single snapshot.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use crate::analysis::{self, Evaluation};
use crate::insight::{InsightAgent, InsightContext, InsightReport};
use crate::memory::new_session_id;
use crate::models::{Anomaly, HealthRecord, Priority, Summary, Trends};

// ---

/// Combined output of every analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    // ---
    pub session_id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub summary: Summary,
    pub trends: Trends,
    pub anomalies: Vec<Anomaly>,
    pub insights: InsightReport,
    pub wellness_score: f64,
    pub evaluation: Evaluation,
    pub key_recommendations: Vec<String>,
}

#[derive(Clone)]
pub struct Orchestrator {
    agent: InsightAgent,
}

impl Orchestrator {
    // ---
    pub fn new(agent: InsightAgent) -> Self {
        Self { agent }
    }

    #[instrument(skip(self, records), fields(records = records.len()))]
    pub async fn analyze(&self, user_id: &str, records: Vec<HealthRecord>) -> AnalysisReport {
        // ---
        let summary = analysis::summarize(&records);
        let records: Arc<[HealthRecord]> = records.into();

        debug!("running trend and anomaly detection");
        let trend_task = {
            let records = Arc::clone(&records);
            tokio::spawn(async move { analysis::detect_trends(&records) })
        };
        let anomaly_task = {
            let records = Arc::clone(&records);
            tokio::spawn(async move { analysis::detect_anomalies(&records) })
        };
        let (trends, anomalies) = tokio::join!(
            join_or_empty("trend detection", trend_task),
            join_or_empty("anomaly detection", anomaly_task)
        );

        debug!(
            trends = trends.len(),
            anomalies = anomalies.len(),
            "detectors finished, generating insights"
        );
        let ctx = InsightContext {
            summary: &summary,
            trends: &trends,
            anomalies: &anomalies,
        };
        // The agent resolves every failure internally, so neither sibling is
        // ever cancelled by it.
        let (insights, evaluation, wellness_score) = tokio::join!(
            self.agent.generate(ctx),
            async { analysis::evaluate(&summary) },
            async { analysis::wellness_score(&summary) },
        );

        let key_recommendations = insights
            .insights
            .iter()
            .filter(|i| i.priority >= Priority::Medium)
            .map(|i| i.message.clone())
            .collect();

        let report = AnalysisReport {
            session_id: new_session_id(user_id),
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
            summary,
            trends,
            anomalies,
            insights,
            wellness_score,
            evaluation,
            key_recommendations,
        };

        info!(
            session_id = %report.session_id,
            wellness_score = report.wellness_score,
            ai_powered = report.insights.ai_powered(),
            "analysis complete"
        );
        report
    }
}

/// A detector that dies yields an empty result instead of failing the pass.
async fn join_or_empty<T: Default>(stage: &str, task: JoinHandle<T>) -> T {
    // ---
    match task.await {
        Ok(output) => output,
        Err(e) => {
            error!(stage, error = %e, "detector task failed, using empty result");
            T::default()
        }
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    //! Canned reports for tests outside this module.

    use super::*;
    use crate::insight::{fallback_assessment, InsightSource, InsightStatus};
    use crate::models::{Insight, Metric};

    pub fn report(user_id: &str) -> AnalysisReport {
        // ---
        let summary: Summary = [(Metric::Steps, 6_000.0), (Metric::Sleep, 6.0)].into_iter().collect();
        let assessment = fallback_assessment(&summary);
        AnalysisReport {
            session_id: new_session_id(user_id),
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
            wellness_score: analysis::wellness_score(&summary),
            evaluation: analysis::evaluate(&summary),
            insights: InsightReport {
                status: InsightStatus::Error,
                source: InsightSource::Fallback,
                insights: vec![Insight::recommendation(
                    "AI Recommendation",
                    "Increase daily steps to 8,000+",
                    Priority::Medium,
                )],
                assessment,
                error: Some("completion service is not configured".to_string()),
            },
            key_recommendations: vec!["Increase daily steps to 8,000+".to_string()],
            summary,
            trends: Trends::new(),
            anomalies: Vec::new(),
        }
    }
}
