//! Session and long-term memory.
//!
//! Active sessions live in an in-memory [`SessionStore`]; `finalize` copies a
//! session into the SQLite-backed [`MemoryBank`], records its trends and
//! re-derives the user's wellness pattern. Finalizing does not evict the
//! active entry; the TTL sweep does that later.

mod bank;
mod compactor;
mod session_store;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

pub use bank::{MemoryBank, UserPattern};
pub use compactor::{compact_sessions, CompactContext, DEFAULT_COMPACT_SIZE};
pub use session_store::SessionStore;

use crate::analysis::{round_to, Evaluation};
use crate::insight::InsightReport;
use crate::models::{Anomaly, Summary, Trends};
use crate::orchestrator::AnalysisReport;

/// Look-back window for wellness pattern detection.
const PATTERN_WINDOW_DAYS: i64 = 14;
/// Minimum finalized sessions before a pattern is derived.
const PATTERN_MIN_SESSIONS: usize = 3;
const PATTERN_CONFIDENCE: f64 = 0.8;
/// Score spread under which a user counts as consistent.
const CONSISTENCY_SPREAD: f64 = 10.0;

pub const WELLNESS_TREND_PATTERN: &str = "wellness_trend";

// ---

/// Time-derived, collision-free session id: `<user>_<YYYYmmdd_HHMMSS>_<8 hex>`.
pub fn new_session_id(user_id: &str) -> String {
    // ---
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{user_id}_{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), &suffix[..8])
}

/// Analysis outputs kept with a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResults {
    // ---
    pub trends: Trends,
    pub anomalies: Vec<Anomaly>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insights: Option<InsightReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
}

/// One completed analysis pass tied to a user. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    // ---
    pub session_id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub data_summary: Summary,
    pub analysis_results: AnalysisResults,
    pub wellness_score: f64,
    pub recommendations: Vec<String>,
}

impl Session {
    pub fn from_report(report: &AnalysisReport) -> Self {
        // ---
        Self {
            session_id: report.session_id.clone(),
            user_id: report.user_id.clone(),
            timestamp: report.timestamp,
            data_summary: report.summary.clone(),
            analysis_results: AnalysisResults {
                trends: report.trends.clone(),
                anomalies: report.anomalies.clone(),
                insights: Some(report.insights.clone()),
                evaluation: Some(report.evaluation.clone()),
            },
            wellness_score: report.wellness_score,
            recommendations: report.key_recommendations.clone(),
        }
    }
}

/// Inputs for [`SessionStore::create`].
#[derive(Debug, Clone)]
pub struct SessionData {
    pub summary: Summary,
    pub analysis: AnalysisResults,
    pub wellness_score: f64,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WellnessDirection {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    High,
    Variable,
}

/// Payload of the `wellness_trend` pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellnessTrend {
    pub average_score: f64,
    pub trend: WellnessDirection,
    pub consistency: Consistency,
    pub sessions: usize,
}

/// Derive the wellness trend from sessions ordered newest first.
pub fn wellness_trend(history: &[Session]) -> Option<WellnessTrend> {
    // ---
    if history.len() < PATTERN_MIN_SESSIONS {
        return None;
    }
    let scores: Vec<f64> = history.iter().map(|s| s.wellness_score).collect();
    let newest = scores[0];
    let oldest = scores[scores.len() - 1];

    let trend = if newest > oldest {
        WellnessDirection::Improving
    } else if newest < oldest {
        WellnessDirection::Declining
    } else {
        WellnessDirection::Stable
    };

    let max = scores.iter().copied().fold(f64::MIN, f64::max);
    let min = scores.iter().copied().fold(f64::MAX, f64::min);
    let consistency = if max - min < CONSISTENCY_SPREAD {
        Consistency::High
    } else {
        Consistency::Variable
    };

    Some(WellnessTrend {
        average_score: round_to(scores.iter().sum::<f64>() / scores.len() as f64, 1),
        trend,
        consistency,
        sessions: scores.len(),
    })
}

/// Active sessions plus durable memory behind one facade.
#[derive(Debug, Clone)]
pub struct HealthMemory {
    sessions: Arc<SessionStore>,
    bank: MemoryBank,
}

impl HealthMemory {
    // ---
    pub fn new(sessions: Arc<SessionStore>, bank: MemoryBank) -> Self {
        Self { sessions, bank }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn bank(&self) -> &MemoryBank {
        &self.bank
    }

    /// Register a report as an active session, attaching the user's compacted
    /// history and stored patterns to its context.
    #[instrument(skip(self, report), fields(session_id = %report.session_id))]
    pub async fn open_session(&self, report: &AnalysisReport, history_days: i64) -> Result<String> {
        // ---
        let history = self.history(&report.user_id, history_days).await?;
        let patterns = self.bank.get_patterns(&report.user_id).await?;

        let session_id = self.sessions.insert(Session::from_report(report)).await;

        let mut context = serde_json::Map::new();
        context.insert(
            "historical_context".to_string(),
            serde_json::to_value(compact_sessions(&history, DEFAULT_COMPACT_SIZE))?,
        );
        context.insert("user_patterns".to_string(), serde_json::to_value(patterns)?);
        self.sessions.update_state(&session_id, context).await;

        Ok(session_id)
    }

    /// Persist an active session. Returns `Ok(false)` for unknown ids.
    ///
    /// The session row and its trend rows commit together. The wellness-trend
    /// pattern is derived afterwards in its own write; if that step fails the
    /// session is still stored, and the next finalize for the user recomputes
    /// the pattern from history. Safe to repeat: rows are replaced, not duplicated.
    #[instrument(skip(self))]
    pub async fn finalize(&self, session_id: &str) -> Result<bool> {
        // ---
        let Some(session) = self.sessions.get(session_id).await else {
            return Ok(false);
        };

        self.bank.store_session(&session).await?;
        self.identify_patterns(&session.user_id).await?;

        info!(user_id = %session.user_id, "session finalized");
        Ok(true)
    }

    /// Finalized sessions from the last `days` days, newest first.
    pub async fn history(&self, user_id: &str, days: i64) -> Result<Vec<Session>> {
        // ---
        let since = Duration::try_days(days)
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or_else(|| anyhow!("history window of {days} days is out of range"))?;
        self.bank.get_history(user_id, since).await
    }

    async fn identify_patterns(&self, user_id: &str) -> Result<Option<UserPattern>> {
        // ---
        let recent = self.history(user_id, PATTERN_WINDOW_DAYS).await?;
        let Some(trend) = wellness_trend(&recent) else {
            return Ok(None);
        };

        let pattern = UserPattern {
            user_id: user_id.to_string(),
            pattern_type: WELLNESS_TREND_PATTERN.to_string(),
            pattern_data: json!(trend),
            confidence: PATTERN_CONFIDENCE,
            last_updated: Utc::now(),
        };
        self.bank.upsert_pattern(&pattern).await?;
        Ok(Some(pattern))
    }
}
