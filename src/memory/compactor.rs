use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Session;
use crate::analysis::round_to;
use crate::models::{Direction, Metric};

/// Number of recent sessions folded into a compacted context.
pub const DEFAULT_COMPACT_SIZE: usize = 5;

/// Relative change below which a metric counts as stable.
const STABILITY_BAND: f64 = 0.1;

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stability {
    Stable,
    Variable,
}

/// Movement of one metric's rolling average between the oldest and newest
/// compacted sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricMovement {
    pub direction: Direction,
    pub stability: Stability,
}

/// Several sessions folded into a small prompt-sized context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompactContext {
    // ---
    pub session_count: usize,
    pub avg_wellness_score: f64,
    pub trend_analysis: BTreeMap<Metric, MetricMovement>,
    pub common_recommendations: Vec<String>,
    pub last_session: Option<DateTime<Utc>>,
}

/// Compact the `max_size` most recent sessions. Input order does not matter.
pub fn compact_sessions(sessions: &[Session], max_size: usize) -> CompactContext {
    // ---
    let mut recent: Vec<&Session> = sessions.iter().collect();
    recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    recent.truncate(max_size);

    if recent.is_empty() {
        return CompactContext::default();
    }

    let avg = recent.iter().map(|s| s.wellness_score).sum::<f64>() / recent.len() as f64;

    let mut common_recommendations: Vec<String> = Vec::new();
    for rec in recent.iter().flat_map(|s| s.recommendations.iter()) {
        if !common_recommendations.contains(rec) {
            common_recommendations.push(rec.clone());
        }
    }

    let trend_analysis = Metric::ALL
        .iter()
        .filter_map(|&metric| {
            let values: Vec<f64> = recent
                .iter()
                .filter(|s| s.data_summary.contains(metric))
                .map(|s| s.data_summary.get(metric))
                .collect();
            movement(&values).map(|m| (metric, m))
        })
        .collect();

    CompactContext {
        session_count: recent.len(),
        avg_wellness_score: round_to(avg, 1),
        trend_analysis,
        common_recommendations,
        last_session: recent.first().map(|s| s.timestamp),
    }
}

/// `values` are newest first.
fn movement(values: &[f64]) -> Option<MetricMovement> {
    // ---
    let (&newest, &oldest) = (values.first()?, values.last()?);
    if values.len() < 2 {
        return None;
    }

    let direction = if newest > oldest {
        Direction::Increasing
    } else {
        Direction::Decreasing
    };
    let stability = if (newest - oldest).abs() < oldest.abs() * STABILITY_BAND {
        Stability::Stable
    } else {
        Stability::Variable
    };

    Some(MetricMovement { direction, stability })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::memory::AnalysisResults;
    use crate::models::Summary;
    use chrono::Duration;

    fn session(age_days: i64, score: f64, steps: f64, recs: &[&str]) -> Session {
        // ---
        Session {
            session_id: format!("s{age_days}"),
            user_id: "u".to_string(),
            timestamp: Utc::now() - Duration::days(age_days),
            data_summary: [(Metric::Steps, steps)].into_iter().collect::<Summary>(),
            analysis_results: AnalysisResults::default(),
            wellness_score: score,
            recommendations: recs.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn test_empty_history() {
        assert_eq!(compact_sessions(&[], DEFAULT_COMPACT_SIZE), CompactContext::default());
    }

    #[test]
    fn test_compacts_recent_sessions() {
        // ---
        let sessions = vec![
            session(3, 60.0, 5_000.0, &["Walk more"]),
            session(1, 80.0, 9_000.0, &["Walk more", "Hydrate"]),
            session(2, 70.0, 7_000.0, &[]),
        ];

        let ctx = compact_sessions(&sessions, DEFAULT_COMPACT_SIZE);
        assert_eq!(ctx.session_count, 3);
        assert_eq!(ctx.avg_wellness_score, 70.0);
        assert_eq!(ctx.common_recommendations, vec!["Walk more", "Hydrate"]);
        assert_eq!(ctx.last_session, Some(sessions[1].timestamp));

        let steps = &ctx.trend_analysis[&Metric::Steps];
        assert_eq!(steps.direction, Direction::Increasing);
        assert_eq!(steps.stability, Stability::Variable);
    }

    #[test]
    fn test_keeps_only_most_recent() {
        // ---
        let sessions: Vec<Session> = (0..8).map(|d| session(d, d as f64 * 10.0, 8_000.0, &[])).collect();

        let ctx = compact_sessions(&sessions, 2);
        assert_eq!(ctx.session_count, 2);
        assert_eq!(ctx.avg_wellness_score, 5.0);
        assert_eq!(ctx.trend_analysis[&Metric::Steps].stability, Stability::Stable);
    }

    #[test]
    fn test_single_value_has_no_movement() {
        assert!(movement(&[1.0]).is_none());
        assert!(movement(&[]).is_none());
    }
}
