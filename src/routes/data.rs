use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::Serialize;

use crate::analysis::Evaluation;
use crate::error::ApiError;
use crate::insight::InsightReport;
use crate::state::StoredDataset;
use crate::{Anomaly, AppState, HealthRecord, Metric, Summary, Trends};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/data/{data_id}/summary", get(summary))
        .route("/data/{data_id}/trends", get(trends))
        .route("/data/{data_id}/anomalies", get(anomalies))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Point {
    day: NaiveDate,
    value: f64,
}

type Timeseries = BTreeMap<Metric, Vec<Point>>;

/// Per-metric observations in chronological order.
fn timeseries(records: &[HealthRecord]) -> Timeseries {
    // ---
    let mut series = Timeseries::new();
    for r in records {
        series.entry(r.metric).or_default().push(Point {
            day: r.day,
            value: r.value,
        });
    }
    for points in series.values_mut() {
        points.sort_by_key(|p| p.day);
    }
    series
}

#[derive(Serialize)]
struct SummaryResponse {
    data_id: String,
    user_id: String,
    filename: Option<String>,
    session_id: String,
    summary: Summary,
    trends: Trends,
    anomalies: Vec<Anomaly>,
    timeseries: Timeseries,
    insights: InsightReport,
    wellness_score: f64,
    evaluation: Evaluation,
    key_recommendations: Vec<String>,
}

#[derive(Serialize)]
struct TrendsResponse {
    trends: Trends,
    timeseries: Timeseries,
}

async fn load(state: &AppState, data_id: &str) -> Result<StoredDataset, ApiError> {
    state
        .dataset(data_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("data id '{data_id}' not found")))
}

async fn summary(State(state): State<AppState>, Path(data_id): Path<String>) -> Result<Json<SummaryResponse>, ApiError> {
    // ---
    let dataset = load(&state, &data_id).await?;
    let timeseries = timeseries(&dataset.records);
    let report = dataset.report;

    Ok(Json(SummaryResponse {
        data_id,
        user_id: dataset.user_id,
        filename: dataset.filename,
        session_id: report.session_id,
        summary: report.summary,
        trends: report.trends,
        anomalies: report.anomalies,
        timeseries,
        insights: report.insights,
        wellness_score: report.wellness_score,
        evaluation: report.evaluation,
        key_recommendations: report.key_recommendations,
    }))
}

async fn trends(State(state): State<AppState>, Path(data_id): Path<String>) -> Result<Json<TrendsResponse>, ApiError> {
    // ---
    let dataset = load(&state, &data_id).await?;
    Ok(Json(TrendsResponse {
        timeseries: timeseries(&dataset.records),
        trends: dataset.report.trends,
    }))
}

async fn anomalies(State(state): State<AppState>, Path(data_id): Path<String>) -> Result<Json<Vec<Anomaly>>, ApiError> {
    // ---
    let dataset = load(&state, &data_id).await?;
    Ok(Json(dataset.report.anomalies))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_timeseries_is_chronological() {
        // ---
        let d = |n| NaiveDate::from_ymd_opt(2024, 1, n).unwrap();
        let records = vec![
            HealthRecord::new(d(3), Metric::Steps, 3.0),
            HealthRecord::new(d(1), Metric::Steps, 1.0),
            HealthRecord::new(d(2), Metric::Sleep, 7.0),
        ];

        let series = timeseries(&records);
        let steps: Vec<f64> = series[&Metric::Steps].iter().map(|p| p.value).collect();
        assert_eq!(steps, vec![1.0, 3.0]);
        assert_eq!(series[&Metric::Sleep].len(), 1);
        assert!(!series.contains_key(&Metric::Water));
    }
}
