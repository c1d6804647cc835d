//! Typed data models for the health analysis pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};

// ---

/// Wearable metrics tracked by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Steps,
    HeartRate,
    Sleep,
    Water,
}

impl Metric {
    /// All tracked metrics in reporting order.
    pub const ALL: [Metric; 4] = [Metric::Steps, Metric::HeartRate, Metric::Sleep, Metric::Water];

    pub fn as_str(self) -> &'static str {
        // ---
        match self {
            Metric::Steps => "steps",
            Metric::HeartRate => "heart_rate",
            Metric::Sleep => "sleep",
            Metric::Water => "water",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a metric name is not one of the tracked metrics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown metric '{0}'")]
pub struct UnknownMetric(pub String);

impl FromStr for Metric {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        match s.trim().to_ascii_lowercase().as_str() {
            "steps" => Ok(Metric::Steps),
            "heart_rate" | "heartrate" | "hr" => Ok(Metric::HeartRate),
            "sleep" => Ok(Metric::Sleep),
            "water" => Ok(Metric::Water),
            other => Err(UnknownMetric(other.to_string())),
        }
    }
}

/// Raw CSV row as uploaded by the client.
#[derive(Debug, Deserialize)]
pub struct RawHealthRow {
    // ---
    #[serde(alias = "date")]
    pub day: String,
    pub metric: String,
    pub value: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Why a raw row could not become a [`HealthRecord`].
#[derive(Debug, thiserror::Error)]
pub enum RowError {
    #[error(transparent)]
    Metric(#[from] UnknownMetric),

    #[error("invalid day '{0}', expected YYYY-MM-DD")]
    Day(String),

    #[error("invalid value '{0}' for {1}")]
    Value(String, Metric),
}

impl RowError {
    /// Unknown metrics are skipped on ingest instead of rejecting the file.
    pub fn is_skippable(&self) -> bool {
        matches!(self, RowError::Metric(_))
    }
}

/// One immutable observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    // ---
    pub day: NaiveDate,
    pub metric: Metric,
    pub value: f64,
}

impl HealthRecord {
    pub fn new(day: NaiveDate, metric: Metric, value: f64) -> Self {
        Self { day, metric, value }
    }
}

impl RawHealthRow {
    // ---
    pub fn to_record(&self) -> Result<HealthRecord, RowError> {
        // ---
        let metric: Metric = self.metric.parse()?;
        let day_text = self.day.trim();
        let day = NaiveDate::parse_from_str(day_text, "%Y-%m-%d")
            .map_err(|_| RowError::Day(day_text.to_string()))?;
        let value = self
            .value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| RowError::Value(self.value.clone(), metric))?;

        Ok(HealthRecord { day, metric, value })
    }
}

/// 7-day rolling averages keyed by metric. Metrics without observations are absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "BTreeMap<String, f64>")]
pub struct Summary(BTreeMap<Metric, f64>);

impl Summary {
    // ---
    pub fn insert(&mut self, metric: Metric, avg: f64) {
        self.0.insert(metric, avg);
    }

    /// Average for `metric`, reading absent metrics as 0.
    pub fn get(&self, metric: Metric) -> f64 {
        self.0.get(&metric).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, metric: Metric) -> bool {
        self.0.contains_key(&metric)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        self.0.iter().map(|(m, v)| (*m, *v))
    }

    pub fn steps(&self) -> f64 {
        self.get(Metric::Steps)
    }

    pub fn heart_rate(&self) -> f64 {
        self.get(Metric::HeartRate)
    }

    pub fn sleep(&self) -> f64 {
        self.get(Metric::Sleep)
    }

    pub fn water(&self) -> f64 {
        self.get(Metric::Water)
    }
}

impl FromIterator<(Metric, f64)> for Summary {
    fn from_iter<I: IntoIterator<Item = (Metric, f64)>>(iter: I) -> Self {
        Summary(iter.into_iter().collect())
    }
}

// Wire keys follow the `<metric>_avg_7d` convention the dashboard reads.
impl Serialize for Summary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // ---
        let keyed: BTreeMap<String, f64> = self
            .0
            .iter()
            .map(|(m, v)| (format!("{}_avg_7d", m.as_str()), *v))
            .collect();
        keyed.serialize(serializer)
    }
}

impl From<BTreeMap<String, f64>> for Summary {
    fn from(raw: BTreeMap<String, f64>) -> Self {
        // ---
        raw.into_iter()
            .filter_map(|(key, v)| {
                let name = key.strip_suffix("_avg_7d").unwrap_or(&key);
                name.parse::<Metric>().ok().map(|m| (m, v))
            })
            .collect()
    }
}

/// Direction of change between two observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increasing,
    Decreasing,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Increasing => "increasing",
            Direction::Decreasing => "decreasing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    // ---
    pub direction: Direction,
    pub change_percent: f64,
    pub recommendation: String,
}

pub type Trends = BTreeMap<Metric, TrendResult>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A single threshold finding produced by one analysis pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    // ---
    pub day: NaiveDate,
    pub metric: Metric,
    pub value: f64,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Recommendation,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Normalized insight, whether it came from the model or the rule-based fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    // ---
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub title: String,
    pub message: String,
    pub priority: Priority,
}

impl Insight {
    pub fn recommendation(title: &str, message: impl Into<String>, priority: Priority) -> Self {
        Self {
            kind: InsightKind::Recommendation,
            title: title.to_string(),
            message: message.into(),
            priority,
        }
    }

    pub fn warning(title: &str, message: impl Into<String>, priority: Priority) -> Self {
        Self {
            kind: InsightKind::Warning,
            title: title.to_string(),
            message: message.into(),
            priority,
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn raw(day: &str, metric: &str, value: &str) -> RawHealthRow {
        // ---
        RawHealthRow {
            day: day.to_string(),
            metric: metric.to_string(),
            value: value.to_string(),
            user_id: None,
        }
    }

    #[test]
    fn test_row_conversion() {
        // ---
        let record = raw("2024-01-02", "heart_rate", " 105 ").to_record().unwrap();

        assert_eq!(record.metric, Metric::HeartRate);
        assert_eq!(record.value, 105.0);
        assert_eq!(record.day, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }

    #[test]
    fn test_row_errors() {
        // ---
        let unknown = raw("2024-01-02", "calories", "10").to_record().unwrap_err();
        assert!(unknown.is_skippable());

        let bad_day = raw("02/01/2024", "steps", "10").to_record().unwrap_err();
        assert!(!bad_day.is_skippable());
        assert!(matches!(bad_day, RowError::Day(_)));

        let bad_value = raw("2024-01-02", "sleep", "lots").to_record().unwrap_err();
        assert!(matches!(bad_value, RowError::Value(_, Metric::Sleep)));

        let nan = raw("2024-01-02", "sleep", "NaN").to_record().unwrap_err();
        assert!(matches!(nan, RowError::Value(_, Metric::Sleep)));
    }

    #[test]
    fn test_summary_wire_format() {
        // ---
        let summary: Summary = [(Metric::Steps, 7500.0), (Metric::Sleep, 6.5)]
            .into_iter()
            .collect();

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["steps_avg_7d"], 7500.0);
        assert_eq!(json["sleep_avg_7d"], 6.5);
        assert!(json.get("water_avg_7d").is_none());

        let back: Summary = serde_json::from_value(json).unwrap();
        assert_eq!(back, summary);
        assert_eq!(back.water(), 0.0);
    }

    #[test]
    fn test_insight_serializes_type_tag() {
        // ---
        let insight = Insight::warning("Health Risk", "Elevated heart rate", Priority::High);
        let json = serde_json::to_value(&insight).unwrap();

        assert_eq!(json["type"], "warning");
        assert_eq!(json["priority"], "high");
    }
}
