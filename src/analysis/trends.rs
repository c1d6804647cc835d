use crate::models::{Direction, HealthRecord, Metric, TrendResult, Trends};

use super::round_to;

/// Change (in percent) above which heart-rate movement is worth flagging.
const SIGNIFICANT_CHANGE_PERCENT: f64 = 10.0;

/// First-vs-last comparison per metric.
///
/// Records are ordered chronologically per metric (stable for same-day
/// records). A metric needs at least two observations to appear.
pub fn detect_trends(records: &[HealthRecord]) -> Trends {
    // ---
    let mut trends = Trends::new();

    for metric in Metric::ALL {
        let mut series: Vec<&HealthRecord> = records.iter().filter(|r| r.metric == metric).collect();
        if series.len() < 2 {
            continue;
        }
        series.sort_by_key(|r| r.day);

        let first = series[0].value;
        let last = series[series.len() - 1].value;

        // Ties resolve to decreasing.
        let direction = if last > first {
            Direction::Increasing
        } else {
            Direction::Decreasing
        };
        let change_percent = if first == 0.0 {
            0.0
        } else {
            round_to((last - first) / first * 100.0, 2)
        };

        trends.insert(
            metric,
            TrendResult {
                direction,
                change_percent,
                recommendation: recommendation_for(metric, direction, change_percent).to_string(),
            },
        );
    }

    trends
}

fn recommendation_for(metric: Metric, direction: Direction, change_percent: f64) -> &'static str {
    // ---
    let significant = change_percent.abs() > SIGNIFICANT_CHANGE_PERCENT;
    match (metric, direction, significant) {
        (Metric::Steps, Direction::Decreasing, _) => "Consider increasing daily physical activity",
        (Metric::Sleep, Direction::Decreasing, _) => "Focus on improving sleep hygiene",
        (Metric::HeartRate, _, true) => "Monitor heart rate patterns closely",
        _ => "Maintain current healthy patterns",
    }
}
