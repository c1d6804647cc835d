use chrono::Duration;

use crate::models::{HealthRecord, Metric, Summary};

/// Width of the rolling window, in days, ending at the latest observed day.
pub const ROLLING_WINDOW_DAYS: i64 = 7;

/// Reduce a series of records to per-metric rolling averages.
///
/// Input order does not matter. Records older than the window (anchored at the
/// latest day in the whole upload) are ignored; metrics left without values
/// are omitted from the summary.
pub fn summarize(records: &[HealthRecord]) -> Summary {
    // ---
    let Some(latest) = records.iter().map(|r| r.day).max() else {
        return Summary::default();
    };
    let window_start = latest - Duration::days(ROLLING_WINDOW_DAYS - 1);

    Metric::ALL
        .iter()
        .filter_map(|&metric| {
            let (sum, count) = records
                .iter()
                .filter(|r| r.metric == metric && r.day >= window_start)
                .fold((0.0, 0usize), |(sum, n), r| (sum + r.value, n + 1));

            (count > 0).then(|| (metric, sum / count as f64))
        })
        .collect()
}
