use crate::models::{Anomaly, HealthRecord, Metric, Severity};

const HEART_RATE_HIGH_BPM: f64 = 100.0;
const SLEEP_LOW_HOURS: f64 = 5.0;
const STEPS_LOW: f64 = 3000.0;

/// Judge every record independently against fixed thresholds.
///
/// Output follows input order; each record triggers at most one finding.
pub fn detect_anomalies(records: &[HealthRecord]) -> Vec<Anomaly> {
    records.iter().filter_map(check).collect()
}

fn check(record: &HealthRecord) -> Option<Anomaly> {
    // ---
    let (severity, message) = match record.metric {
        Metric::HeartRate if record.value > HEART_RATE_HIGH_BPM => {
            (Severity::High, "Elevated resting heart rate detected")
        }
        Metric::Sleep if record.value < SLEEP_LOW_HOURS => (Severity::Medium, "Insufficient sleep duration"),
        Metric::Steps if record.value < STEPS_LOW => (Severity::Low, "Low daily activity level"),
        _ => return None,
    };

    Some(Anomaly {
        day: record.day,
        metric: record.metric,
        value: record.value,
        severity,
        message: message.to_string(),
    })
}
