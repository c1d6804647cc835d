use serde::{Deserialize, Serialize};

use crate::models::Summary;

/// Output of the rule-based evaluator agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    // ---
    pub wellness_score: u8,
    pub risks: Vec<String>,
}

/// Weighted scoring used as an independent second opinion next to the
/// insight agent. Weights: steps 40, sleep 40, heart rate 10, water 10.
pub fn evaluate(summary: &Summary) -> Evaluation {
    // ---
    let steps = summary.steps();
    let hr = summary.heart_rate();
    let sleep = summary.sleep();
    let water = summary.water();

    let mut score = 0.0;
    score += (steps / 10_000.0 * 40.0).min(100.0);
    score += (sleep / 8.0 * 40.0).min(40.0);
    score += ((100.0 - (hr - 70.0).abs()) / 100.0).max(0.0) * 10.0;
    // Water is read in litres here, so any millilitre reading saturates.
    score += (water / 2.5).min(1.0) * 10.0;

    let wellness_score = score.clamp(0.0, 100.0) as u8;

    let mut risks = Vec::new();
    if steps < 5_000.0 {
        risks.push("Low activity".to_string());
    }
    if hr > 100.0 {
        risks.push("Elevated heart rate".to_string());
    }
    if sleep < 6.0 {
        risks.push("Insufficient sleep".to_string());
    }

    Evaluation { wellness_score, risks }
}
