//! Rule-based analysis stages.
//!
//! Every stage here is a pure function of one uploaded snapshot: no I/O, no
//! clock, no randomness. The orchestrator combines them with the LLM-backed
//! insight agent.

mod anomalies;
mod evaluator;
mod summarizer;
mod trends;
mod wellness;

pub use anomalies::detect_anomalies;
pub use evaluator::{evaluate, Evaluation};
pub use summarizer::{summarize, ROLLING_WINDOW_DAYS};
pub use trends::detect_trends;
pub use wellness::wellness_score;

/// Round to `places` decimal places.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    // ---
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
