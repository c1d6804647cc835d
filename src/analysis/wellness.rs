use crate::models::Summary;

use super::round_to;

const SUB_SCORE_MAX: f64 = 25.0;

/// Composite 0–100 score: the sum of four sub-scores, each in [0, 25].
///
/// Pure function of the summary, rounded to one decimal.
pub fn wellness_score(summary: &Summary) -> f64 {
    // ---
    let total = steps_score(summary.steps())
        + sleep_score(summary.sleep())
        + heart_rate_score(summary.heart_rate())
        + water_score(summary.water());

    round_to(total.clamp(0.0, 100.0), 1)
}

fn clamp_sub(score: f64) -> f64 {
    score.clamp(0.0, SUB_SCORE_MAX)
}

fn steps_score(steps: f64) -> f64 {
    // ---
    clamp_sub(if steps >= 10_000.0 {
        25.0
    } else if steps >= 8_000.0 {
        20.0
    } else if steps >= 5_000.0 {
        15.0
    } else {
        steps / 500.0
    })
}

fn sleep_score(hours: f64) -> f64 {
    // ---
    clamp_sub(if (7.0..=9.0).contains(&hours) {
        25.0
    } else if (6.0..7.0).contains(&hours) || (hours > 9.0 && hours <= 10.0) {
        20.0
    } else {
        25.0 - (hours - 8.0).abs() * 5.0
    })
}

fn heart_rate_score(bpm: f64) -> f64 {
    // ---
    clamp_sub(if (60.0..=80.0).contains(&bpm) {
        25.0
    } else if (50.0..60.0).contains(&bpm) || (bpm > 80.0 && bpm <= 90.0) {
        20.0
    } else {
        25.0 - (bpm - 70.0).abs() * 2.0
    })
}

fn water_score(ml: f64) -> f64 {
    // ---
    clamp_sub(if ml >= 2_000.0 {
        25.0
    } else if ml >= 1_500.0 {
        20.0
    } else {
        ml / 100.0
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::Metric;

    fn summary(steps: f64, sleep: f64, hr: f64, water: f64) -> Summary {
        // ---
        [
            (Metric::Steps, steps),
            (Metric::Sleep, sleep),
            (Metric::HeartRate, hr),
            (Metric::Water, water),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_ideal_values_score_100() {
        assert_eq!(wellness_score(&summary(10_000.0, 8.0, 70.0, 2_000.0)), 100.0);
    }

    #[test]
    fn test_zero_values_use_floors() {
        // ---
        let zero = summary(0.0, 0.0, 0.0, 0.0);
        let first = wellness_score(&zero);
        assert_eq!(first, 0.0);
        assert_eq!(first.to_bits(), wellness_score(&zero).to_bits());

        assert_eq!(wellness_score(&Summary::default()), 0.0);
    }

    #[test]
    fn test_piecewise_breakpoints() {
        // ---
        assert_eq!(steps_score(8_000.0), 20.0);
        assert_eq!(steps_score(5_000.0), 15.0);
        assert_eq!(steps_score(2_500.0), 5.0);

        assert_eq!(sleep_score(6.5), 20.0);
        assert_eq!(sleep_score(10.0), 20.0);
        assert_eq!(sleep_score(5.0), 10.0);
        assert_eq!(sleep_score(12.0), 5.0);

        assert_eq!(heart_rate_score(55.0), 20.0);
        assert_eq!(heart_rate_score(90.0), 20.0);
        assert_eq!(heart_rate_score(100.0), 0.0);
        assert_eq!(heart_rate_score(45.0), 0.0);

        assert_eq!(water_score(1_500.0), 20.0);
        assert_eq!(water_score(800.0), 8.0);
    }

    #[test]
    fn test_score_stays_in_range() {
        // ---
        let inputs = [
            (0.0, 0.0, 0.0, 0.0),
            (50_000.0, 24.0, 220.0, 10_000.0),
            (7_500.0, 6.5, 75.0, 1_800.0),
            (-100.0, -3.0, -10.0, -500.0),
        ];

        for (steps, sleep, hr, water) in inputs {
            let score = wellness_score(&summary(steps, sleep, hr, water));
            assert!((0.0..=100.0).contains(&score), "score {score} out of range");
        }
    }

    #[test]
    fn test_mixed_summary() {
        // steps 15 + sleep 20 + hr 25 + water 20
        assert_eq!(wellness_score(&summary(7_500.0, 6.5, 75.0, 1_800.0)), 80.0);
    }
}
