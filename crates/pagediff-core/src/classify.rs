//! Threshold classification of similarity scores.
//!
//! Thresholds are human-chosen percentages (95, 99, 99.5), so the
//! comparison is made in percentage space: `score * 100 >= threshold`.

use crate::types::PageStatus;

/// Whether `similarity` (in `[0, 1]`) meets `threshold_pct` (in
/// `[0, 100]`).
///
/// A threshold of `0` always passes; `100` requires a perfect
/// structural match.
#[must_use]
pub fn passes(similarity: f64, threshold_pct: f64) -> bool {
    similarity * 100.0 >= threshold_pct
}

/// [`PageStatus::Pass`] or [`PageStatus::Fail`] for a scored page.
#[must_use]
pub fn classify(similarity: f64, threshold_pct: f64) -> PageStatus {
    if passes(similarity, threshold_pct) {
        PageStatus::Pass
    } else {
        PageStatus::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_threshold_passes() {
        assert_eq!(classify(0.95, 95.0), PageStatus::Pass);
        assert_eq!(classify(0.99, 99.0), PageStatus::Pass);
    }

    #[test]
    fn below_threshold_fails() {
        assert_eq!(classify(0.9499, 95.0), PageStatus::Fail);
    }

    #[test]
    fn perfect_score_meets_hundred() {
        assert_eq!(classify(1.0, 100.0), PageStatus::Pass);
        assert_eq!(classify(0.999_999, 100.0), PageStatus::Fail);
    }

    #[test]
    fn zero_threshold_always_passes() {
        assert_eq!(classify(0.0, 0.0), PageStatus::Pass);
        assert_eq!(classify(0.3, 0.0), PageStatus::Pass);
    }

    #[test]
    fn raising_threshold_never_turns_fail_into_pass() {
        let scores = [0.0, 0.25, 0.9, 0.95, 0.9974, 0.9999, 1.0];
        for &s in &scores {
            let mut previous_passed = true;
            for step in 0..=1000 {
                let threshold = f64::from(step) / 10.0;
                let passed = passes(s, threshold);
                assert!(
                    previous_passed || !passed,
                    "score {s} went FAIL -> PASS at threshold {threshold}",
                );
                previous_passed = passed;
            }
        }
    }
}
