//! Adaptive thresholds replacing fixed cut-points.
//!
//! Each threshold drifts within `[min, max]` as performance feedback
//! arrives. Grades and deployment approvals consult the current values
//! instead of constants.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// One recorded threshold adjustment
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdAdjustment {
    pub timestamp: DateTime<Utc>,
    pub old_value: f64,
    pub new_value: f64,
    pub performance_delta: f64,
}

/// A numeric cut-point that drifts within fixed bounds
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveThreshold {
    pub id: String,
    pub name: String,
    pub base_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub current_value: f64,
    pub adaptation_rate: f64,
    pub sample_window: usize,
    pub sensitivity: f64,
    pub adjustment_history: Vec<ThresholdAdjustment>,
    pub last_adjusted: Option<DateTime<Utc>>,
}

impl AdaptiveThreshold {
    pub fn new(id: &str, name: &str, base: f64, min: f64, max: f64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            base_value: base,
            min_value: min,
            max_value: max,
            current_value: base,
            adaptation_rate: 0.1,
            sample_window: 100,
            sensitivity: 0.5,
            adjustment_history: Vec::new(),
            last_adjusted: None,
        }
    }

    /// Move the threshold toward observed performance, clamped to bounds.
    /// Returns the new current value.
    pub fn adapt(&mut self, performance_delta: f64) -> f64 {
        let adjustment = performance_delta * self.adaptation_rate * self.sensitivity;
        let new_value = (self.current_value + adjustment).clamp(self.min_value, self.max_value);

        let now = Utc::now();
        self.adjustment_history.push(ThresholdAdjustment {
            timestamp: now,
            old_value: self.current_value,
            new_value,
            performance_delta,
        });
        if self.adjustment_history.len() > self.sample_window {
            let drop = self.adjustment_history.len() - self.sample_window;
            self.adjustment_history.drain(..drop);
        }

        self.current_value = new_value;
        self.last_adjusted = Some(now);
        new_value
    }

    pub fn reset(&mut self) {
        self.current_value = self.base_value;
        self.adjustment_history.clear();
        self.last_adjusted = None;
    }
}

/// Letter grade derived from adaptive grade thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

/// Deployment verdict based on the adaptive approval threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentDecision {
    Approved,
    NeedsReview,
    Rejected,
}

/// Catalog of adaptive thresholds with grading and deployment policies
pub struct AdaptiveScorer {
    thresholds: HashMap<String, AdaptiveThreshold>,
}

impl AdaptiveScorer {
    /// Ids of the built-in thresholds
    pub const GRADE_A: &'static str = "grade_a";
    pub const GRADE_B: &'static str = "grade_b";
    pub const GRADE_C: &'static str = "grade_c";
    pub const PASS: &'static str = "pass_threshold";
    pub const DEPLOYMENT: &'static str = "deployment_approved";
    pub const QUALITY_MINIMUM: &'static str = "quality_minimum";

    pub fn new(adaptation_rate: f64, sensitivity: f64, sample_window: usize) -> Self {
        let defaults = [
            (Self::GRADE_A, "Grade A Threshold", 0.90, 0.85, 0.95),
            (Self::GRADE_B, "Grade B Threshold", 0.80, 0.75, 0.85),
            (Self::GRADE_C, "Grade C Threshold", 0.70, 0.65, 0.75),
            (Self::PASS, "Pass Threshold", 0.60, 0.50, 0.70),
            (Self::DEPLOYMENT, "Deployment Approved Threshold", 0.80, 0.75, 0.90),
            (Self::QUALITY_MINIMUM, "Quality Minimum Threshold", 0.70, 0.60, 0.80),
        ];

        let thresholds = defaults
            .into_iter()
            .map(|(id, name, base, min, max)| {
                let mut threshold = AdaptiveThreshold::new(id, name, base, min, max);
                threshold.adaptation_rate = adaptation_rate;
                threshold.sensitivity = sensitivity;
                threshold.sample_window = sample_window;
                (id.to_string(), threshold)
            })
            .collect();

        Self { thresholds }
    }

    pub fn get(&self, threshold_id: &str) -> Option<&AdaptiveThreshold> {
        self.thresholds.get(threshold_id)
    }

    /// Current value, or 0.5 for an unknown id
    pub fn value(&self, threshold_id: &str) -> f64 {
        self.thresholds
            .get(threshold_id)
            .map(|t| t.current_value)
            .unwrap_or(0.5)
    }

    /// Whether a score clears the named threshold's current value
    pub fn evaluate(&self, threshold_id: &str, score: f64) -> bool {
        score >= self.value(threshold_id)
    }

    /// Feed performance back into one threshold
    pub fn adapt(&mut self, threshold_id: &str, performance_delta: f64) -> Option<f64> {
        self.thresholds
            .get_mut(threshold_id)
            .map(|t| t.adapt(performance_delta))
    }

    /// Letter grade against the adaptive grade ladder
    pub fn grade(&self, score: f64) -> Grade {
        if score >= self.value(Self::GRADE_A) {
            Grade::A
        } else if score >= self.value(Self::GRADE_B) {
            Grade::B
        } else if score >= self.value(Self::GRADE_C) {
            Grade::C
        } else if score >= self.value(Self::PASS) {
            Grade::D
        } else {
            Grade::F
        }
    }

    /// Deployment verdict for a quality score
    pub fn deployment_decision(&self, score: f64) -> DeploymentDecision {
        if score >= self.value(Self::DEPLOYMENT) {
            DeploymentDecision::Approved
        } else if score >= self.value(Self::QUALITY_MINIMUM) {
            DeploymentDecision::NeedsReview
        } else {
            DeploymentDecision::Rejected
        }
    }

    pub fn set_value(&mut self, threshold_id: &str, value: f64) -> bool {
        match self.thresholds.get_mut(threshold_id) {
            Some(threshold) => {
                threshold.current_value = value.clamp(threshold.min_value, threshold.max_value);
                true
            }
            None => false,
        }
    }

    pub fn reset(&mut self, threshold_id: Option<&str>) {
        match threshold_id {
            Some(id) => {
                if let Some(threshold) = self.thresholds.get_mut(id) {
                    threshold.reset();
                }
            }
            None => {
                for threshold in self.thresholds.values_mut() {
                    threshold.reset();
                }
            }
        }
    }

    pub fn all(&self) -> Vec<&AdaptiveThreshold> {
        self.thresholds.values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> AdaptiveScorer {
        AdaptiveScorer::new(0.1, 0.5, 100)
    }

    #[test]
    fn test_defaults_loaded() {
        let scorer = scorer();
        assert_eq!(scorer.value(AdaptiveScorer::GRADE_A), 0.90);
        assert_eq!(scorer.value(AdaptiveScorer::PASS), 0.60);
        assert_eq!(scorer.value("unknown"), 0.5);
        assert_eq!(scorer.all().len(), 6);
    }

    #[test]
    fn test_adapt_stays_within_bounds() {
        let mut scorer = scorer();
        // Push hard in both directions; current must stay in [min, max]
        for _ in 0..100 {
            scorer.adapt(AdaptiveScorer::GRADE_A, 1.0);
        }
        assert!(scorer.value(AdaptiveScorer::GRADE_A) <= 0.95);

        for _ in 0..200 {
            scorer.adapt(AdaptiveScorer::GRADE_A, -1.0);
        }
        assert!(scorer.value(AdaptiveScorer::GRADE_A) >= 0.85);
    }

    #[test]
    fn test_adapt_direction_and_history() {
        let mut scorer = scorer();
        let before = scorer.value(AdaptiveScorer::PASS);
        let after = scorer.adapt(AdaptiveScorer::PASS, 0.4).unwrap();
        assert!(after > before);

        let threshold = scorer.get(AdaptiveScorer::PASS).unwrap();
        assert_eq!(threshold.adjustment_history.len(), 1);
        assert_eq!(threshold.adjustment_history[0].old_value, before);
        assert!(threshold.last_adjusted.is_some());

        assert!(scorer.adapt("unknown", 0.1).is_none());
    }

    #[test]
    fn test_grading_ladder() {
        let scorer = scorer();
        assert_eq!(scorer.grade(0.95), Grade::A);
        assert_eq!(scorer.grade(0.82), Grade::B);
        assert_eq!(scorer.grade(0.72), Grade::C);
        assert_eq!(scorer.grade(0.65), Grade::D);
        assert_eq!(scorer.grade(0.40), Grade::F);
    }

    #[test]
    fn test_deployment_decisions() {
        let scorer = scorer();
        assert_eq!(scorer.deployment_decision(0.85), DeploymentDecision::Approved);
        assert_eq!(scorer.deployment_decision(0.75), DeploymentDecision::NeedsReview);
        assert_eq!(scorer.deployment_decision(0.50), DeploymentDecision::Rejected);
    }

    #[test]
    fn test_set_and_reset() {
        let mut scorer = scorer();
        assert!(scorer.set_value(AdaptiveScorer::GRADE_A, 0.99));
        // Clamped to max
        assert_eq!(scorer.value(AdaptiveScorer::GRADE_A), 0.95);

        scorer.reset(Some(AdaptiveScorer::GRADE_A));
        assert_eq!(scorer.value(AdaptiveScorer::GRADE_A), 0.90);
        assert!(!scorer.set_value("unknown", 0.5));
    }
}
