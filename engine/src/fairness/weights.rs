//! Fairness-adjusted scoring weights.
//!
//! Over-represented workers get their factor weights pulled down, under-
//! represented workers up, within a bounded adjustment range. The
//! service-wide fairness score is `1 - |Gini|` of the assignment
//! distribution.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::FairnessConfig;

/// One adjusted weight, with why and by how much
#[derive(Debug, Clone, PartialEq)]
pub struct FairnessWeight {
    pub worker_id: String,
    pub factor_name: String,
    pub original_weight: f64,
    pub adjusted_weight: f64,
    pub adjustment_reason: String,
    pub effective_from: DateTime<Utc>,
}

impl FairnessWeight {
    pub fn adjustment_delta(&self) -> f64 {
        self.adjusted_weight - self.original_weight
    }
}

/// Computes per-worker weight adjustments from assignment and quality
/// history.
pub struct FairnessWeightCalculator {
    config: FairnessConfig,
    assignment_counts: HashMap<String, u64>,
    quality_scores: HashMap<String, Vec<f64>>,
    active_weights: HashMap<String, FairnessWeight>,
}

impl FairnessWeightCalculator {
    pub fn new(config: FairnessConfig) -> Self {
        Self {
            config,
            assignment_counts: HashMap::new(),
            quality_scores: HashMap::new(),
            active_weights: HashMap::new(),
        }
    }

    pub fn record_assignment(&mut self, worker_id: &str) {
        *self.assignment_counts.entry(worker_id.to_string()).or_insert(0) += 1;
    }

    pub fn record_quality(&mut self, worker_id: &str, score: f64) {
        let scores = self.quality_scores.entry(worker_id.to_string()).or_default();
        scores.push(score);
        let cap = self.config.max_quality_samples;
        if scores.len() > cap {
            let drop = scores.len() - cap;
            scores.drain(..drop);
        }
    }

    /// Fairness-adjusted weight for one scoring factor of one worker
    pub fn calculate(&mut self, worker_id: &str, factor_name: &str, original_weight: f64) -> FairnessWeight {
        let adjustment = self.adjustment_for(worker_id);
        let adjusted = (original_weight * (1.0 + adjustment)).clamp(0.0, 1.0);

        let reason = if adjustment.abs() < 0.01 {
            "No significant adjustment needed".to_string()
        } else if adjustment < 0.0 {
            let share = self.share_of(worker_id);
            format!("Reducing weight due to over-assignment ({:.1}% of tasks)", share * 100.0)
        } else {
            "Increasing weight to improve assignment fairness".to_string()
        };

        let weight = FairnessWeight {
            worker_id: worker_id.to_string(),
            factor_name: factor_name.to_string(),
            original_weight,
            adjusted_weight: adjusted,
            adjustment_reason: reason,
            effective_from: Utc::now(),
        };

        tracing::debug!(
            worker = %worker_id,
            factor = %factor_name,
            original = original_weight,
            adjusted = adjusted,
            "Fairness weight computed"
        );

        self.active_weights
            .insert(format!("{worker_id}:{factor_name}"), weight.clone());
        weight
    }

    /// Adjust a whole factor map for one worker
    pub fn adjusted_weights(&mut self, worker_id: &str, weights: &HashMap<String, f64>) -> HashMap<String, f64> {
        weights
            .iter()
            .map(|(factor, original)| {
                let adjusted = self.calculate(worker_id, factor, *original).adjusted_weight;
                (factor.clone(), adjusted)
            })
            .collect()
    }

    fn share_of(&self, worker_id: &str) -> f64 {
        let total: u64 = self.assignment_counts.values().sum();
        if total == 0 {
            return 0.0;
        }
        self.assignment_counts.get(worker_id).copied().unwrap_or(0) as f64 / total as f64
    }

    /// Adjustment in `[-max_adjustment, +max_adjustment]`. Negative means
    /// the worker is over-represented.
    fn adjustment_for(&self, worker_id: &str) -> f64 {
        let max_adj = self.config.max_adjustment;
        let mut adjustment = 0.0;

        if !self.assignment_counts.is_empty() {
            let total: u64 = self.assignment_counts.values().sum();
            if total > 0 {
                let expected = 1.0 / self.assignment_counts.len() as f64;
                let actual = self.share_of(worker_id);

                if actual > self.config.over_assignment_share {
                    let over = (actual - expected) / expected;
                    adjustment -= (over * 0.5).min(max_adj);
                } else if actual < expected * 0.5 {
                    let under = (expected - actual) / expected;
                    adjustment += (under * 0.3).min(max_adj);
                }
            }
        }

        if let Some(scores) = self.quality_scores.get(worker_id) {
            if scores.len() >= self.config.min_samples_for_adjustment {
                let variance = variance(scores);
                if variance > self.config.quality_variance_threshold {
                    adjustment -= (variance * 0.2).min(0.1);
                }
            }
        }

        (adjustment * self.config.smoothing_factor).clamp(-max_adj, max_adj)
    }

    /// Assignment share per worker
    pub fn assignment_distribution(&self) -> HashMap<String, f64> {
        let total: u64 = self.assignment_counts.values().sum();
        if total == 0 {
            return HashMap::new();
        }
        self.assignment_counts
            .iter()
            .map(|(worker, count)| (worker.clone(), *count as f64 / total as f64))
            .collect()
    }

    /// Overall fairness: 1.0 is a perfectly even distribution
    pub fn fairness_score(&self) -> f64 {
        let distribution = self.assignment_distribution();
        if distribution.is_empty() {
            return 1.0;
        }

        let mut values: Vec<f64> = distribution.values().copied().collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let n = values.len() as f64;
        let total: f64 = values.iter().sum();
        if total == 0.0 {
            return 1.0;
        }

        let mut cumulative = 0.0;
        for (i, value) in values.iter().enumerate() {
            cumulative += (2.0 * (i as f64 + 1.0) - n - 1.0) * value;
        }
        let gini = cumulative / (n * total);
        1.0 - gini.abs()
    }

    pub fn active_adjustments(&self, worker_id: Option<&str>) -> Vec<FairnessWeight> {
        self.active_weights
            .values()
            .filter(|w| worker_id.map(|id| w.worker_id == id).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub fn reset(&mut self, worker_id: Option<&str>) {
        match worker_id {
            Some(worker) => {
                self.assignment_counts.remove(worker);
                self.quality_scores.remove(worker);
                self.active_weights
                    .retain(|key, _| !key.starts_with(&format!("{worker}:")));
            }
            None => {
                self.assignment_counts.clear();
                self.quality_scores.clear();
                self.active_weights.clear();
            }
        }
    }
}

fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator() -> FairnessWeightCalculator {
        FairnessWeightCalculator::new(FairnessConfig::default())
    }

    #[test]
    fn test_over_assigned_worker_weight_reduced() {
        let mut calc = calculator();
        for _ in 0..9 {
            calc.record_assignment("hog");
        }
        calc.record_assignment("starved");

        let weight = calc.calculate("hog", "skill_match", 0.8);
        assert!(weight.adjusted_weight < 0.8);
        assert!(weight.adjustment_reason.contains("over-assignment"));

        let starved = calc.calculate("starved", "skill_match", 0.8);
        assert!(starved.adjusted_weight >= 0.8);
    }

    #[test]
    fn test_adjustment_bounded() {
        let mut calc = calculator();
        for _ in 0..1000 {
            calc.record_assignment("hog");
        }
        calc.record_assignment("other");

        let weight = calc.calculate("hog", "f", 0.5);
        let relative = (weight.adjusted_weight / 0.5) - 1.0;
        assert!(relative.abs() <= FairnessConfig::default().max_adjustment + 1e-9);
        assert!(weight.adjusted_weight >= 0.0 && weight.adjusted_weight <= 1.0);
    }

    #[test]
    fn test_even_distribution_is_fair() {
        let mut calc = calculator();
        for worker in ["a", "b", "c", "d"] {
            for _ in 0..5 {
                calc.record_assignment(worker);
            }
        }
        let score = calc.fairness_score();
        assert!(score > 0.99, "even distribution should score ~1.0, got {score}");
    }

    #[test]
    fn test_skewed_distribution_scores_lower() {
        let mut calc = calculator();
        for _ in 0..30 {
            calc.record_assignment("hog");
        }
        calc.record_assignment("a");
        calc.record_assignment("b");

        let skewed = calc.fairness_score();
        assert!(skewed < 0.7, "skewed distribution should score low, got {skewed}");
        // No data means nothing to be unfair about
        assert_eq!(calculator().fairness_score(), 1.0);
    }

    #[test]
    fn test_adjusted_weight_map() {
        let mut calc = calculator();
        for _ in 0..9 {
            calc.record_assignment("hog");
        }
        calc.record_assignment("other");

        let mut weights = HashMap::new();
        weights.insert("speed".to_string(), 0.6);
        weights.insert("quality".to_string(), 0.4);

        let adjusted = calc.adjusted_weights("hog", &weights);
        assert_eq!(adjusted.len(), 2);
        assert!(adjusted["speed"] < 0.6);
        assert!(adjusted["quality"] < 0.4);
        assert_eq!(calc.active_adjustments(Some("hog")).len(), 2);
    }
}
