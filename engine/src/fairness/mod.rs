//! Fairness controllers: cooling-off, weight adjustment, adaptive
//! thresholds and the incident ledger.

pub mod adaptive;
pub mod cooling;
pub mod incidents;
pub mod weights;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use adaptive::{AdaptiveScorer, AdaptiveThreshold, DeploymentDecision, Grade};
pub use cooling::{CoolingOffManager, CoolingOffPeriod};
pub use incidents::{Incident, IncidentLedger, IncidentSeverity, IncidentStatus};
pub use weights::{FairnessWeight, FairnessWeightCalculator};

/// Tunables shared by the fairness controllers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FairnessConfig {
    /// Rolling window for assignment counting
    pub window_hours: f64,
    /// Assignments in the window before cooling-off kicks in
    pub assignment_threshold: usize,
    /// Base cooling-off duration
    pub cooling_off_minutes: f64,
    pub min_cooling_off_minutes: f64,
    pub max_cooling_off_minutes: f64,
    /// Exponential scaling per assignment over the threshold
    pub scaling_factor: f64,
    /// Largest multiplicative weight adjustment
    pub max_adjustment: f64,
    pub smoothing_factor: f64,
    /// Assignment share that counts as over-represented
    pub over_assignment_share: f64,
    pub quality_variance_threshold: f64,
    pub min_samples_for_adjustment: usize,
    pub max_quality_samples: usize,
    pub adaptation_rate: f64,
    pub sensitivity: f64,
    pub sample_window: usize,
}

impl Default for FairnessConfig {
    fn default() -> Self {
        Self {
            window_hours: 1.0,
            assignment_threshold: 5,
            cooling_off_minutes: 30.0,
            min_cooling_off_minutes: 10.0,
            max_cooling_off_minutes: 120.0,
            scaling_factor: 1.5,
            max_adjustment: 0.3,
            smoothing_factor: 0.1,
            over_assignment_share: 0.7,
            quality_variance_threshold: 0.1,
            min_samples_for_adjustment: 5,
            max_quality_samples: 100,
            adaptation_rate: 0.1,
            sensitivity: 0.5,
            sample_window: 100,
        }
    }
}

/// Facade over the fairness controllers, safe to share across tasks
pub struct FairnessEngine {
    cooling: Mutex<CoolingOffManager>,
    weights: Mutex<FairnessWeightCalculator>,
    scorer: Mutex<AdaptiveScorer>,
    incidents: Mutex<IncidentLedger>,
}

impl FairnessEngine {
    pub fn new(config: FairnessConfig) -> Self {
        let scorer = AdaptiveScorer::new(config.adaptation_rate, config.sensitivity, config.sample_window);
        Self {
            cooling: Mutex::new(CoolingOffManager::new(config.clone())),
            weights: Mutex::new(FairnessWeightCalculator::new(config)),
            scorer: Mutex::new(scorer),
            incidents: Mutex::new(IncidentLedger::new()),
        }
    }

    /// Record an assignment into the cooling-off window and weight stats
    pub fn record_assignment(&self, worker_id: &str) {
        self.cooling.lock().record_assignment(worker_id);
        self.weights.lock().record_assignment(worker_id);
    }

    pub fn record_quality(&self, worker_id: &str, score: f64) {
        self.weights.lock().record_quality(worker_id, score);
    }

    pub fn is_cooling_off(&self, worker_id: &str) -> bool {
        self.cooling.lock().is_cooling_off(worker_id)
    }

    pub fn available_workers(&self, worker_ids: &[String]) -> Vec<String> {
        self.cooling.lock().available_workers(worker_ids)
    }

    pub fn force_cooling_off(&self, worker_id: &str, minutes: f64, reason: &str) {
        self.cooling.lock().force_cooling_off(worker_id, minutes, reason);
    }

    pub fn adjusted_weights(&self, worker_id: &str, weights: &HashMap<String, f64>) -> HashMap<String, f64> {
        self.weights.lock().adjusted_weights(worker_id, weights)
    }

    pub fn fairness_score(&self) -> f64 {
        self.weights.lock().fairness_score()
    }

    /// Run a closure against the adaptive scorer
    pub fn with_scorer<T>(&self, f: impl FnOnce(&mut AdaptiveScorer) -> T) -> T {
        f(&mut self.scorer.lock())
    }

    /// Run a closure against the incident ledger
    pub fn with_incidents<T>(&self, f: impl FnOnce(&mut IncidentLedger) -> T) -> T {
        f(&mut self.incidents.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_records_into_both_trackers() {
        let engine = FairnessEngine::new(FairnessConfig {
            assignment_threshold: 2,
            ..Default::default()
        });

        engine.record_assignment("w1");
        assert!(!engine.is_cooling_off("w1"));
        engine.record_assignment("w1");
        assert!(engine.is_cooling_off("w1"));

        // Weight stats saw the same assignments
        assert!(engine.fairness_score() <= 1.0);
        let pool = vec!["w1".to_string(), "w2".to_string()];
        assert_eq!(engine.available_workers(&pool), vec!["w2"]);
    }

    #[test]
    fn test_scorer_and_incident_access() {
        let engine = FairnessEngine::new(FairnessConfig::default());

        let grade = engine.with_scorer(|scorer| scorer.grade(0.92));
        assert_eq!(grade, Grade::A);

        let incident = engine.with_incidents(|ledger| {
            ledger.report(
                "skewed dispatch",
                IncidentSeverity::Medium,
                None,
                "auditor",
                serde_json::Value::Null,
            )
        });
        let open = engine.with_incidents(|ledger| ledger.open_incidents().len());
        assert_eq!(open, 1);
        engine.with_incidents(|ledger| {
            ledger.update_status(&incident.id, IncidentStatus::Resolved, None)
        });
    }
}
