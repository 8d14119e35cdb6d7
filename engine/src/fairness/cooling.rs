//! Cooling-off periods for over-assigned workers.
//!
//! After too many assignments inside the rolling window a worker rests;
//! the duration scales with how far past the threshold it got, clamped
//! to configured bounds. Cooling-off workers are excluded from dispatch.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use super::FairnessConfig;

/// An active rest period for one worker
#[derive(Debug, Clone, PartialEq)]
pub struct CoolingOffPeriod {
    pub worker_id: String,
    pub reason: String,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub recent_assignment_count: usize,
}

impl CoolingOffPeriod {
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.started_at + self.duration
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.ends_at()
    }

    pub fn remaining_seconds_at(&self, now: DateTime<Utc>) -> f64 {
        if !self.is_active_at(now) {
            return 0.0;
        }
        (self.ends_at() - now).num_milliseconds() as f64 / 1000.0
    }
}

/// Tracks assignments per worker and applies cooling-off periods
pub struct CoolingOffManager {
    config: FairnessConfig,
    active_periods: HashMap<String, CoolingOffPeriod>,
    assignment_history: HashMap<String, Vec<DateTime<Utc>>>,
}

impl CoolingOffManager {
    pub fn new(config: FairnessConfig) -> Self {
        Self {
            config,
            active_periods: HashMap::new(),
            assignment_history: HashMap::new(),
        }
    }

    /// Record a task assignment and start a cooling-off period if the
    /// worker crossed the threshold.
    pub fn record_assignment(&mut self, worker_id: &str) {
        self.record_assignment_at(worker_id, Utc::now());
    }

    pub fn record_assignment_at(&mut self, worker_id: &str, timestamp: DateTime<Utc>) {
        self.assignment_history
            .entry(worker_id.to_string())
            .or_default()
            .push(timestamp);
        self.prune_history(worker_id, timestamp);
        self.check_threshold(worker_id, timestamp);
    }

    fn prune_history(&mut self, worker_id: &str, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds((self.config.window_hours * 2.0 * 3600.0) as i64);
        if let Some(history) = self.assignment_history.get_mut(worker_id) {
            history.retain(|ts| *ts > cutoff);
        }
    }

    fn check_threshold(&mut self, worker_id: &str, now: DateTime<Utc>) {
        if self.is_cooling_off_at(worker_id, now) {
            return;
        }

        let recent = self.recent_assignment_count_at(worker_id, now);
        if recent < self.config.assignment_threshold {
            return;
        }

        let over = (recent - self.config.assignment_threshold + 1) as i32;
        let minutes = (self.config.cooling_off_minutes * self.config.scaling_factor.powi(over))
            .clamp(self.config.min_cooling_off_minutes, self.config.max_cooling_off_minutes);

        self.apply(
            worker_id,
            minutes,
            &format!(
                "Exceeded assignment threshold ({recent}/{})",
                self.config.assignment_threshold
            ),
            recent,
            now,
        );
    }

    fn apply(&mut self, worker_id: &str, minutes: f64, reason: &str, recent: usize, now: DateTime<Utc>) {
        let period = CoolingOffPeriod {
            worker_id: worker_id.to_string(),
            reason: reason.to_string(),
            started_at: now,
            duration: Duration::seconds((minutes * 60.0) as i64),
            recent_assignment_count: recent,
        };
        tracing::info!(worker = %worker_id, minutes = minutes, reason = %reason, "Cooling-off applied");
        self.active_periods.insert(worker_id.to_string(), period);
    }

    pub fn is_cooling_off(&mut self, worker_id: &str) -> bool {
        self.is_cooling_off_at(worker_id, Utc::now())
    }

    pub fn is_cooling_off_at(&mut self, worker_id: &str, now: DateTime<Utc>) -> bool {
        match self.active_periods.get(worker_id) {
            Some(period) if period.is_active_at(now) => true,
            Some(_) => {
                self.active_periods.remove(worker_id);
                false
            }
            None => false,
        }
    }

    pub fn remaining_seconds(&mut self, worker_id: &str) -> f64 {
        let now = Utc::now();
        if !self.is_cooling_off_at(worker_id, now) {
            return 0.0;
        }
        self.active_periods
            .get(worker_id)
            .map(|p| p.remaining_seconds_at(now))
            .unwrap_or(0.0)
    }

    pub fn recent_assignment_count(&self, worker_id: &str) -> usize {
        self.recent_assignment_count_at(worker_id, Utc::now())
    }

    fn recent_assignment_count_at(&self, worker_id: &str, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::seconds((self.config.window_hours * 3600.0) as i64);
        self.assignment_history
            .get(worker_id)
            .map(|history| history.iter().filter(|ts| **ts >= cutoff).count())
            .unwrap_or(0)
    }

    /// Filter out workers currently resting
    pub fn available_workers(&mut self, worker_ids: &[String]) -> Vec<String> {
        let now = Utc::now();
        worker_ids
            .iter()
            .filter(|w| !self.is_cooling_off_at(w, now))
            .cloned()
            .collect()
    }

    pub fn force_cooling_off(&mut self, worker_id: &str, minutes: f64, reason: &str) {
        let recent = self.recent_assignment_count(worker_id);
        self.apply(worker_id, minutes, reason, recent, Utc::now());
    }

    pub fn cancel_cooling_off(&mut self, worker_id: &str) {
        if self.active_periods.remove(worker_id).is_some() {
            tracing::info!(worker = %worker_id, "Cancelled cooling-off");
        }
    }

    /// Assignment counts inside the window per worker with activity
    pub fn assignment_distribution(&self) -> HashMap<String, usize> {
        let now = Utc::now();
        self.assignment_history
            .keys()
            .filter_map(|worker| {
                let count = self.recent_assignment_count_at(worker, now);
                (count > 0).then(|| (worker.clone(), count))
            })
            .collect()
    }

    pub fn active_periods(&mut self) -> Vec<CoolingOffPeriod> {
        let now = Utc::now();
        self.active_periods
            .retain(|_, period| period.is_active_at(now));
        self.active_periods.values().cloned().collect()
    }

    pub fn reset(&mut self, worker_id: Option<&str>) {
        match worker_id {
            Some(worker) => {
                self.active_periods.remove(worker);
                self.assignment_history.remove(worker);
            }
            None => {
                self.active_periods.clear();
                self.assignment_history.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(threshold: usize) -> CoolingOffManager {
        CoolingOffManager::new(FairnessConfig {
            assignment_threshold: threshold,
            cooling_off_minutes: 30.0,
            min_cooling_off_minutes: 10.0,
            max_cooling_off_minutes: 120.0,
            scaling_factor: 1.5,
            window_hours: 1.0,
            ..Default::default()
        })
    }

    #[test]
    fn test_threshold_triggers_cooling_off() {
        let mut manager = manager(3);
        let now = Utc::now();

        manager.record_assignment_at("w1", now);
        manager.record_assignment_at("w1", now);
        assert!(!manager.is_cooling_off("w1"));

        manager.record_assignment_at("w1", now);
        assert!(manager.is_cooling_off("w1"));
        assert!(manager.remaining_seconds("w1") > 0.0);

        // Other workers are unaffected
        assert!(!manager.is_cooling_off("w2"));
    }

    #[test]
    fn test_duration_clamped_to_bounds() {
        let mut manager = manager(1);
        let now = Utc::now();
        // Far over threshold: 30 * 1.5^n would exceed the cap
        for _ in 0..10 {
            manager.record_assignment_at("w1", now);
        }
        let periods = manager.active_periods();
        assert_eq!(periods.len(), 1);
        let minutes = periods[0].duration.num_seconds() as f64 / 60.0;
        assert!(minutes <= 120.0 + 1e-9);
        assert!(minutes >= 10.0);
    }

    #[test]
    fn test_old_assignments_fall_out_of_window() {
        let mut manager = manager(3);
        let old = Utc::now() - Duration::hours(2);
        manager.record_assignment_at("w1", old);
        manager.record_assignment_at("w1", old);
        manager.record_assignment_at("w1", Utc::now());
        // Only one assignment inside the window
        assert_eq!(manager.recent_assignment_count("w1"), 1);
        assert!(!manager.is_cooling_off("w1"));
    }

    #[test]
    fn test_available_workers_filters_resting() {
        let mut manager = manager(1);
        manager.record_assignment("hot");
        let pool = vec!["hot".to_string(), "cold".to_string()];
        assert_eq!(manager.available_workers(&pool), vec!["cold"]);

        manager.cancel_cooling_off("hot");
        assert_eq!(manager.available_workers(&pool).len(), 2);
    }

    #[test]
    fn test_force_and_distribution() {
        let mut manager = manager(100);
        manager.record_assignment("w1");
        manager.record_assignment("w1");
        manager.record_assignment("w2");

        let distribution = manager.assignment_distribution();
        assert_eq!(distribution.get("w1"), Some(&2));
        assert_eq!(distribution.get("w2"), Some(&1));

        manager.force_cooling_off("w2", 15.0, "manual");
        assert!(manager.is_cooling_off("w2"));
    }
}
