//! Query and analytics over tracked executions.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{ExecutionStatus, TrackedExecution};

/// Filter criteria for execution queries; unset fields do not constrain
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub persona_id: Option<String>,
    pub outcome: Option<ExecutionStatus>,
    pub outcomes: Option<Vec<ExecutionStatus>>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub tags: Option<Vec<String>>,
    pub user_id: Option<String>,
    pub correlation_id: Option<String>,
    pub min_duration_ms: Option<i64>,
    pub max_duration_ms: Option<i64>,
    pub has_errors: Option<bool>,
    pub limit: usize,
    pub offset: usize,
}

impl ExecutionFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            ..Default::default()
        }
    }

    fn matches(&self, execution: &TrackedExecution) -> bool {
        let ctx = &execution.trace_context;

        if let Some(ref persona) = self.persona_id {
            if &ctx.persona_id != persona {
                return false;
            }
        }
        if let Some(outcome) = self.outcome {
            if execution.outcome != outcome {
                return false;
            }
        }
        if let Some(ref outcomes) = self.outcomes {
            if !outcomes.contains(&execution.outcome) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if execution.started_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if execution.started_at > until {
                return false;
            }
        }
        if let Some(ref tags) = self.tags {
            if !tags.iter().any(|t| ctx.tags.contains(t)) {
                return false;
            }
        }
        if let Some(ref user) = self.user_id {
            if ctx.user_id.as_ref() != Some(user) {
                return false;
            }
        }
        if let Some(ref correlation) = self.correlation_id {
            if ctx.correlation_id.as_ref() != Some(correlation) {
                return false;
            }
        }
        if let Some(min) = self.min_duration_ms {
            if execution.duration_ms.map(|d| d < min).unwrap_or(true) {
                return false;
            }
        }
        if let Some(max) = self.max_duration_ms {
            if execution.duration_ms.map(|d| d > max).unwrap_or(true) {
                return false;
            }
        }
        if let Some(has_errors) = self.has_errors {
            if (execution.error_message.is_some()) != has_errors {
                return false;
            }
        }
        true
    }
}

/// Aggregated analytics over a set of executions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyticsSummary {
    pub count: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub min_duration_ms: Option<i64>,
    pub max_duration_ms: Option<i64>,
    pub total_tokens: i64,
    pub total_cost_usd: f64,
    pub decisions_by_kind: HashMap<String, usize>,
    pub top_personas: Vec<(String, usize)>,
}

/// Queryable cache of tracked executions
#[derive(Default)]
pub struct QueryService {
    cache: Mutex<HashMap<Uuid, TrackedExecution>>,
}

impl QueryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_execution(&self, execution: TrackedExecution) {
        self.cache.lock().insert(execution.id, execution);
    }

    pub fn get_cached(&self, execution_id: Uuid) -> Option<TrackedExecution> {
        self.cache.lock().get(&execution_id).cloned()
    }

    /// Executions matching the filter, newest first, paginated
    pub fn filter(&self, filter: &ExecutionFilter) -> Vec<TrackedExecution> {
        let cache = self.cache.lock();
        let mut results: Vec<TrackedExecution> = cache
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        results.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        let limit = if filter.limit == 0 { usize::MAX } else { filter.limit };
        results.into_iter().skip(filter.offset).take(limit).collect()
    }

    pub fn get_recent(&self, limit: usize, persona_id: Option<&str>) -> Vec<TrackedExecution> {
        self.filter(&ExecutionFilter {
            persona_id: persona_id.map(|p| p.to_string()),
            limit,
            ..Default::default()
        })
    }

    pub fn get_failed(&self, since: Option<DateTime<Utc>>, limit: usize) -> Vec<TrackedExecution> {
        self.filter(&ExecutionFilter {
            outcome: Some(ExecutionStatus::Failed),
            since,
            limit,
            ..Default::default()
        })
    }

    pub fn get_by_correlation(&self, correlation_id: &str) -> Vec<TrackedExecution> {
        self.filter(&ExecutionFilter {
            correlation_id: Some(correlation_id.to_string()),
            limit: 1000,
            ..Default::default()
        })
    }

    pub fn count(&self, filter: &ExecutionFilter) -> usize {
        let cache = self.cache.lock();
        cache.values().filter(|e| filter.matches(e)).count()
    }

    /// Aggregate metrics over executions matching the filter
    pub fn analytics(&self, filter: &ExecutionFilter) -> AnalyticsSummary {
        let mut scoped = filter.clone();
        scoped.limit = 0;
        scoped.offset = 0;
        let executions = self.filter(&scoped);

        if executions.is_empty() {
            return AnalyticsSummary::default();
        }

        let count = executions.len();
        let success_count = executions
            .iter()
            .filter(|e| e.outcome == ExecutionStatus::Success)
            .count();
        let failed_count = executions
            .iter()
            .filter(|e| e.outcome == ExecutionStatus::Failed)
            .count();

        let durations: Vec<i64> = executions.iter().filter_map(|e| e.duration_ms).collect();
        let avg_duration_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<i64>() as f64 / durations.len() as f64
        };

        let mut decisions_by_kind: HashMap<String, usize> = HashMap::new();
        for execution in &executions {
            for decision in &execution.decisions {
                *decisions_by_kind
                    .entry(decision.kind.as_str().to_string())
                    .or_insert(0) += 1;
            }
        }

        let mut persona_counts: HashMap<String, usize> = HashMap::new();
        for execution in &executions {
            *persona_counts
                .entry(execution.trace_context.persona_id.clone())
                .or_insert(0) += 1;
        }
        let mut top_personas: Vec<(String, usize)> = persona_counts.into_iter().collect();
        top_personas.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_personas.truncate(10);

        AnalyticsSummary {
            count,
            success_count,
            failed_count,
            success_rate: success_count as f64 / count as f64,
            avg_duration_ms,
            min_duration_ms: durations.iter().min().copied(),
            max_duration_ms: durations.iter().max().copied(),
            total_tokens: executions.iter().filter_map(|e| e.token_count).sum(),
            total_cost_usd: executions.iter().filter_map(|e| e.cost_usd).sum(),
            decisions_by_kind,
            top_personas,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DecisionKind, TrackedDecision, TraceContext};
    use serde_json::Value;

    fn execution(persona: &str, outcome: ExecutionStatus, duration_ms: i64) -> TrackedExecution {
        let mut e = TrackedExecution::new(TraceContext::for_persona(persona));
        e.outcome = outcome;
        e.duration_ms = Some(duration_ms);
        e.token_count = Some(100);
        e.cost_usd = Some(0.01);
        if outcome == ExecutionStatus::Failed {
            e.error_message = Some("boom".to_string());
        }
        e
    }

    fn populated() -> QueryService {
        let service = QueryService::new();
        service.cache_execution(execution("alpha", ExecutionStatus::Success, 100));
        service.cache_execution(execution("alpha", ExecutionStatus::Failed, 300));
        service.cache_execution(execution("beta", ExecutionStatus::Success, 200));
        service
    }

    #[test]
    fn test_filter_by_persona_and_outcome() {
        let service = populated();

        let alphas = service.filter(&ExecutionFilter {
            persona_id: Some("alpha".to_string()),
            limit: 10,
            ..Default::default()
        });
        assert_eq!(alphas.len(), 2);

        let failed = service.get_failed(None, 10);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].trace_context.persona_id, "alpha");
    }

    #[test]
    fn test_filter_duration_bounds_and_errors() {
        let service = populated();

        let slow = service.filter(&ExecutionFilter {
            min_duration_ms: Some(150),
            limit: 10,
            ..Default::default()
        });
        assert_eq!(slow.len(), 2);

        let with_errors = service.filter(&ExecutionFilter {
            has_errors: Some(true),
            limit: 10,
            ..Default::default()
        });
        assert_eq!(with_errors.len(), 1);
    }

    #[test]
    fn test_analytics_aggregation() {
        let service = populated();
        let mut decorated = execution("alpha", ExecutionStatus::Success, 400);
        decorated.add_decision(TrackedDecision::new(DecisionKind::Routing, "left", ""));
        decorated.add_decision(TrackedDecision::new(DecisionKind::Routing, "right", ""));
        service.cache_execution(decorated);

        let summary = service.analytics(&ExecutionFilter::new());
        assert_eq!(summary.count, 4);
        assert_eq!(summary.success_count, 3);
        assert_eq!(summary.failed_count, 1);
        assert!((summary.success_rate - 0.75).abs() < 1e-9);
        assert_eq!(summary.min_duration_ms, Some(100));
        assert_eq!(summary.max_duration_ms, Some(400));
        assert_eq!(summary.total_tokens, 400);
        assert_eq!(summary.decisions_by_kind.get("routing"), Some(&2));
        assert_eq!(summary.top_personas[0].0, "alpha");
        assert_eq!(summary.top_personas[0].1, 3);
    }

    #[test]
    fn test_correlation_lookup() {
        let service = QueryService::new();
        let mut ctx = TraceContext::for_persona("p");
        ctx.correlation_id = Some("corr-7".to_string());
        let mut e = TrackedExecution::new(ctx);
        e.output_data = Value::Null;
        service.cache_execution(e);

        assert_eq!(service.get_by_correlation("corr-7").len(), 1);
        assert!(service.get_by_correlation("other").is_empty());
    }
}
