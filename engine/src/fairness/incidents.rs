//! Fairness incident ledger.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

/// How serious an incident is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IncidentSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Incident lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncidentStatus {
    Reported,
    Investigating,
    Confirmed,
    Mitigated,
    Resolved,
    FalsePositive,
}

impl IncidentStatus {
    /// Open incidents still need attention
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            IncidentStatus::Reported | IncidentStatus::Investigating | IncidentStatus::Confirmed
        )
    }
}

/// One recorded fairness incident
#[derive(Debug, Clone, PartialEq)]
pub struct Incident {
    pub id: String,
    pub description: String,
    pub severity: IncidentSeverity,
    pub status: IncidentStatus,
    pub worker_id: Option<String>,
    pub reported_by: String,
    pub reported_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub status_notes: Vec<String>,
    pub context: Value,
}

/// In-memory incident ledger with lifecycle management
#[derive(Default)]
pub struct IncidentLedger {
    incidents: HashMap<String, Incident>,
}

impl IncidentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(
        &mut self,
        description: &str,
        severity: IncidentSeverity,
        worker_id: Option<&str>,
        reported_by: &str,
        context: Value,
    ) -> Incident {
        let incident = Incident {
            id: team_core::new_id(),
            description: description.to_string(),
            severity,
            status: IncidentStatus::Reported,
            worker_id: worker_id.map(|w| w.to_string()),
            reported_by: reported_by.to_string(),
            reported_at: Utc::now(),
            resolved_at: None,
            status_notes: Vec::new(),
            context,
        };
        tracing::warn!(
            incident = %incident.id,
            severity = ?severity,
            worker = ?worker_id,
            "Fairness incident reported"
        );
        self.incidents.insert(incident.id.clone(), incident.clone());
        incident
    }

    /// Advance an incident's status; terminal statuses stamp resolution
    pub fn update_status(&mut self, id: &str, status: IncidentStatus, note: Option<&str>) -> Option<Incident> {
        let incident = self.incidents.get_mut(id)?;
        incident.status = status;
        if let Some(note) = note {
            incident.status_notes.push(note.to_string());
        }
        if matches!(
            status,
            IncidentStatus::Resolved | IncidentStatus::FalsePositive | IncidentStatus::Mitigated
        ) {
            incident.resolved_at = Some(Utc::now());
        }
        Some(incident.clone())
    }

    pub fn get(&self, id: &str) -> Option<&Incident> {
        self.incidents.get(id)
    }

    pub fn list(
        &self,
        status: Option<IncidentStatus>,
        severity: Option<IncidentSeverity>,
    ) -> Vec<&Incident> {
        let mut matching: Vec<&Incident> = self
            .incidents
            .values()
            .filter(|i| status.map(|s| i.status == s).unwrap_or(true))
            .filter(|i| severity.map(|s| i.severity == s).unwrap_or(true))
            .collect();
        matching.sort_by(|a, b| b.reported_at.cmp(&a.reported_at));
        matching
    }

    pub fn open_incidents(&self) -> Vec<&Incident> {
        let mut open: Vec<&Incident> = self
            .incidents
            .values()
            .filter(|i| i.status.is_open())
            .collect();
        open.sort_by(|a, b| b.severity.cmp(&a.severity).then(b.reported_at.cmp(&a.reported_at)));
        open
    }

    pub fn by_worker(&self, worker_id: &str) -> Vec<&Incident> {
        self.incidents
            .values()
            .filter(|i| i.worker_id.as_deref() == Some(worker_id))
            .collect()
    }

    pub fn counts_by_status(&self) -> HashMap<IncidentStatus, usize> {
        let mut counts = HashMap::new();
        for incident in self.incidents.values() {
            *counts.entry(incident.status).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_and_lifecycle() {
        let mut ledger = IncidentLedger::new();
        let incident = ledger.report(
            "same worker won 90% of assignments",
            IncidentSeverity::High,
            Some("w1"),
            "auditor",
            json!({"share": 0.9}),
        );
        assert_eq!(incident.status, IncidentStatus::Reported);
        assert!(incident.status.is_open());

        ledger.update_status(&incident.id, IncidentStatus::Investigating, None);
        ledger.update_status(&incident.id, IncidentStatus::Confirmed, Some("verified"));
        let resolved = ledger
            .update_status(&incident.id, IncidentStatus::Mitigated, Some("cooling-off forced"))
            .unwrap();
        assert!(resolved.resolved_at.is_some());
        assert_eq!(resolved.status_notes.len(), 2);
        assert!(!resolved.status.is_open());
    }

    #[test]
    fn test_filters_and_open_ordering() {
        let mut ledger = IncidentLedger::new();
        let low = ledger.report("minor skew", IncidentSeverity::Low, None, "auditor", Value::Null);
        ledger.report("major skew", IncidentSeverity::Critical, Some("w1"), "auditor", Value::Null);
        ledger.update_status(&low.id, IncidentStatus::FalsePositive, None);

        let open = ledger.open_incidents();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].severity, IncidentSeverity::Critical);

        assert_eq!(ledger.list(Some(IncidentStatus::FalsePositive), None).len(), 1);
        assert_eq!(ledger.list(None, Some(IncidentSeverity::Critical)).len(), 1);
        assert_eq!(ledger.by_worker("w1").len(), 1);
        assert_eq!(ledger.counts_by_status().len(), 2);

        assert!(ledger.update_status("missing", IncidentStatus::Resolved, None).is_none());
    }
}
