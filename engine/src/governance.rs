//! Phase-gate governance: documents, approvals and validation rules.
//!
//! Gate checks are non-exceptional. The result carries pass/fail and the
//! individual check outcomes; the caller decides what to do with a
//! failing gate. Every check and approval lands in the audit trail.

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use team_core::{
    error::{CoreError, Result},
    models::Approval,
    repository::ApprovalRepository,
};

/// Default approval lifetime
pub const DEFAULT_APPROVAL_EXPIRY_HOURS: i64 = 72;

/// A document the phase requires
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRequirement {
    pub doc_type: String,
    pub name: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

/// An approval role the phase requires
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalRequirement {
    pub role: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

/// A named validation rule; passes only through a registered validator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationRule {
    pub rule_id: String,
    #[serde(default)]
    pub description: String,
    pub threshold: Option<f64>,
}

fn default_required() -> bool {
    true
}

/// Declarative gate configuration for one phase
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseGate {
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub required_documents: Vec<DocumentRequirement>,
    #[serde(default)]
    pub required_approvals: Vec<ApprovalRequirement>,
    #[serde(default)]
    pub validation_rules: Vec<ValidationRule>,
}

/// Outcome of a single check inside a gate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Failed,
    Skipped,
    Pending,
}

/// Result of evaluating a phase gate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateCheckResult {
    pub phase: String,
    pub passed: bool,
    pub timestamp: DateTime<Utc>,
    pub document_checks: BTreeMap<String, CheckStatus>,
    pub approval_checks: BTreeMap<String, CheckStatus>,
    pub rule_checks: BTreeMap<String, CheckStatus>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl GateCheckResult {
    fn new(phase: &str) -> Self {
        Self {
            phase: phase.to_string(),
            passed: true,
            timestamp: Utc::now(),
            document_checks: BTreeMap::new(),
            approval_checks: BTreeMap::new(),
            rule_checks: BTreeMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Kind of audit trail entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Check,
    Approve,
    Reject,
    Override,
}

/// One entry in the governance audit trail
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub workflow_id: String,
    pub phase: String,
    pub action: AuditAction,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub result: Option<GateCheckResult>,
    #[serde(default)]
    pub metadata: Value,
}

type Validator = Box<dyn Fn(&Value) -> bool + Send + Sync>;

/// Enforces governance rules at phase gates
pub struct GovernanceService {
    gates: RwLock<HashMap<String, PhaseGate>>,
    validators: RwLock<HashMap<String, Validator>>,
    approvals: Arc<dyn ApprovalRepository>,
    audit_trail: Mutex<Vec<AuditEntry>>,
    approval_expiry_hours: i64,
}

impl GovernanceService {
    pub fn new(approvals: Arc<dyn ApprovalRepository>, approval_expiry_hours: i64) -> Self {
        tracing::info!(expiry_hours = approval_expiry_hours, "Governance service initialized");
        Self {
            gates: RwLock::new(HashMap::new()),
            validators: RwLock::new(HashMap::new()),
            approvals,
            audit_trail: Mutex::new(Vec::new()),
            approval_expiry_hours,
        }
    }

    /// Load a gate catalog from its JSON form:
    /// `{"phases": {"<phase>": {<PhaseGate fields>}}}`
    pub fn load_catalog(&self, catalog: &Value) -> Result<usize> {
        let phases = catalog
            .get("phases")
            .and_then(|p| p.as_object())
            .ok_or_else(|| CoreError::Configuration("Gate catalog has no phases object".to_string()))?;

        let mut gates = self.gates.write();
        for (phase_name, config) in phases {
            let mut gate: PhaseGate = serde_json::from_value(config.clone())
                .map_err(|e| CoreError::Configuration(format!("Invalid gate {phase_name}: {e}")))?;
            gate.phase = phase_name.clone();
            if gate.display_name.is_empty() {
                gate.display_name = phase_name.clone();
            }
            gates.insert(phase_name.clone(), gate);
        }
        tracing::info!(phases = gates.len(), "Loaded governance gate catalog");
        Ok(gates.len())
    }

    pub fn load_catalog_str(&self, json: &str) -> Result<usize> {
        let catalog: Value = serde_json::from_str(json)?;
        self.load_catalog(&catalog)
    }

    /// Install a gate directly
    pub fn add_gate(&self, gate: PhaseGate) {
        self.gates.write().insert(gate.phase.clone(), gate);
    }

    /// Register a validator for a rule id
    pub fn register_validator(
        &self,
        rule_id: &str,
        validator: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) {
        self.validators
            .write()
            .insert(rule_id.to_string(), Box::new(validator));
        tracing::debug!(rule = %rule_id, "Registered gate validator");
    }

    /// Evaluate a phase gate for a workflow.
    ///
    /// `context` carries a `documents` object whose keys are present
    /// document types. Repeating the call with the same context yields an
    /// equivalent result and an equivalent audit entry.
    pub async fn check_phase_gate(
        &self,
        workflow_id: &str,
        phase: &str,
        context: &Value,
        actor: &str,
    ) -> Result<GateCheckResult> {
        let mut result = GateCheckResult::new(phase);

        let gate = self.gates.read().get(phase).cloned();
        let Some(gate) = gate else {
            result
                .warnings
                .push(format!("No governance gate defined for phase: {phase}"));
            self.record_audit(workflow_id, phase, AuditAction::Check, actor, Some(result.clone()), Value::Null);
            return Ok(result);
        };

        let documents = context.get("documents").cloned().unwrap_or(Value::Null);
        for doc in &gate.required_documents {
            let present = documents.get(&doc.doc_type).is_some();
            let status = match (doc.required, present) {
                (_, true) => CheckStatus::Passed,
                (true, false) => {
                    result.errors.push(format!("Missing required document: {}", doc.name));
                    result.passed = false;
                    CheckStatus::Failed
                }
                (false, false) => CheckStatus::Skipped,
            };
            result.document_checks.insert(doc.doc_type.clone(), status);
        }

        let valid = self
            .approvals
            .valid_for(workflow_id, phase, Utc::now())
            .await?;
        let approved_roles: std::collections::HashSet<&str> =
            valid.iter().map(|a| a.role.as_str()).collect();

        for requirement in &gate.required_approvals {
            let present = approved_roles.contains(requirement.role.as_str());
            let status = match (requirement.required, present) {
                (_, true) => CheckStatus::Passed,
                (true, false) => {
                    result
                        .errors
                        .push(format!("Missing approval from: {}", requirement.role));
                    result.passed = false;
                    CheckStatus::Pending
                }
                (false, false) => CheckStatus::Skipped,
            };
            result.approval_checks.insert(requirement.role.clone(), status);
        }

        {
            let validators = self.validators.read();
            for rule in &gate.validation_rules {
                match validators.get(&rule.rule_id) {
                    Some(validator) => {
                        if validator(context) {
                            result.rule_checks.insert(rule.rule_id.clone(), CheckStatus::Passed);
                        } else {
                            result.rule_checks.insert(rule.rule_id.clone(), CheckStatus::Failed);
                            result.errors.push(format!("Validation failed: {}", rule.description));
                            result.passed = false;
                        }
                    }
                    None => {
                        result.rule_checks.insert(rule.rule_id.clone(), CheckStatus::Skipped);
                        result
                            .warnings
                            .push(format!("No validator for rule: {}", rule.rule_id));
                    }
                }
            }
        }

        self.record_audit(workflow_id, phase, AuditAction::Check, actor, Some(result.clone()), Value::Null);
        Ok(result)
    }

    /// Record an approval for a phase; it expires after the configured
    /// lifetime.
    pub async fn record_approval(
        &self,
        team_id: &str,
        workflow_id: &str,
        phase: &str,
        role: &str,
        approver: &str,
        notes: &str,
    ) -> Result<Approval> {
        let now = Utc::now();
        let approval = Approval {
            id: team_core::new_id(),
            team_id: team_id.to_string(),
            workflow_id: workflow_id.to_string(),
            phase: phase.to_string(),
            role: role.to_string(),
            approver: approver.to_string(),
            approved_at: now,
            expires_at: Some(now + Duration::hours(self.approval_expiry_hours)),
            notes: notes.to_string(),
        };
        let stored = self.approvals.insert(approval).await?;

        self.record_audit(
            workflow_id,
            phase,
            AuditAction::Approve,
            approver,
            None,
            serde_json::json!({"role": role, "notes": notes}),
        );
        tracing::info!(workflow = %workflow_id, phase = %phase, role = %role, "Approval recorded");
        Ok(stored)
    }

    /// Revoke a role's approvals on a phase
    pub async fn revoke_approval(
        &self,
        workflow_id: &str,
        phase: &str,
        role: &str,
        actor: &str,
    ) -> Result<bool> {
        let revoked = self.approvals.revoke(workflow_id, phase, role).await?;
        if revoked {
            self.record_audit(
                workflow_id,
                phase,
                AuditAction::Reject,
                actor,
                None,
                serde_json::json!({"role": role}),
            );
        }
        Ok(revoked)
    }

    fn record_audit(
        &self,
        workflow_id: &str,
        phase: &str,
        action: AuditAction,
        actor: &str,
        result: Option<GateCheckResult>,
        metadata: Value,
    ) {
        self.audit_trail.lock().push(AuditEntry {
            workflow_id: workflow_id.to_string(),
            phase: phase.to_string(),
            action,
            actor: actor.to_string(),
            timestamp: Utc::now(),
            result,
            metadata,
        });
    }

    /// Recent audit entries, optionally filtered
    pub fn audit_trail(
        &self,
        workflow_id: Option<&str>,
        phase: Option<&str>,
        limit: usize,
    ) -> Vec<AuditEntry> {
        let trail = self.audit_trail.lock();
        let filtered: Vec<AuditEntry> = trail
            .iter()
            .filter(|e| workflow_id.map(|w| e.workflow_id == w).unwrap_or(true))
            .filter(|e| phase.map(|p| e.phase == p).unwrap_or(true))
            .cloned()
            .collect();
        let start = filtered.len().saturating_sub(limit);
        filtered[start..].to_vec()
    }

    pub fn phase_requirements(&self, phase: &str) -> Option<PhaseGate> {
        self.gates.read().get(phase).cloned()
    }

    pub fn phases(&self) -> Vec<String> {
        self.gates.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    /// Approval repository backed by a plain vector
    #[derive(Default)]
    struct MemoryApprovals {
        approvals: Mutex<Vec<Approval>>,
    }

    #[async_trait]
    impl ApprovalRepository for MemoryApprovals {
        async fn insert(&self, approval: Approval) -> Result<Approval> {
            self.approvals.lock().push(approval.clone());
            Ok(approval)
        }

        async fn valid_for(
            &self,
            workflow_id: &str,
            phase: &str,
            now: DateTime<Utc>,
        ) -> Result<Vec<Approval>> {
            Ok(self
                .approvals
                .lock()
                .iter()
                .filter(|a| a.workflow_id == workflow_id && a.phase == phase)
                .filter(|a| a.expires_at.map(|e| e > now).unwrap_or(true))
                .cloned()
                .collect())
        }

        async fn revoke(&self, workflow_id: &str, phase: &str, role: &str) -> Result<bool> {
            let mut approvals = self.approvals.lock();
            let before = approvals.len();
            approvals.retain(|a| {
                !(a.workflow_id == workflow_id && a.phase == phase && a.role == role)
            });
            Ok(approvals.len() < before)
        }
    }

    fn design_review_gate() -> PhaseGate {
        PhaseGate {
            phase: "design_review".to_string(),
            display_name: "Design Review".to_string(),
            required_documents: vec![DocumentRequirement {
                doc_type: "architecture".to_string(),
                name: "architecture".to_string(),
                required: true,
            }],
            required_approvals: vec![ApprovalRequirement {
                role: "architect".to_string(),
                required: true,
            }],
            validation_rules: vec![],
        }
    }

    fn service() -> GovernanceService {
        let service = GovernanceService::new(Arc::new(MemoryApprovals::default()), 72);
        service.add_gate(design_review_gate());
        service
    }

    #[tokio::test]
    async fn test_gate_fails_then_passes() {
        let service = service();

        let result = service
            .check_phase_gate("wf1", "design_review", &json!({}), "system")
            .await
            .unwrap();
        assert!(!result.passed);
        assert!(result
            .errors
            .contains(&"Missing required document: architecture".to_string()));
        assert!(result
            .errors
            .contains(&"Missing approval from: architect".to_string()));
        assert_eq!(
            result.approval_checks.get("architect"),
            Some(&CheckStatus::Pending)
        );

        service
            .record_approval("T1", "wf1", "design_review", "architect", "alice", "")
            .await
            .unwrap();
        let context = json!({"documents": {"architecture": {"url": "docs/arch.md"}}});
        let result = service
            .check_phase_gate("wf1", "design_review", &context, "system")
            .await
            .unwrap();
        assert!(result.passed);
        assert!(result.errors.is_empty());

        // Two checks and one approval in the audit trail
        let trail = service.audit_trail(Some("wf1"), None, 100);
        assert_eq!(trail.len(), 3);
        assert_eq!(trail[0].action, AuditAction::Check);
        assert_eq!(trail[1].action, AuditAction::Approve);
    }

    #[tokio::test]
    async fn test_repeated_checks_are_equivalent() {
        let service = service();
        let context = json!({"documents": {"architecture": true}});

        let first = service
            .check_phase_gate("wf1", "design_review", &context, "system")
            .await
            .unwrap();
        let second = service
            .check_phase_gate("wf1", "design_review", &context, "system")
            .await
            .unwrap();

        assert_eq!(first.passed, second.passed);
        assert_eq!(first.document_checks, second.document_checks);
        assert_eq!(first.approval_checks, second.approval_checks);
        assert_eq!(first.errors, second.errors);
    }

    #[tokio::test]
    async fn test_unknown_phase_passes_with_warning() {
        let service = service();
        let result = service
            .check_phase_gate("wf1", "nonexistent", &json!({}), "system")
            .await
            .unwrap();
        assert!(result.passed);
        assert_eq!(result.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_validation_rules_and_missing_validator() {
        let service = service();
        let mut gate = design_review_gate();
        gate.phase = "quality_gate".to_string();
        gate.required_documents.clear();
        gate.required_approvals.clear();
        gate.validation_rules = vec![
            ValidationRule {
                rule_id: "coverage".to_string(),
                description: "coverage at least 80%".to_string(),
                threshold: Some(0.8),
            },
            ValidationRule {
                rule_id: "unregistered".to_string(),
                description: "no validator exists".to_string(),
                threshold: None,
            },
        ];
        service.add_gate(gate);
        service.register_validator("coverage", |ctx| {
            ctx.get("coverage").and_then(|c| c.as_f64()).unwrap_or(0.0) >= 0.8
        });

        let passing = service
            .check_phase_gate("wf1", "quality_gate", &json!({"coverage": 0.9}), "system")
            .await
            .unwrap();
        assert!(passing.passed);
        assert_eq!(passing.rule_checks.get("coverage"), Some(&CheckStatus::Passed));
        assert_eq!(
            passing.rule_checks.get("unregistered"),
            Some(&CheckStatus::Skipped)
        );
        assert_eq!(passing.warnings.len(), 1);

        let failing = service
            .check_phase_gate("wf1", "quality_gate", &json!({"coverage": 0.5}), "system")
            .await
            .unwrap();
        assert!(!failing.passed);
        assert!(failing.errors[0].contains("coverage at least 80%"));
    }

    #[tokio::test]
    async fn test_revoked_approval_no_longer_counts() {
        let service = service();
        service
            .record_approval("T1", "wf1", "design_review", "architect", "alice", "lgtm")
            .await
            .unwrap();

        assert!(service
            .revoke_approval("wf1", "design_review", "architect", "admin")
            .await
            .unwrap());

        let context = json!({"documents": {"architecture": true}});
        let result = service
            .check_phase_gate("wf1", "design_review", &context, "system")
            .await
            .unwrap();
        assert!(!result.passed);
    }

    #[tokio::test]
    async fn test_catalog_loading() {
        let service = GovernanceService::new(Arc::new(MemoryApprovals::default()), 72);
        let catalog = json!({
            "phases": {
                "implementation": {
                    "display_name": "Implementation",
                    "required_documents": [
                        {"doc_type": "design", "name": "design document"}
                    ],
                    "required_approvals": [
                        {"role": "tech_lead"}
                    ],
                    "validation_rules": []
                }
            }
        });
        assert_eq!(service.load_catalog(&catalog).unwrap(), 1);
        let gate = service.phase_requirements("implementation").unwrap();
        assert_eq!(gate.display_name, "Implementation");
        assert!(gate.required_documents[0].required);
        assert_eq!(service.phases(), vec!["implementation"]);
    }
}
