//! Membership lifecycle, role assignments, handoffs and approvals.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use team_core::{
    error::{CoreError, Result},
    models::{
        Approval, AssignmentEntry, Handoff, HandoffChecklist, HandoffStatus, MembershipState,
        RoleAssignment, TeamMembership,
    },
    repository::{ApprovalRepository, HandoffRepository, MembershipRepository, RoleRepository},
};

use crate::common::{
    json_text, list_text, row_to_approval, row_to_handoff, row_to_membership, row_to_role,
    sqlx_error_to_core_error,
};
use crate::sqlite::SqliteStore;

#[async_trait]
impl MembershipRepository for SqliteStore {
    async fn insert(&self, membership: TeamMembership) -> Result<TeamMembership> {
        sqlx::query(
            r#"
            INSERT INTO team_memberships (team_id, worker_id, persona_id, role_id, state,
                                          joined_at, activated_at, retired_at, state_history,
                                          performance_score, task_completion_rate,
                                          average_task_duration_hours, collaboration_score,
                                          added_by, added_reason, retirement_reason, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&membership.team_id)
        .bind(&membership.worker_id)
        .bind(&membership.persona_id)
        .bind(&membership.role_id)
        .bind(membership.state.as_str())
        .bind(membership.joined_at)
        .bind(membership.activated_at)
        .bind(membership.retired_at)
        .bind(serde_json::to_string(&membership.state_history).ok())
        .bind(membership.performance_score)
        .bind(membership.task_completion_rate)
        .bind(membership.average_task_duration_hours)
        .bind(membership.collaboration_score)
        .bind(&membership.added_by)
        .bind(&membership.added_reason)
        .bind(&membership.retirement_reason)
        .bind(json_text(&membership.metadata))
        .execute(self.pool())
        .await
        .map_err(sqlx_error_to_core_error)?;

        MembershipRepository::get(self, &membership.team_id, &membership.worker_id)
            .await?
            .ok_or_else(|| {
                CoreError::member_not_found(&membership.team_id, &membership.worker_id)
            })
    }

    async fn get(&self, team_id: &str, worker_id: &str) -> Result<Option<TeamMembership>> {
        let row =
            sqlx::query("SELECT * FROM team_memberships WHERE team_id = ? AND worker_id = ?")
                .bind(team_id)
                .bind(worker_id)
                .fetch_optional(self.pool())
                .await
                .map_err(sqlx_error_to_core_error)?;
        row.map(|r| row_to_membership(&r)).transpose()
    }

    async fn list(
        &self,
        team_id: &str,
        state: Option<MembershipState>,
        persona_id: Option<&str>,
    ) -> Result<Vec<TeamMembership>> {
        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("SELECT * FROM team_memberships WHERE team_id = ");
        builder.push_bind(team_id);
        if let Some(state) = state {
            builder.push(" AND state = ");
            builder.push_bind(state.as_str());
        }
        if let Some(persona) = persona_id {
            builder.push(" AND persona_id = ");
            builder.push_bind(persona);
        }
        builder.push(" ORDER BY joined_at");

        let rows = builder
            .build()
            .fetch_all(self.pool())
            .await
            .map_err(sqlx_error_to_core_error)?;
        rows.iter().map(row_to_membership).collect()
    }

    async fn update_state(
        &self,
        team_id: &str,
        worker_id: &str,
        new_state: MembershipState,
        reason: Option<&str>,
    ) -> Result<TeamMembership> {
        let mut tx = self.pool().begin().await.map_err(sqlx_error_to_core_error)?;

        let row =
            sqlx::query("SELECT * FROM team_memberships WHERE team_id = ? AND worker_id = ?")
                .bind(team_id)
                .bind(worker_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(sqlx_error_to_core_error)?;
        let Some(row) = row else {
            return Err(CoreError::member_not_found(team_id, worker_id));
        };

        let mut membership = row_to_membership(&row)?;
        membership.apply_state(new_state, reason, Utc::now());

        sqlx::query(
            r#"
            UPDATE team_memberships
            SET state = ?, activated_at = ?, retired_at = ?, state_history = ?,
                retirement_reason = ?
            WHERE team_id = ? AND worker_id = ?
            "#,
        )
        .bind(membership.state.as_str())
        .bind(membership.activated_at)
        .bind(membership.retired_at)
        .bind(serde_json::to_string(&membership.state_history).ok())
        .bind(&membership.retirement_reason)
        .bind(team_id)
        .bind(worker_id)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_error_to_core_error)?;

        tx.commit().await.map_err(sqlx_error_to_core_error)?;
        Ok(membership)
    }

    async fn update_performance(
        &self,
        team_id: &str,
        worker_id: &str,
        performance_score: Option<i64>,
        task_completion_rate: Option<i64>,
        average_task_duration_hours: Option<f64>,
        collaboration_score: Option<i64>,
    ) -> Result<TeamMembership> {
        sqlx::query(
            r#"
            UPDATE team_memberships
            SET performance_score = COALESCE(?, performance_score),
                task_completion_rate = COALESCE(?, task_completion_rate),
                average_task_duration_hours = COALESCE(?, average_task_duration_hours),
                collaboration_score = COALESCE(?, collaboration_score)
            WHERE team_id = ? AND worker_id = ?
            "#,
        )
        .bind(performance_score)
        .bind(task_completion_rate)
        .bind(average_task_duration_hours)
        .bind(collaboration_score)
        .bind(team_id)
        .bind(worker_id)
        .execute(self.pool())
        .await
        .map_err(sqlx_error_to_core_error)?;

        MembershipRepository::get(self, team_id, worker_id)
            .await?
            .ok_or_else(|| CoreError::member_not_found(team_id, worker_id))
    }
}

#[async_trait]
impl RoleRepository for SqliteStore {
    async fn ensure_role(
        &self,
        team_id: &str,
        role_id: &str,
        description: Option<&str>,
        is_required: bool,
        priority: i64,
    ) -> Result<RoleAssignment> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO role_assignments (team_id, role_id, description, is_required,
                                          is_active, priority, created_at, updated_at)
            VALUES (?, ?, ?, ?, 1, ?, ?, ?)
            ON CONFLICT (team_id, role_id) DO NOTHING
            "#,
        )
        .bind(team_id)
        .bind(role_id)
        .bind(description)
        .bind(is_required as i64)
        .bind(priority)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(sqlx_error_to_core_error)?;

        RoleRepository::get(self, team_id, role_id)
            .await?
            .ok_or_else(|| CoreError::Internal(format!("Role {role_id} vanished after insert")))
    }

    async fn assign(
        &self,
        team_id: &str,
        role_id: &str,
        worker_id: &str,
        assigned_by: &str,
        reason: Option<&str>,
    ) -> Result<RoleAssignment> {
        let mut tx = self.pool().begin().await.map_err(sqlx_error_to_core_error)?;

        let row = sqlx::query("SELECT * FROM role_assignments WHERE team_id = ? AND role_id = ?")
            .bind(team_id)
            .bind(role_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(sqlx_error_to_core_error)?;
        let Some(row) = row else {
            return Err(CoreError::NotFound(format!(
                "Role {role_id} not found in team {team_id}"
            )));
        };

        let mut role = row_to_role(&row)?;
        let now = Utc::now();
        role.assignment_history.push(AssignmentEntry {
            from_worker: role.current_worker_id.clone(),
            to_worker: worker_id.to_string(),
            assigned_by: assigned_by.to_string(),
            reason: reason.map(|r| r.to_string()),
            timestamp: now,
        });
        role.current_worker_id = Some(worker_id.to_string());
        role.assigned_at = Some(now);
        role.assigned_by = Some(assigned_by.to_string());
        role.updated_at = now;

        sqlx::query(
            r#"
            UPDATE role_assignments
            SET current_worker_id = ?, assigned_at = ?, assigned_by = ?,
                assignment_history = ?, updated_at = ?
            WHERE team_id = ? AND role_id = ?
            "#,
        )
        .bind(&role.current_worker_id)
        .bind(role.assigned_at)
        .bind(&role.assigned_by)
        .bind(serde_json::to_string(&role.assignment_history).ok())
        .bind(role.updated_at)
        .bind(team_id)
        .bind(role_id)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_error_to_core_error)?;

        tx.commit().await.map_err(sqlx_error_to_core_error)?;
        Ok(role)
    }

    async fn get(&self, team_id: &str, role_id: &str) -> Result<Option<RoleAssignment>> {
        let row = sqlx::query("SELECT * FROM role_assignments WHERE team_id = ? AND role_id = ?")
            .bind(team_id)
            .bind(role_id)
            .fetch_optional(self.pool())
            .await
            .map_err(sqlx_error_to_core_error)?;
        row.map(|r| row_to_role(&r)).transpose()
    }

    async fn list(&self, team_id: &str, active_only: bool) -> Result<Vec<RoleAssignment>> {
        let rows = if active_only {
            sqlx::query(
                "SELECT * FROM role_assignments WHERE team_id = ? AND is_active = 1 ORDER BY priority DESC",
            )
            .bind(team_id)
            .fetch_all(self.pool())
            .await
            .map_err(sqlx_error_to_core_error)?
        } else {
            sqlx::query("SELECT * FROM role_assignments WHERE team_id = ? ORDER BY priority DESC")
                .bind(team_id)
                .fetch_all(self.pool())
                .await
                .map_err(sqlx_error_to_core_error)?
        };
        rows.iter().map(row_to_role).collect()
    }
}

#[async_trait]
impl HandoffRepository for SqliteStore {
    async fn insert(&self, handoff: Handoff) -> Result<Handoff> {
        sqlx::query(
            r#"
            INSERT INTO handoffs (id, team_id, worker_id, persona_id, status, initiated_at,
                                  completed_at, artifacts_verified, documentation_complete,
                                  lessons_captured, lessons, open_questions, recommendations,
                                  key_decisions, artifacts_list, initiated_by, completed_by)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&handoff.id)
        .bind(&handoff.team_id)
        .bind(&handoff.worker_id)
        .bind(&handoff.persona_id)
        .bind(handoff.status.as_str())
        .bind(handoff.initiated_at)
        .bind(handoff.completed_at)
        .bind(handoff.checklist.artifacts_verified as i64)
        .bind(handoff.checklist.documentation_complete as i64)
        .bind(handoff.checklist.lessons_captured as i64)
        .bind(&handoff.lessons)
        .bind(list_text(&handoff.open_questions))
        .bind(list_text(&handoff.recommendations))
        .bind(list_text(&handoff.key_decisions))
        .bind(list_text(&handoff.artifacts_list))
        .bind(&handoff.initiated_by)
        .bind(&handoff.completed_by)
        .execute(self.pool())
        .await
        .map_err(sqlx_error_to_core_error)?;

        HandoffRepository::get(self, &handoff.id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Handoff {} not found", handoff.id)))
    }

    async fn get(&self, id: &str) -> Result<Option<Handoff>> {
        let row = sqlx::query("SELECT * FROM handoffs WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(sqlx_error_to_core_error)?;
        row.map(|r| row_to_handoff(&r)).transpose()
    }

    async fn update_content(
        &self,
        id: &str,
        checklist: Option<HandoffChecklist>,
        lessons: Option<String>,
        open_questions: Option<Vec<String>>,
        recommendations: Option<Vec<String>>,
        key_decisions: Option<Vec<String>>,
        artifacts_list: Option<Vec<String>>,
    ) -> Result<Handoff> {
        let current = HandoffRepository::get(self, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Handoff {id} not found")))?;

        let checklist = checklist.unwrap_or(current.checklist);
        let lessons = lessons.or(current.lessons);
        let open_questions = open_questions.unwrap_or(current.open_questions);
        let recommendations = recommendations.unwrap_or(current.recommendations);
        let key_decisions = key_decisions.unwrap_or(current.key_decisions);
        let artifacts_list = artifacts_list.unwrap_or(current.artifacts_list);

        sqlx::query(
            r#"
            UPDATE handoffs
            SET artifacts_verified = ?, documentation_complete = ?, lessons_captured = ?,
                lessons = ?, open_questions = ?, recommendations = ?, key_decisions = ?,
                artifacts_list = ?, status = CASE WHEN status = 'initiated' THEN 'in_progress' ELSE status END
            WHERE id = ?
            "#,
        )
        .bind(checklist.artifacts_verified as i64)
        .bind(checklist.documentation_complete as i64)
        .bind(checklist.lessons_captured as i64)
        .bind(&lessons)
        .bind(list_text(&open_questions))
        .bind(list_text(&recommendations))
        .bind(list_text(&key_decisions))
        .bind(list_text(&artifacts_list))
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(sqlx_error_to_core_error)?;

        HandoffRepository::get(self, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Handoff {id} not found")))
    }

    async fn set_status(
        &self,
        id: &str,
        status: HandoffStatus,
        completed_by: Option<&str>,
    ) -> Result<Handoff> {
        let completed_at = if status == HandoffStatus::Completed {
            Some(Utc::now())
        } else {
            None
        };

        sqlx::query(
            "UPDATE handoffs SET status = ?, completed_at = COALESCE(?, completed_at), completed_by = COALESCE(?, completed_by) WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(completed_at)
        .bind(completed_by)
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(sqlx_error_to_core_error)?;

        HandoffRepository::get(self, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Handoff {id} not found")))
    }

    async fn list(&self, team_id: &str, worker_id: Option<&str>) -> Result<Vec<Handoff>> {
        let rows = match worker_id {
            Some(worker) => sqlx::query(
                "SELECT * FROM handoffs WHERE team_id = ? AND worker_id = ? ORDER BY initiated_at DESC",
            )
            .bind(team_id)
            .bind(worker)
            .fetch_all(self.pool())
            .await
            .map_err(sqlx_error_to_core_error)?,
            None => sqlx::query("SELECT * FROM handoffs WHERE team_id = ? ORDER BY initiated_at DESC")
                .bind(team_id)
                .fetch_all(self.pool())
                .await
                .map_err(sqlx_error_to_core_error)?,
        };
        rows.iter().map(row_to_handoff).collect()
    }
}

#[async_trait]
impl ApprovalRepository for SqliteStore {
    async fn insert(&self, approval: Approval) -> Result<Approval> {
        sqlx::query(
            r#"
            INSERT INTO approvals (id, team_id, workflow_id, phase, role, approver,
                                   approved_at, expires_at, notes)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&approval.id)
        .bind(&approval.team_id)
        .bind(&approval.workflow_id)
        .bind(&approval.phase)
        .bind(&approval.role)
        .bind(&approval.approver)
        .bind(approval.approved_at)
        .bind(approval.expires_at)
        .bind(&approval.notes)
        .execute(self.pool())
        .await
        .map_err(sqlx_error_to_core_error)?;

        Ok(approval)
    }

    async fn valid_for(
        &self,
        workflow_id: &str,
        phase: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Approval>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM approvals
            WHERE workflow_id = ? AND phase = ?
              AND (expires_at IS NULL OR expires_at > ?)
            ORDER BY approved_at DESC
            "#,
        )
        .bind(workflow_id)
        .bind(phase)
        .bind(now)
        .fetch_all(self.pool())
        .await
        .map_err(sqlx_error_to_core_error)?;
        rows.iter().map(row_to_approval).collect()
    }

    async fn revoke(&self, workflow_id: &str, phase: &str, role: &str) -> Result<bool> {
        let deleted =
            sqlx::query("DELETE FROM approvals WHERE workflow_id = ? AND phase = ? AND role = ?")
                .bind(workflow_id)
                .bind(phase)
                .bind(role)
                .execute(self.pool())
                .await
                .map_err(sqlx_error_to_core_error)?;
        Ok(deleted.rows_affected() > 0)
    }
}
