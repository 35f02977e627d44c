use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{info, warn};

use vmgate_core::approvals::{
    apply_decision, check_preconditions, resolve_propagation, ApprovalPolicy, EntityStatus,
    Propagation, SkipReason, StatusChange,
};
use vmgate_core::audit::{AuditEntity, AuditEvent};
use vmgate_core::domain::approval::{Approval, ApprovalDecision, ApprovalEntityType, ApprovalId};
use vmgate_core::domain::customization::CustomizationId;
use vmgate_core::domain::request::RequestId;
use vmgate_core::domain::user::Principal;
use vmgate_core::errors::WorkflowError;

use super::{authenticated, REVIEWER_ROLES};
use crate::repositories::{approval, audit, customization, request, RepositoryError};
use crate::DbPool;

const DEFAULT_INBOX_LIMIT: u32 = 50;
const MAX_INBOX_LIMIT: u32 = 200;

#[derive(Clone)]
pub struct ApprovalWorkflow {
    pool: DbPool,
    policy: ApprovalPolicy,
}

/// Entity status as loaded for propagation, with the start of its current
/// approval round.
struct OwningEntity {
    status: EntityStatus,
    round_started_at: Option<DateTime<Utc>>,
}

impl ApprovalWorkflow {
    pub fn new(pool: DbPool, policy: ApprovalPolicy) -> Self {
        Self { pool, policy }
    }

    pub fn policy(&self) -> ApprovalPolicy {
        self.policy
    }

    /// Records one approver's verdict and moves the owning request or
    /// customization along the chain. Both writes commit together.
    pub async fn decide(
        &self,
        principal: Option<&Principal>,
        approval_id: &ApprovalId,
        decision: ApprovalDecision,
        comments: Option<String>,
    ) -> Result<Approval, WorkflowError> {
        let principal = authenticated(principal)?;
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let existing = approval::find_approval(&mut tx, approval_id).await?;
        let (_, existing) = check_preconditions(Some(principal), approval_id, existing.as_ref())?;
        if decision == ApprovalDecision::Pending {
            return Err(WorkflowError::Validation(
                "decision must be one of APPROVED|REJECTED|RETURNED".to_string(),
            ));
        }

        let now = Utc::now();
        let decided = apply_decision(existing, decision, comments, now);
        if !approval::record_decision(&mut tx, &decided).await? {
            return Err(WorkflowError::AlreadyDecided(decided.id.0.clone()));
        }

        let propagation = self.propagate(&mut tx, principal, &decided, now).await?;
        audit::insert_event(
            &mut tx,
            &AuditEvent::new(
                AuditEntity::Approval,
                &decided.id.0,
                "approval.decided",
                Some(&principal.user_id.0),
            )
            .with_metadata("decision", decided.decision.as_str())
            .with_metadata("level", decided.level.as_str())
            .with_metadata("entity_type", decided.entity_type.as_str())
            .with_metadata("entity_id", decided.entity_id.clone()),
        )
        .await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        info!(
            event_name = "approval.decided",
            approval_id = %decided.id.0,
            entity_type = decided.entity_type.as_str(),
            entity_id = %decided.entity_id,
            level = decided.level.as_str(),
            decision = decided.decision.as_str(),
            propagation = ?propagation,
            "approval decision recorded"
        );
        Ok(decided)
    }

    /// The caller's undecided approvals, oldest first.
    pub async fn pending_for(
        &self,
        principal: Option<&Principal>,
        limit: Option<u32>,
    ) -> Result<Vec<Approval>, WorkflowError> {
        let principal = authenticated(principal)?;
        let limit = limit.unwrap_or(DEFAULT_INBOX_LIMIT).clamp(1, MAX_INBOX_LIMIT);
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(approval::pending_for_approver(&mut conn, &principal.user_id, limit).await?)
    }

    /// Every vote cast on one request or customization, oldest first.
    /// Visible to the entity's requester and to reviewers.
    pub async fn approvals_for(
        &self,
        principal: Option<&Principal>,
        entity_type: ApprovalEntityType,
        entity_id: &str,
    ) -> Result<Vec<Approval>, WorkflowError> {
        let principal = authenticated(principal)?;
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        let (label, requester_id) = match entity_type {
            ApprovalEntityType::Request => (
                "request",
                request::find_request(&mut conn, &RequestId(entity_id.to_string()))
                    .await?
                    .map(|found| found.requester_id),
            ),
            ApprovalEntityType::Customization => (
                "customization",
                customization::find_customization(&mut conn, &CustomizationId(entity_id.to_string()))
                    .await?
                    .map(|found| found.requester_id),
            ),
        };
        let requester_id = requester_id.ok_or_else(|| WorkflowError::not_found(label, entity_id))?;
        if requester_id != principal.user_id && !principal.has_any_role(REVIEWER_ROLES) {
            return Err(WorkflowError::Forbidden(format!(
                "approvals on `{entity_id}` are visible to its requester and reviewers only"
            )));
        }
        Ok(approval::approvals_for_entity(&mut conn, entity_type, entity_id).await?)
    }

    async fn propagate(
        &self,
        conn: &mut SqliteConnection,
        principal: &Principal,
        decided: &Approval,
        now: DateTime<Utc>,
    ) -> Result<Propagation, WorkflowError> {
        let owner = load_owner(conn, decided).await?;

        let resolution = if owner
            .round_started_at
            .is_some_and(|started| decided.created_at < started)
        {
            Propagation::Skipped { reason: SkipReason::Superseded }
        } else {
            let peers: Vec<Approval> =
                approval::approvals_for_entity(conn, decided.entity_type, &decided.entity_id)
                    .await?
                    .into_iter()
                    .filter(|peer| {
                        owner.round_started_at.map_or(true, |started| peer.created_at >= started)
                    })
                    .collect();
            resolve_propagation(&self.policy, decided, &peers, owner.status)?
        };

        match resolution {
            Propagation::Apply { change } => {
                write_status(conn, decided, change, now).await?;
                audit::insert_event(
                    conn,
                    &AuditEvent::new(
                        audit_entity(decided.entity_type),
                        &decided.entity_id,
                        "status.propagated",
                        Some(&principal.user_id.0),
                    )
                    .with_metadata("approval_id", decided.id.0.clone())
                    .with_metadata("from", status_label(owner.status))
                    .with_metadata("to", change_label(change)),
                )
                .await?;
            }
            Propagation::Skipped { reason } => {
                warn!(
                    event_name = "approval.propagation_skipped",
                    approval_id = %decided.id.0,
                    entity_type = decided.entity_type.as_str(),
                    entity_id = %decided.entity_id,
                    reason = reason.as_str(),
                    "decision recorded without changing entity status"
                );
                audit::insert_event(
                    conn,
                    &AuditEvent::new(
                        audit_entity(decided.entity_type),
                        &decided.entity_id,
                        "status.propagation_skipped",
                        Some(&principal.user_id.0),
                    )
                    .skipped()
                    .with_metadata("approval_id", decided.id.0.clone())
                    .with_metadata("reason", reason.as_str()),
                )
                .await?;
            }
            Propagation::NoChange | Propagation::AwaitingPeers => {}
        }

        Ok(resolution)
    }
}

async fn load_owner(
    conn: &mut SqliteConnection,
    decided: &Approval,
) -> Result<OwningEntity, WorkflowError> {
    match decided.entity_type {
        ApprovalEntityType::Request => {
            let id = RequestId(decided.entity_id.clone());
            let owner = request::find_request(conn, &id)
                .await?
                .ok_or_else(|| WorkflowError::not_found("request", &decided.entity_id))?;
            Ok(OwningEntity {
                status: EntityStatus::Request(owner.status),
                round_started_at: owner.submitted_at,
            })
        }
        ApprovalEntityType::Customization => {
            let id = CustomizationId(decided.entity_id.clone());
            let owner = customization::find_customization(conn, &id)
                .await?
                .ok_or_else(|| WorkflowError::not_found("customization", &decided.entity_id))?;
            Ok(OwningEntity {
                status: EntityStatus::Customization(owner.status),
                round_started_at: Some(owner.created_at),
            })
        }
    }
}

async fn write_status(
    conn: &mut SqliteConnection,
    decided: &Approval,
    change: StatusChange,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    match change {
        StatusChange::Unchanged => {}
        StatusChange::Request(status) => {
            let id = RequestId(decided.entity_id.clone());
            let mut owner = request::find_request(conn, &id)
                .await?
                .ok_or_else(|| WorkflowError::not_found("request", &decided.entity_id))?;
            owner.status = status;
            owner.updated_at = now;
            request::update_request_status(conn, &owner).await?;
        }
        StatusChange::Customization(status) => {
            let id = CustomizationId(decided.entity_id.clone());
            customization::update_customization_status(conn, &id, status, now).await?;
        }
    }
    Ok(())
}

fn audit_entity(entity_type: ApprovalEntityType) -> AuditEntity {
    match entity_type {
        ApprovalEntityType::Request => AuditEntity::Request,
        ApprovalEntityType::Customization => AuditEntity::Customization,
    }
}

fn status_label(status: EntityStatus) -> &'static str {
    match status {
        EntityStatus::Request(status) => status.as_str(),
        EntityStatus::Customization(status) => status.as_str(),
    }
}

fn change_label(change: StatusChange) -> &'static str {
    match change {
        StatusChange::Unchanged => "UNCHANGED",
        StatusChange::Request(status) => status.as_str(),
        StatusChange::Customization(status) => status.as_str(),
    }
}
