//! Facility manpower returns. Submitters file and correct their own rows;
//! exporters and admins read every facility's.

use chrono::Utc;
use tracing::info;

use vmgate_core::audit::{AuditEntity, AuditEvent};
use vmgate_core::domain::manpower::{
    Designation, ManpowerSubmission, NewSubmission, SubmissionId, SubmissionQuery,
};
use vmgate_core::domain::page::Page;
use vmgate_core::domain::user::{Principal, Role};
use vmgate_core::errors::WorkflowError;

use super::{authenticated, new_id, require_any_role};
use crate::repositories::{audit, manpower, RepositoryError};
use crate::DbPool;

const SUBMITTER_ROLES: &[Role] = &[Role::Submitter];
const REPORTING_ROLES: &[Role] = &[Role::Exporter, Role::Admin];

#[derive(Clone)]
pub struct ManpowerService {
    pool: DbPool,
}

impl ManpowerService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn designations(
        &self,
        principal: Option<&Principal>,
    ) -> Result<Vec<Designation>, WorkflowError> {
        authenticated(principal)?;
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(manpower::list_designations(&mut conn).await?)
    }

    pub async fn submit(
        &self,
        principal: Option<&Principal>,
        input: NewSubmission,
    ) -> Result<ManpowerSubmission, WorkflowError> {
        let principal = authenticated(principal)?;
        require_any_role(principal, SUBMITTER_ROLES, "filing manpower returns")?;
        input.validate()?;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        if !manpower::designation_exists(&mut tx, &input.designation_id).await? {
            return Err(WorkflowError::Validation(format!(
                "unknown designation `{}`",
                input.designation_id.0
            )));
        }
        let now = Utc::now();
        let submission = input.into_submission(
            SubmissionId(new_id("SUB")),
            principal.user_id.clone(),
            now,
            now,
        );
        manpower::save_submission(&mut tx, &submission).await?;
        audit::insert_event(
            &mut tx,
            &AuditEvent::new(
                AuditEntity::Submission,
                &submission.id.0,
                "submission.created",
                Some(&principal.user_id.0),
            )
            .with_metadata("facility_code", submission.facility_code.clone())
            .with_metadata("designation_id", submission.designation_id.0.clone()),
        )
        .await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        info!(
            event_name = "submission.created",
            submission_id = %submission.id.0,
            facility_code = %submission.facility_code,
            submitter_id = %principal.user_id.0,
            "manpower return filed"
        );
        Ok(submission)
    }

    /// Corrects the counts and salary of the caller's own return. Facility
    /// and submission time stay as first filed.
    pub async fn update(
        &self,
        principal: Option<&Principal>,
        id: &SubmissionId,
        input: NewSubmission,
    ) -> Result<ManpowerSubmission, WorkflowError> {
        let principal = authenticated(principal)?;
        require_any_role(principal, SUBMITTER_ROLES, "correcting manpower returns")?;
        input.validate()?;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let existing = manpower::find_submission(&mut tx, id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("submission", &id.0))?;
        if existing.submitter_id != principal.user_id {
            return Err(WorkflowError::Forbidden(format!(
                "submission `{}` was filed by another user",
                id.0
            )));
        }
        if !manpower::designation_exists(&mut tx, &input.designation_id).await? {
            return Err(WorkflowError::Validation(format!(
                "unknown designation `{}`",
                input.designation_id.0
            )));
        }
        let mut updated = input.into_submission(
            existing.id,
            existing.submitter_id,
            existing.submitted_at,
            Utc::now(),
        );
        updated.facility_code = existing.facility_code;
        updated.facility_name = existing.facility_name;
        manpower::save_submission(&mut tx, &updated).await?;
        audit::insert_event(
            &mut tx,
            &AuditEvent::new(
                AuditEntity::Submission,
                &id.0,
                "submission.updated",
                Some(&principal.user_id.0),
            )
            .with_metadata("vacant", updated.vacant.to_string()),
        )
        .await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        info!(
            event_name = "submission.updated",
            submission_id = %id.0,
            submitter_id = %principal.user_id.0,
            "manpower return corrected"
        );
        Ok(updated)
    }

    /// Submitters page through their own returns; exporters and admins see
    /// every facility.
    pub async fn list(
        &self,
        principal: Option<&Principal>,
        query: &SubmissionQuery,
    ) -> Result<Page<ManpowerSubmission>, WorkflowError> {
        let principal = authenticated(principal)?;
        let submitter = if principal.has_any_role(REPORTING_ROLES) {
            None
        } else if principal.has_any_role(SUBMITTER_ROLES) {
            Some(&principal.user_id)
        } else {
            return Err(WorkflowError::Forbidden(
                "reading manpower returns requires SUBMITTER, EXPORTER or ADMIN".to_string(),
            ));
        };
        query.validate()?;
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        let (items, total) = manpower::list_submissions(&mut conn, query, submitter).await?;
        Ok(Page::for_query(items, total, query))
    }
}
