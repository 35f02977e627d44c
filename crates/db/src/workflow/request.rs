use chrono::Utc;
use tracing::info;

use vmgate_core::approvals::approval_batch;
use vmgate_core::audit::{AuditEntity, AuditEvent};
use vmgate_core::domain::approval::ApprovalEntityType;
use vmgate_core::domain::request::{
    AdditionalDisk, Environment, Request, RequestDetail, RequestId, RequestStatus,
};
use vmgate_core::domain::user::{Principal, Role};
use vmgate_core::errors::WorkflowError;
use vmgate_core::intake::NewRequest;

use super::{authenticated, new_id, require_any_role, REVIEWER_ROLES};
use crate::repositories::{approval, audit, request, user, vm, RepositoryError};
use crate::DbPool;

#[derive(Clone)]
pub struct RequestWorkflow {
    pool: DbPool,
}

impl RequestWorkflow {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Stores a validated request form as a DRAFT owned by the caller.
    pub async fn create(
        &self,
        principal: Option<&Principal>,
        input: NewRequest,
    ) -> Result<Request, WorkflowError> {
        let principal = authenticated(principal)?;
        require_any_role(principal, &[Role::Requester], "creating a request")?;
        input.validate()?;

        let request = draft_from(input.normalized(), principal);
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        request::save_request(&mut tx, &request).await?;
        audit::insert_event(
            &mut tx,
            &AuditEvent::new(
                AuditEntity::Request,
                &request.id.0,
                "request.created",
                Some(&principal.user_id.0),
            )
            .with_metadata("request_type", request.request_type.as_str())
            .with_metadata("quantity", request.quantity.to_string()),
        )
        .await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        info!(
            event_name = "request.created",
            request_id = %request.id.0,
            requester_id = %principal.user_id.0,
            environment = request.environment.as_str(),
            "request draft created"
        );
        Ok(request)
    }

    /// Moves a DRAFT into the approval chain and fans out one PENDING
    /// approval per approver role holder.
    pub async fn submit(
        &self,
        principal: Option<&Principal>,
        request_id: &RequestId,
    ) -> Result<Request, WorkflowError> {
        let principal = authenticated(principal)?;
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let mut request = request::find_request(&mut tx, request_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("request", &request_id.0))?;
        if request.requester_id != principal.user_id {
            return Err(WorkflowError::Forbidden(format!(
                "request `{}` belongs to another requester",
                request.id.0
            )));
        }
        if request.status != RequestStatus::Draft {
            return Err(WorkflowError::Validation(format!(
                "request `{}` is {} and cannot be submitted",
                request.id.0,
                request.status.as_str()
            )));
        }
        if request.environment == Environment::Production && !request.va_report_submitted {
            return Err(WorkflowError::Validation(
                "production requests require a submitted vulnerability assessment report"
                    .to_string(),
            ));
        }

        let now = Utc::now();
        let approvers = user::list_approvers(&mut tx).await?;
        let batch = approval_batch(ApprovalEntityType::Request, &request.id.0, &approvers, now);
        if batch.is_empty() {
            return Err(WorkflowError::Validation(
                "no approvers are configured; assign APPROVER_L1..L3 roles first".to_string(),
            ));
        }

        request.status = RequestStatus::PendingL1;
        request.submitted_at = Some(now);
        request.updated_at = now;
        request::update_request_status(&mut tx, &request).await?;
        for pending in &batch {
            approval::insert_approval(&mut tx, pending).await?;
        }
        audit::insert_event(
            &mut tx,
            &AuditEvent::new(
                AuditEntity::Request,
                &request.id.0,
                "request.submitted",
                Some(&principal.user_id.0),
            )
            .with_metadata("approvals_created", batch.len().to_string()),
        )
        .await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        info!(
            event_name = "request.submitted",
            request_id = %request.id.0,
            approvals_created = batch.len(),
            "request submitted for approval"
        );
        Ok(request)
    }

    /// The request with its approval trail and provisioned machines.
    pub async fn get(
        &self,
        principal: Option<&Principal>,
        request_id: &RequestId,
    ) -> Result<RequestDetail, WorkflowError> {
        let principal = authenticated(principal)?;
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;

        let request = request::find_request(&mut conn, request_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("request", &request_id.0))?;
        if request.requester_id != principal.user_id && !principal.has_any_role(REVIEWER_ROLES) {
            return Err(WorkflowError::Forbidden(format!(
                "request `{}` belongs to another requester",
                request.id.0
            )));
        }

        let approvals =
            approval::approvals_for_entity(&mut conn, ApprovalEntityType::Request, &request.id.0)
                .await?;
        let vm_instances = vm::vms_for_request(&mut conn, &request.id).await?;
        Ok(RequestDetail { request, approvals, vm_instances })
    }

    /// The caller's own requests, newest first.
    pub async fn list_mine(
        &self,
        principal: Option<&Principal>,
    ) -> Result<Vec<Request>, WorkflowError> {
        let principal = authenticated(principal)?;
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(request::requests_for_requester(&mut conn, &principal.user_id).await?)
    }

    /// Form data for a new request cloned from one of the caller's own.
    pub async fn copy_source(
        &self,
        principal: Option<&Principal>,
        request_id: &RequestId,
    ) -> Result<NewRequest, WorkflowError> {
        let principal = authenticated(principal)?;
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;

        let request = request::find_request(&mut conn, request_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("request", &request_id.0))?;
        if request.requester_id != principal.user_id {
            return Err(WorkflowError::Forbidden(format!(
                "request `{}` belongs to another requester",
                request.id.0
            )));
        }
        Ok(NewRequest::from_existing(&request))
    }
}

fn draft_from(input: NewRequest, principal: &Principal) -> Request {
    let now = Utc::now();
    let additional_disks = input
        .additional_disks
        .into_iter()
        .zip(1u32..)
        .map(|(disk, sequence)| AdditionalDisk {
            sequence,
            size_gb: disk.size_gb,
            purpose: disk.purpose,
        })
        .collect();

    Request {
        id: RequestId(new_id("REQ")),
        request_type: input.request_type,
        status: RequestStatus::Draft,
        quantity: input.quantity,
        system_name: input.system_name,
        project_name: input.project_name,
        purpose: input.purpose,
        environment: input.environment,
        expected_end_date: input.expected_end_date,
        hardware: input.hardware,
        requester_id: principal.user_id.clone(),
        responsible_person_name: input.responsible_person_name,
        responsible_person_email: input.responsible_person_email,
        va_report_submitted: input.va_report_submitted,
        additional_disks,
        firewall_ports: input.firewall_ports,
        network_access: input.network_access,
        created_at: now,
        submitted_at: None,
        provisioned_at: None,
        updated_at: now,
    }
}
