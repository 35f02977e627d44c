use chrono::Utc;
use tracing::info;

use vmgate_core::approvals::approval_batch;
use vmgate_core::audit::{AuditEntity, AuditEvent};
use vmgate_core::domain::approval::ApprovalEntityType;
use vmgate_core::domain::customization::{
    CustomizationId, CustomizationRequest, CustomizationStatus,
};
use vmgate_core::domain::user::Principal;
use vmgate_core::domain::vm::{VmInstance, VmSpec, VmSpecId, VmStatus};
use vmgate_core::errors::WorkflowError;
use vmgate_core::intake::NewCustomization;

use super::{authenticated, new_id, require_any_role, OPERATOR_ROLES};
use crate::repositories::{approval, audit, customization, request, user, vm, RepositoryError};
use crate::DbPool;

#[derive(Clone)]
pub struct CustomizationWorkflow {
    pool: DbPool,
}

impl CustomizationWorkflow {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Opens a resource change on one of the caller's VMs and sends it
    /// through the approval chain.
    pub async fn create(
        &self,
        principal: Option<&Principal>,
        input: NewCustomization,
    ) -> Result<CustomizationRequest, WorkflowError> {
        let principal = authenticated(principal)?;
        input.validate()?;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let target = vm::find_vm(&mut tx, &input.target_vm_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("vm", &input.target_vm_id.0))?;
        if target.owner_id.as_ref() != Some(&principal.user_id) {
            return Err(WorkflowError::Forbidden(format!(
                "vm `{}` is owned by another user",
                target.id.0
            )));
        }
        if target.status == VmStatus::Retired {
            return Err(WorkflowError::Validation(format!(
                "vm `{}` is retired and cannot be customized",
                target.id.0
            )));
        }
        if let Some(parent_id) = &input.parent_request_id {
            let parent = request::find_request(&mut tx, parent_id)
                .await?
                .ok_or_else(|| WorkflowError::not_found("request", &parent_id.0))?;
            if parent.requester_id != principal.user_id {
                return Err(WorkflowError::Forbidden(format!(
                    "request `{}` belongs to another requester",
                    parent.id.0
                )));
            }
        }

        let now = Utc::now();
        let customization = CustomizationRequest {
            id: CustomizationId(new_id("CUS")),
            target_vm_id: target.id.clone(),
            requester_id: principal.user_id.clone(),
            parent_request_id: input.parent_request_id,
            vcpu: input.vcpu,
            ram_gb: input.ram_gb,
            storage_gb: input.storage_gb,
            status: CustomizationStatus::PendingL1,
            created_at: now,
            updated_at: now,
        };

        let approvers = user::list_approvers(&mut tx).await?;
        let batch =
            approval_batch(ApprovalEntityType::Customization, &customization.id.0, &approvers, now);
        if batch.is_empty() {
            return Err(WorkflowError::Validation(
                "no approvers are configured; assign APPROVER_L1..L3 roles first".to_string(),
            ));
        }

        customization::insert_customization(&mut tx, &customization).await?;
        for pending in &batch {
            approval::insert_approval(&mut tx, pending).await?;
        }
        audit::insert_event(
            &mut tx,
            &AuditEvent::new(
                AuditEntity::Customization,
                &customization.id.0,
                "customization.created",
                Some(&principal.user_id.0),
            )
            .with_metadata("approvals_created", batch.len().to_string()),
        )
        .await?;
        audit::insert_event(
            &mut tx,
            &AuditEvent::new(
                AuditEntity::Vm,
                &target.id.0,
                "vm.customization_requested",
                Some(&principal.user_id.0),
            )
            .with_metadata("customization_id", customization.id.0.clone()),
        )
        .await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        info!(
            event_name = "customization.created",
            customization_id = %customization.id.0,
            vm_id = %target.id.0,
            approvals_created = batch.len(),
            "customization submitted for approval"
        );
        Ok(customization)
    }

    /// Writes the approved resources as a new spec revision and makes it the
    /// VM's current spec. Fields the customization leaves empty carry over.
    pub async fn apply(
        &self,
        principal: Option<&Principal>,
        customization_id: &CustomizationId,
    ) -> Result<VmInstance, WorkflowError> {
        let principal = authenticated(principal)?;
        require_any_role(principal, OPERATOR_ROLES, "applying a customization")?;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let change = customization::find_customization(&mut tx, customization_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("customization", &customization_id.0))?;
        if change.status != CustomizationStatus::Approved {
            return Err(WorkflowError::Validation(format!(
                "customization `{}` is {}; only APPROVED customizations can be applied",
                change.id.0,
                change.status.as_str()
            )));
        }
        if vm::customization_applied(&mut tx, &change.id).await? {
            return Err(WorkflowError::Validation(format!(
                "customization `{}` has already been applied",
                change.id.0
            )));
        }

        let target = vm::find_vm(&mut tx, &change.target_vm_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("vm", &change.target_vm_id.0))?;
        if target.status == VmStatus::Retired {
            return Err(WorkflowError::Validation(format!(
                "vm `{}` is retired and cannot be customized",
                target.id.0
            )));
        }

        let base = match &target.current_spec {
            Some(spec) => spec.clone(),
            None => {
                let origin = request::find_request(&mut tx, &target.request_id)
                    .await?
                    .ok_or_else(|| WorkflowError::not_found("request", &target.request_id.0))?;
                VmSpec {
                    id: VmSpecId(String::new()),
                    vm_id: target.id.clone(),
                    vcpu: origin.hardware.vcpu,
                    ram_gb: origin.hardware.ram_gb,
                    storage_gb: origin.hardware.storage_gb,
                    os_name: origin.hardware.os_name,
                    os_version: origin.hardware.os_version,
                    raid: origin.hardware.raid,
                    source_customization_id: None,
                    effective_from: target.provisioned_at,
                }
            }
        };

        let now = Utc::now();
        let revised = VmSpec {
            id: VmSpecId(new_id("SPEC")),
            vcpu: change.vcpu.unwrap_or(base.vcpu),
            ram_gb: change.ram_gb.unwrap_or(base.ram_gb),
            storage_gb: change.storage_gb.unwrap_or(base.storage_gb),
            source_customization_id: Some(change.id.clone()),
            effective_from: now,
            ..base.clone()
        };
        vm::insert_spec(&mut tx, &revised).await?;
        vm::set_current_spec(&mut tx, &target.id, &revised.id).await?;
        audit::insert_event(
            &mut tx,
            &AuditEvent::new(
                AuditEntity::Vm,
                &target.id.0,
                "vm.customization_applied",
                Some(&principal.user_id.0),
            )
            .with_metadata("customization_id", change.id.0.clone())
            .with_metadata("vcpu", format!("{} -> {}", base.vcpu, revised.vcpu))
            .with_metadata("ram_gb", format!("{} -> {}", base.ram_gb, revised.ram_gb))
            .with_metadata("storage_gb", format!("{} -> {}", base.storage_gb, revised.storage_gb)),
        )
        .await?;

        let updated = vm::find_vm(&mut tx, &target.id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("vm", &target.id.0))?;
        tx.commit().await.map_err(RepositoryError::from)?;

        info!(
            event_name = "customization.applied",
            customization_id = %change.id.0,
            vm_id = %target.id.0,
            spec_id = %revised.id.0,
            "customization applied to vm"
        );
        Ok(updated)
    }
}
