use chrono::Utc;
use tracing::info;

use vmgate_core::audit::{AuditEntity, AuditEvent};
use vmgate_core::domain::request::{RequestId, RequestStatus};
use vmgate_core::domain::user::Principal;
use vmgate_core::domain::vm::{VmId, VmInstance, VmSpec, VmSpecId, VmStatus};
use vmgate_core::errors::WorkflowError;
use vmgate_core::intake::VmPlacement;

use super::{authenticated, new_id, require_any_role, OPERATOR_ROLES};
use crate::repositories::{audit, request, vm, RepositoryError};
use crate::DbPool;

#[derive(Clone)]
pub struct ProvisioningWorkflow {
    pool: DbPool,
}

impl ProvisioningWorkflow {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Materializes one VM per placement from an APPROVED request and marks
    /// the request PROVISIONED.
    pub async fn provision(
        &self,
        principal: Option<&Principal>,
        request_id: &RequestId,
        placements: Vec<VmPlacement>,
    ) -> Result<Vec<VmInstance>, WorkflowError> {
        let principal = authenticated(principal)?;
        require_any_role(principal, OPERATOR_ROLES, "provisioning")?;
        for placement in &placements {
            placement.validate()?;
        }

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let mut request = request::find_request(&mut tx, request_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("request", &request_id.0))?;
        if request.status != RequestStatus::Approved {
            return Err(WorkflowError::Validation(format!(
                "request `{}` is {}; only APPROVED requests can be provisioned",
                request.id.0,
                request.status.as_str()
            )));
        }
        if placements.len() != request.quantity as usize {
            return Err(WorkflowError::Validation(format!(
                "request `{}` asks for {} machine(s) but {} placement(s) were given",
                request.id.0,
                request.quantity,
                placements.len()
            )));
        }

        let now = Utc::now();
        let mut provisioned = Vec::with_capacity(placements.len());
        for (placement, sequence_number) in placements.into_iter().zip(1u32..) {
            let vm_id = VmId(new_id("VM"));
            let spec = VmSpec {
                id: VmSpecId(new_id("SPEC")),
                vm_id: vm_id.clone(),
                vcpu: request.hardware.vcpu,
                ram_gb: request.hardware.ram_gb,
                storage_gb: request.hardware.storage_gb,
                os_name: request.hardware.os_name.clone(),
                os_version: request.hardware.os_version.clone(),
                raid: request.hardware.raid,
                source_customization_id: None,
                effective_from: now,
            };
            let instance = VmInstance {
                id: vm_id,
                request_id: request.id.clone(),
                sequence_number,
                owner_id: Some(request.requester_id.clone()),
                hostname: placement.hostname.trim().to_string(),
                ip_address: placement.ip_address.trim().to_string(),
                public_ip_address: placement.public_ip_address.map(|ip| ip.trim().to_string()),
                status: VmStatus::Active,
                current_spec: Some(spec),
                provisioned_at: now,
                decommissioned_at: None,
            };

            vm::insert_vm(&mut tx, &instance).await?;
            if let Some(spec) = &instance.current_spec {
                vm::insert_spec(&mut tx, spec).await?;
                vm::set_current_spec(&mut tx, &instance.id, &spec.id).await?;
            }
            audit::insert_event(
                &mut tx,
                &AuditEvent::new(
                    AuditEntity::Vm,
                    &instance.id.0,
                    "vm.provisioned",
                    Some(&principal.user_id.0),
                )
                .with_metadata("request_id", request.id.0.clone())
                .with_metadata("hostname", instance.hostname.clone())
                .with_metadata("ip_address", instance.ip_address.clone()),
            )
            .await?;
            provisioned.push(instance);
        }

        request.status = RequestStatus::Provisioned;
        request.provisioned_at = Some(now);
        request.updated_at = now;
        request::update_request_status(&mut tx, &request).await?;
        audit::insert_event(
            &mut tx,
            &AuditEvent::new(
                AuditEntity::Request,
                &request.id.0,
                "request.provisioned",
                Some(&principal.user_id.0),
            )
            .with_metadata("vm_count", provisioned.len().to_string()),
        )
        .await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        info!(
            event_name = "request.provisioned",
            request_id = %request.id.0,
            vm_count = provisioned.len(),
            operator_id = %principal.user_id.0,
            "request provisioned"
        );
        Ok(provisioned)
    }
}
