use chrono::Utc;
use tracing::info;

use vmgate_core::audit::{AuditEntity, AuditEvent};
use vmgate_core::domain::user::Principal;
use vmgate_core::domain::page::Page;
use vmgate_core::domain::vm::{VmDetail, VmId, VmInstance, VmQuery, VmStatus, VmSummary};
use vmgate_core::errors::WorkflowError;

use super::{authenticated, require_any_role, OPERATOR_ROLES, REVIEWER_ROLES};
use crate::repositories::{audit, customization, vm, RepositoryError};
use crate::DbPool;

pub const DEFAULT_AUDIT_LIMIT: u32 = 20;
const MAX_AUDIT_LIMIT: u32 = 200;

#[derive(Clone)]
pub struct InventoryService {
    pool: DbPool,
}

impl InventoryService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Reviewers and operators page through every VM; anyone else sees only
    /// the machines they own.
    pub async fn list_vms(
        &self,
        principal: Option<&Principal>,
        query: &VmQuery,
    ) -> Result<Page<VmSummary>, WorkflowError> {
        let principal = authenticated(principal)?;
        let owner = (!principal.has_any_role(REVIEWER_ROLES)).then_some(&principal.user_id);
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        let (items, total) = vm::list_summaries(&mut conn, query, owner).await?;
        Ok(Page::for_query(items, total, query))
    }

    pub async fn vm_detail(
        &self,
        principal: Option<&Principal>,
        vm_id: &VmId,
    ) -> Result<VmDetail, WorkflowError> {
        let principal = authenticated(principal)?;
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        let summary = vm::find_summary(&mut conn, vm_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("vm", &vm_id.0))?;
        if !owns(principal, &summary.vm) && !principal.has_any_role(REVIEWER_ROLES) {
            return Err(WorkflowError::Forbidden(format!(
                "vm `{}` belongs to another owner",
                vm_id.0
            )));
        }
        let open_customizations =
            customization::open_customizations_for_vm(&mut conn, vm_id).await?;
        Ok(VmDetail { summary, open_customizations })
    }

    /// Latest audit entries for a VM, newest first. Operators and the VM's
    /// owner only.
    pub async fn audit_log(
        &self,
        principal: Option<&Principal>,
        vm_id: &VmId,
        limit: Option<u32>,
    ) -> Result<Vec<AuditEvent>, WorkflowError> {
        let principal = authenticated(principal)?;
        let limit = limit.unwrap_or(DEFAULT_AUDIT_LIMIT).clamp(1, MAX_AUDIT_LIMIT);
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        let target = vm::find_vm(&mut conn, vm_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("vm", &vm_id.0))?;
        if !owns(principal, &target) {
            require_any_role(principal, OPERATOR_ROLES, "reading another owner's vm audit")?;
        }
        Ok(audit::events_for_entity(&mut conn, AuditEntity::Vm, &vm_id.0, limit).await?)
    }

    /// Retires the VM and closes every customization still waiting on it.
    pub async fn decommission(
        &self,
        principal: Option<&Principal>,
        vm_id: &VmId,
        reason: Option<String>,
    ) -> Result<VmInstance, WorkflowError> {
        let principal = authenticated(principal)?;
        require_any_role(principal, OPERATOR_ROLES, "decommissioning")?;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let target = vm::find_vm(&mut tx, vm_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("vm", &vm_id.0))?;
        if target.status == VmStatus::Retired {
            return Err(WorkflowError::Validation(format!("vm `{}` is already retired", vm_id.0)));
        }

        let now = Utc::now();
        vm::retire_vm(&mut tx, vm_id, now).await?;
        let closed = customization::close_open_customizations(&mut tx, vm_id, now).await?;

        let mut event =
            AuditEvent::new(AuditEntity::Vm, &vm_id.0, "vm.decommissioned", Some(&principal.user_id.0))
                .with_metadata("closed_customizations", closed.len().to_string());
        if let Some(reason) = reason.map(|text| text.trim().to_string()).filter(|t| !t.is_empty()) {
            event = event.with_metadata("reason", reason);
        }
        audit::insert_event(&mut tx, &event).await?;
        for id in &closed {
            audit::insert_event(
                &mut tx,
                &AuditEvent::new(
                    AuditEntity::Customization,
                    &id.0,
                    "customization.closed",
                    Some(&principal.user_id.0),
                )
                .with_metadata("vm_id", vm_id.0.clone()),
            )
            .await?;
        }

        let retired = vm::find_vm(&mut tx, vm_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("vm", &vm_id.0))?;
        tx.commit().await.map_err(RepositoryError::from)?;

        info!(
            event_name = "vm.decommissioned",
            vm_id = %vm_id.0,
            closed_customizations = closed.len(),
            operator_id = %principal.user_id.0,
            "vm decommissioned"
        );
        Ok(retired)
    }
}

fn owns(principal: &Principal, vm: &VmInstance) -> bool {
    vm.owner_id.as_ref() == Some(&principal.user_id)
}

#[cfg(test)]
mod tests {
    use vmgate_core::domain::customization::CustomizationStatus;
    use vmgate_core::domain::user::Role;
    use vmgate_core::domain::vm::{VmId, VmQuery, VmStatus};
    use vmgate_core::errors::WorkflowError;

    use super::InventoryService;
    use crate::repositories::customization;
    use crate::workflow::customization::tests::{more_ram, provisioned_vm};
    use crate::workflow::provisioning::tests::{approved_request, placement};
    use crate::workflow::testing::{add_user, migrated_pool};
    use crate::workflow::{CustomizationWorkflow, ProvisioningWorkflow};

    #[tokio::test]
    async fn list_filters_searches_and_pages() {
        let pool = migrated_pool().await;
        let owner = add_user(&pool, "req", vec![Role::Requester]).await;
        let ops = add_user(&pool, "ops", vec![Role::DcOps]).await;
        let approved = approved_request(&pool, &owner, 3).await;
        ProvisioningWorkflow::new(pool.clone())
            .provision(Some(&ops), &approved.id, vec![placement(1), placement(2), placement(3)])
            .await
            .expect("provision");
        let inventory = InventoryService::new(pool.clone());

        let page = inventory
            .list_vms(Some(&ops), &VmQuery { per_page: Some(2), ..VmQuery::default() })
            .await
            .expect("first page");
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);

        let by_host = inventory
            .list_vms(Some(&ops), &VmQuery { search: Some("BILLING-02".into()), ..VmQuery::default() })
            .await
            .expect("search by hostname");
        assert_eq!(by_host.total, 1);
        assert_eq!(by_host.items[0].vm.hostname, "billing-02");

        let by_system = inventory
            .list_vms(Some(&ops), &VmQuery { search: Some("billing api".into()), ..VmQuery::default() })
            .await
            .expect("search by system name");
        assert_eq!(by_system.total, 3);

        let by_ip = inventory
            .list_vms(Some(&ops), &VmQuery { search: Some("10.20.0.3".into()), ..VmQuery::default() })
            .await
            .expect("search by ip");
        assert_eq!(by_ip.total, 1);

        let retired = inventory
            .list_vms(Some(&ops), &VmQuery { status: Some(VmStatus::Retired), ..VmQuery::default() })
            .await
            .expect("status filter");
        assert_eq!(retired.total, 0);
    }

    #[tokio::test]
    async fn decommission_closes_only_that_vms_pending_customizations() {
        let pool = migrated_pool().await;
        let owner = add_user(&pool, "req", vec![Role::Requester]).await;
        let ops = add_user(&pool, "ops", vec![Role::DcOps]).await;
        add_user(&pool, "l1", vec![Role::ApproverL1]).await;
        let doomed = provisioned_vm(&pool, &owner, &ops).await;
        let kept = provisioned_vm(&pool, &owner, &ops).await;
        let customizations = CustomizationWorkflow::new(pool.clone());
        let doomed_change =
            customizations.create(Some(&owner), more_ram(&doomed.id)).await.expect("create");
        let kept_change =
            customizations.create(Some(&owner), more_ram(&kept.id)).await.expect("create");
        let inventory = InventoryService::new(pool.clone());

        let detail = inventory.vm_detail(Some(&owner), &doomed.id).await.expect("detail");
        assert_eq!(detail.open_customizations.len(), 1);

        let retired = inventory
            .decommission(Some(&ops), &doomed.id, Some("end of project".into()))
            .await
            .expect("decommission");
        assert_eq!(retired.status, VmStatus::Retired);
        assert!(retired.decommissioned_at.is_some());

        let mut conn = pool.acquire().await.expect("conn");
        let doomed_status = customization::find_customization(&mut conn, &doomed_change.id)
            .await
            .expect("find")
            .expect("exists")
            .status;
        let kept_status = customization::find_customization(&mut conn, &kept_change.id)
            .await
            .expect("find")
            .expect("exists")
            .status;
        drop(conn);
        assert_eq!(doomed_status, CustomizationStatus::Closed);
        assert_eq!(kept_status, CustomizationStatus::PendingL1);

        let again = inventory.decommission(Some(&ops), &doomed.id, None).await;
        assert!(matches!(again, Err(WorkflowError::Validation(_))));

        let trail = inventory.audit_log(Some(&owner), &doomed.id, None).await.expect("audit");
        assert_eq!(trail[0].action, "vm.decommissioned");
        assert_eq!(trail[0].metadata.get("reason").map(String::as_str), Some("end of project"));
        assert!(trail.iter().any(|event| event.action == "vm.provisioned"));
    }

    #[tokio::test]
    async fn decommission_requires_operator_and_known_vm() {
        let pool = migrated_pool().await;
        let owner = add_user(&pool, "req", vec![Role::Requester]).await;
        let ops = add_user(&pool, "ops", vec![Role::Admin]).await;
        let vm = provisioned_vm(&pool, &owner, &ops).await;
        let inventory = InventoryService::new(pool);

        let forbidden = inventory.decommission(Some(&owner), &vm.id, None).await;
        assert!(matches!(forbidden, Err(WorkflowError::Forbidden(_))));

        let missing = VmId("VM-missing".into());
        assert!(matches!(
            inventory.decommission(Some(&ops), &missing, None).await,
            Err(WorkflowError::NotFound { entity: "vm", .. })
        ));
        assert!(matches!(
            inventory.audit_log(Some(&ops), &missing, None).await,
            Err(WorkflowError::NotFound { .. })
        ));
        assert!(matches!(
            inventory.vm_detail(Some(&ops), &missing).await,
            Err(WorkflowError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn inventory_reads_are_scoped_to_owner_or_staff() {
        let pool = migrated_pool().await;
        let owner = add_user(&pool, "req", vec![Role::Requester]).await;
        let stranger = add_user(&pool, "other", vec![Role::Requester]).await;
        let approver = add_user(&pool, "l2", vec![Role::ApproverL2]).await;
        let ops = add_user(&pool, "ops", vec![Role::DcOps]).await;
        let vm = provisioned_vm(&pool, &owner, &ops).await;
        let inventory = InventoryService::new(pool);

        assert!(matches!(
            inventory.list_vms(None, &VmQuery::default()).await,
            Err(WorkflowError::Unauthorized)
        ));
        assert!(matches!(inventory.vm_detail(None, &vm.id).await, Err(WorkflowError::Unauthorized)));
        assert!(matches!(
            inventory.audit_log(None, &vm.id, None).await,
            Err(WorkflowError::Unauthorized)
        ));

        let own = inventory.list_vms(Some(&owner), &VmQuery::default()).await.expect("own list");
        assert_eq!(own.total, 1);
        let none = inventory.list_vms(Some(&stranger), &VmQuery::default()).await.expect("list");
        assert_eq!(none.total, 0);
        let all = inventory.list_vms(Some(&approver), &VmQuery::default()).await.expect("list");
        assert_eq!(all.total, 1);

        assert!(matches!(
            inventory.vm_detail(Some(&stranger), &vm.id).await,
            Err(WorkflowError::Forbidden(_))
        ));
        inventory.vm_detail(Some(&approver), &vm.id).await.expect("reviewer detail");

        assert!(matches!(
            inventory.audit_log(Some(&approver), &vm.id, None).await,
            Err(WorkflowError::Forbidden(_))
        ));
        inventory.audit_log(Some(&owner), &vm.id, None).await.expect("owner audit");
        inventory.audit_log(Some(&ops), &vm.id, None).await.expect("operator audit");
    }

    #[tokio::test]
    async fn search_treats_wildcards_literally() {
        let pool = migrated_pool().await;
        let owner = add_user(&pool, "req", vec![Role::Requester]).await;
        let ops = add_user(&pool, "ops", vec![Role::DcOps]).await;
        let approved = approved_request(&pool, &owner, 2).await;
        ProvisioningWorkflow::new(pool.clone())
            .provision(Some(&ops), &approved.id, vec![placement(1), placement(2)])
            .await
            .expect("provision");
        let inventory = InventoryService::new(pool);

        for term in ["%", "_", "billing_0%"] {
            let page = inventory
                .list_vms(Some(&ops), &VmQuery { search: Some(term.into()), ..VmQuery::default() })
                .await
                .expect("search");
            assert_eq!(page.total, 0, "`{term}` matched as a wildcard");
        }
        let literal = inventory
            .list_vms(Some(&ops), &VmQuery { search: Some("billing-0".into()), ..VmQuery::default() })
            .await
            .expect("search");
        assert_eq!(literal.total, 2);
    }
}
