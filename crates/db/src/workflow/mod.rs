//! Transactional use cases. Each operation opens one transaction, runs the
//! pure rules from `vmgate_core`, writes the affected rows plus an audit
//! entry, and commits. Any error drops the transaction and rolls back.

use vmgate_core::approvals::ApprovalPolicy;
use vmgate_core::domain::user::{Principal, Role};
use vmgate_core::errors::WorkflowError;

use crate::DbPool;

pub mod approval;
pub mod catalog;
pub mod customization;
pub mod inventory;
pub mod manpower;
pub mod provisioning;
pub mod request;

pub use approval::ApprovalWorkflow;
pub use catalog::CatalogService;
pub use customization::CustomizationWorkflow;
pub use inventory::InventoryService;
pub use manpower::ManpowerService;
pub use provisioning::ProvisioningWorkflow;
pub use request::RequestWorkflow;

/// Roles allowed to run data-center operations.
pub(crate) const OPERATOR_ROLES: &[Role] = &[Role::DcOps, Role::Admin];

/// Roles that may read any request or VM, not only their own.
pub(crate) const REVIEWER_ROLES: &[Role] =
    &[Role::ApproverL1, Role::ApproverL2, Role::ApproverL3, Role::DcOps, Role::Admin];

/// Every workflow service over one pool.
#[derive(Clone)]
pub struct Workflows {
    pub approvals: ApprovalWorkflow,
    pub requests: RequestWorkflow,
    pub provisioning: ProvisioningWorkflow,
    pub customizations: CustomizationWorkflow,
    pub inventory: InventoryService,
    pub catalog: CatalogService,
    pub manpower: ManpowerService,
}

impl Workflows {
    pub fn new(pool: DbPool, policy: ApprovalPolicy) -> Self {
        Self {
            approvals: ApprovalWorkflow::new(pool.clone(), policy),
            requests: RequestWorkflow::new(pool.clone()),
            provisioning: ProvisioningWorkflow::new(pool.clone()),
            customizations: CustomizationWorkflow::new(pool.clone()),
            inventory: InventoryService::new(pool.clone()),
            catalog: CatalogService::new(pool.clone()),
            manpower: ManpowerService::new(pool),
        }
    }
}

pub(crate) fn authenticated(principal: Option<&Principal>) -> Result<&Principal, WorkflowError> {
    principal.ok_or(WorkflowError::Unauthorized)
}

pub(crate) fn require_any_role(
    principal: &Principal,
    roles: &[Role],
    action: &str,
) -> Result<(), WorkflowError> {
    if principal.has_any_role(roles) {
        return Ok(());
    }
    let allowed = roles.iter().map(Role::as_str).collect::<Vec<_>>().join(" or ");
    Err(WorkflowError::Forbidden(format!("{action} requires {allowed}")))
}

pub(crate) fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}
