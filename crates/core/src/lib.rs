pub mod approvals;
pub mod audit;
pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod intake;

pub use approvals::{
    ApprovalPolicy, CustomizationReturnPolicy, EntityStatus, LevelQuorum, Propagation,
    SkipReason, StatusChange,
};
pub use audit::{AuditEntity, AuditEvent, AuditOutcome};
pub use auth::SessionToken;
pub use domain::approval::{
    Approval, ApprovalDecision, ApprovalEntityType, ApprovalId, ApprovalLevel,
};
pub use domain::customization::{CustomizationId, CustomizationRequest, CustomizationStatus};
pub use domain::page::{Page, Paged};
pub use domain::request::{Request, RequestDetail, RequestId, RequestStatus};
pub use domain::user::{Principal, Role, User, UserId};
pub use domain::vm::{VmDetail, VmId, VmInstance, VmQuery, VmSpec, VmStatus, VmSummary};
pub use errors::{DomainError, InterfaceError, WorkflowError};
pub use intake::{NewCustomization, NewRequest, VmPlacement};
