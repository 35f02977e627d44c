use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::persisted_enum;
use crate::domain::request::RequestId;
use crate::domain::user::UserId;
use crate::domain::vm::VmId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomizationId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustomizationStatus {
    PendingL1,
    PendingL2,
    PendingL3,
    Approved,
    Rejected,
    Closed,
}

persisted_enum!(CustomizationStatus, "customization status", {
    PendingL1 => "PENDING_L1",
    PendingL2 => "PENDING_L2",
    PendingL3 => "PENDING_L3",
    Approved => "APPROVED",
    Rejected => "REJECTED",
    Closed => "CLOSED",
});

impl CustomizationStatus {
    pub fn is_awaiting_approval(&self) -> bool {
        matches!(self, Self::PendingL1 | Self::PendingL2 | Self::PendingL3)
    }
}

/// A resource change on an existing VM. Only the requested fields are set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomizationRequest {
    pub id: CustomizationId,
    pub target_vm_id: VmId,
    pub requester_id: UserId,
    pub parent_request_id: Option<RequestId>,
    pub vcpu: Option<u32>,
    pub ram_gb: Option<u32>,
    pub storage_gb: Option<u32>,
    pub status: CustomizationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
