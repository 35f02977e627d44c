use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::approval::{Approval, ApprovalLevel};
use crate::domain::persisted_enum;
use crate::domain::user::UserId;
use crate::domain::vm::VmInstance;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Draft,
    PendingL1,
    PendingL2,
    PendingL3,
    Approved,
    Rejected,
    Provisioned,
}

persisted_enum!(RequestStatus, "request status", {
    Draft => "DRAFT",
    PendingL1 => "PENDING_L1",
    PendingL2 => "PENDING_L2",
    PendingL3 => "PENDING_L3",
    Approved => "APPROVED",
    Rejected => "REJECTED",
    Provisioned => "PROVISIONED",
});

impl RequestStatus {
    /// Position along the sign-off chain. `Rejected` sits outside the chain.
    pub fn rank(&self) -> Option<u8> {
        match self {
            Self::Draft => Some(0),
            Self::PendingL1 => Some(1),
            Self::PendingL2 => Some(2),
            Self::PendingL3 => Some(3),
            Self::Approved => Some(4),
            Self::Provisioned => Some(5),
            Self::Rejected => None,
        }
    }

    pub fn is_awaiting_approval(&self) -> bool {
        matches!(self, Self::PendingL1 | Self::PendingL2 | Self::PendingL3)
    }

    pub fn pending_at(level: ApprovalLevel) -> Self {
        match level {
            ApprovalLevel::L1 => Self::PendingL1,
            ApprovalLevel::L2 => Self::PendingL2,
            ApprovalLevel::L3 => Self::PendingL3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    NewVm,
    CloneVm,
    CustomizeVm,
}

persisted_enum!(RequestType, "request type", {
    NewVm => "NEW_VM",
    CloneVm => "CLONE_VM",
    CustomizeVm => "CUSTOMIZE_VM",
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

persisted_enum!(Environment, "environment", {
    Development => "DEVELOPMENT",
    Staging => "STAGING",
    Production => "PRODUCTION",
});

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RaidLevel {
    #[default]
    None,
    Raid0,
    Raid1,
    Raid5,
    Raid10,
}

persisted_enum!(RaidLevel, "raid level", {
    None => "NONE",
    Raid0 => "RAID0",
    Raid1 => "RAID1",
    Raid5 => "RAID5",
    Raid10 => "RAID10",
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NetworkAccessType {
    Internet,
    Intranet,
    Vpn,
    PublicIp,
}

persisted_enum!(NetworkAccessType, "network access type", {
    Internet => "INTERNET",
    Intranet => "INTRANET",
    Vpn => "VPN",
    PublicIp => "PUBLIC_IP",
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FirewallProtocol {
    Tcp,
    Udp,
}

persisted_enum!(FirewallProtocol, "firewall protocol", {
    Tcp => "TCP",
    Udp => "UDP",
});

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareSpec {
    pub vcpu: u32,
    pub ram_gb: u32,
    pub storage_gb: u32,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    #[serde(default)]
    pub raid: RaidLevel,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalDisk {
    pub sequence: u32,
    pub size_gb: u32,
    pub purpose: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallPort {
    pub port: u16,
    pub protocol: FirewallProtocol,
    pub purpose: Option<String>,
    pub source: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub quantity: u32,
    pub system_name: String,
    pub project_name: Option<String>,
    pub purpose: String,
    pub environment: Environment,
    pub expected_end_date: Option<NaiveDate>,
    pub hardware: HardwareSpec,
    pub requester_id: UserId,
    pub responsible_person_name: Option<String>,
    pub responsible_person_email: Option<String>,
    pub va_report_submitted: bool,
    pub additional_disks: Vec<AdditionalDisk>,
    pub firewall_ports: Vec<FirewallPort>,
    pub network_access: Vec<NetworkAccessType>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub provisioned_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// A request together with its approval trail and provisioned machines.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDetail {
    #[serde(flatten)]
    pub request: Request,
    pub approvals: Vec<Approval>,
    pub vm_instances: Vec<VmInstance>,
}
