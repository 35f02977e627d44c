use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::customization::{CustomizationId, CustomizationRequest};
use crate::domain::page::{search_term, Paged};
use crate::domain::persisted_enum;
use crate::domain::request::{Environment, RaidLevel, RequestId};
use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VmId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VmSpecId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VmStatus {
    Active,
    Suspended,
    Retired,
}

persisted_enum!(VmStatus, "vm status", {
    Active => "ACTIVE",
    Suspended => "SUSPENDED",
    Retired => "RETIRED",
});

/// A resource specification snapshot. A VM keeps every spec it ever had;
/// `VmInstance::current_spec` is the one in effect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmSpec {
    pub id: VmSpecId,
    pub vm_id: VmId,
    pub vcpu: u32,
    pub ram_gb: u32,
    pub storage_gb: u32,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub raid: RaidLevel,
    pub source_customization_id: Option<CustomizationId>,
    pub effective_from: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmInstance {
    pub id: VmId,
    pub request_id: RequestId,
    pub sequence_number: u32,
    pub owner_id: Option<UserId>,
    pub hostname: String,
    pub ip_address: String,
    pub public_ip_address: Option<String>,
    pub status: VmStatus,
    pub current_spec: Option<VmSpec>,
    pub provisioned_at: DateTime<Utc>,
    pub decommissioned_at: Option<DateTime<Utc>>,
}

/// A row in the inventory listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmSummary {
    #[serde(flatten)]
    pub vm: VmInstance,
    pub system_name: String,
    pub environment: Environment,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmDetail {
    #[serde(flatten)]
    pub summary: VmSummary,
    pub open_customizations: Vec<CustomizationRequest>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<VmStatus>,
    pub search: Option<String>,
}

impl Paged for VmQuery {
    fn requested_page(&self) -> Option<u32> {
        self.page
    }

    fn requested_per_page(&self) -> Option<u32> {
        self.per_page
    }
}

impl VmQuery {
    pub fn search_term(&self) -> Option<&str> {
        search_term(self.search.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::VmQuery;
    use crate::domain::page::Paged;

    #[test]
    fn query_defaults_and_clamps_pagination() {
        let query = VmQuery::default();
        assert_eq!(query.page(), 1);
        assert_eq!(query.per_page(), 10);
        assert_eq!(query.offset(), 0);

        let query = VmQuery { page: Some(3), per_page: Some(500), ..VmQuery::default() };
        assert_eq!(query.per_page(), 100);
        assert_eq!(query.offset(), 200);
    }

    #[test]
    fn blank_search_is_ignored() {
        let query = VmQuery { search: Some("   ".to_string()), ..VmQuery::default() };
        assert_eq!(query.search_term(), None);
    }
}
