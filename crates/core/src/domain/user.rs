use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::approval::ApprovalLevel;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Requester,
    ApproverL1,
    ApproverL2,
    ApproverL3,
    DcOps,
    Admin,
    /// Files manpower submissions for their facility.
    Submitter,
    /// Reads manpower submissions across every facility.
    Exporter,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::Requester,
        Role::ApproverL1,
        Role::ApproverL2,
        Role::ApproverL3,
        Role::DcOps,
        Role::Admin,
        Role::Submitter,
        Role::Exporter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requester => "REQUESTER",
            Self::ApproverL1 => "APPROVER_L1",
            Self::ApproverL2 => "APPROVER_L2",
            Self::ApproverL3 => "APPROVER_L3",
            Self::DcOps => "DC_OPS",
            Self::Admin => "ADMIN",
            Self::Submitter => "SUBMITTER",
            Self::Exporter => "EXPORTER",
        }
    }

    /// Level in the approval chain this role signs off at, if any.
    pub fn approval_level(&self) -> Option<ApprovalLevel> {
        match self {
            Self::ApproverL1 => Some(ApprovalLevel::L1),
            Self::ApproverL2 => Some(ApprovalLevel::L2),
            Self::ApproverL3 => Some(ApprovalLevel::L3),
            Self::Requester | Self::DcOps | Self::Admin | Self::Submitter | Self::Exporter => {
                None
            }
        }
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| DomainError::UnknownVariant { kind: "role", value: value.to_string() })
    }
}

/// The authenticated caller of a workflow operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, roles: Vec<Role>) -> Self {
        Self { user_id: UserId(user_id.into()), roles }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.iter().any(|role| self.has_role(*role))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub roles: Vec<Role>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn principal(&self) -> Principal {
        Principal { user_id: self.id.clone(), roles: self.roles.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::{Principal, Role};
    use crate::domain::approval::ApprovalLevel;

    #[test]
    fn approver_roles_map_to_their_level() {
        assert_eq!(Role::ApproverL1.approval_level(), Some(ApprovalLevel::L1));
        assert_eq!(Role::ApproverL2.approval_level(), Some(ApprovalLevel::L2));
        assert_eq!(Role::ApproverL3.approval_level(), Some(ApprovalLevel::L3));
        assert_eq!(Role::Requester.approval_level(), None);
        assert_eq!(Role::DcOps.approval_level(), None);
        assert_eq!(Role::Submitter.approval_level(), None);
    }

    #[test]
    fn role_parsing_is_case_insensitive_and_strict() {
        assert_eq!("approver_l2".parse::<Role>(), Ok(Role::ApproverL2));
        assert_eq!(" DC_OPS ".parse::<Role>(), Ok(Role::DcOps));
        assert_eq!("submitter".parse::<Role>(), Ok(Role::Submitter));
        assert_eq!("Exporter".parse::<Role>(), Ok(Role::Exporter));
        assert!("APPROVER_L4".parse::<Role>().is_err());
    }

    #[test]
    fn principal_role_checks() {
        let principal = Principal::new("u-1", vec![Role::Requester, Role::ApproverL1]);
        assert!(principal.has_role(Role::ApproverL1));
        assert!(!principal.has_role(Role::Admin));
        assert!(principal.has_any_role(&[Role::Admin, Role::Requester]));
    }
}
