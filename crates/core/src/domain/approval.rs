use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ApprovalLevel {
    L1,
    L2,
    L3,
}

impl ApprovalLevel {
    pub const CHAIN: [Self; 3] = [Self::L1, Self::L2, Self::L3];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L1 => "L1",
            Self::L2 => "L2",
            Self::L3 => "L3",
        }
    }

    /// The rung after this one, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::L1 => Some(Self::L2),
            Self::L2 => Some(Self::L3),
            Self::L3 => None,
        }
    }
}

impl FromStr for ApprovalLevel {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "L1" => Ok(Self::L1),
            "L2" => Ok(Self::L2),
            "L3" => Ok(Self::L3),
            _ => Err(DomainError::UnknownVariant {
                kind: "approval level",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalDecision {
    Pending,
    Approved,
    Rejected,
    Returned,
}

impl ApprovalDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Returned => "RETURNED",
        }
    }

    /// Parses a value an approver may submit. `PENDING` is a stored state,
    /// not a verdict, so it is refused here.
    pub fn parse_verdict(value: &str) -> Result<Self, DomainError> {
        match value.parse::<Self>()? {
            Self::Pending => Err(DomainError::Validation(
                "decision must be one of APPROVED|REJECTED|RETURNED".to_string(),
            )),
            verdict => Ok(verdict),
        }
    }
}

impl FromStr for ApprovalDecision {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            "RETURNED" => Ok(Self::Returned),
            _ => Err(DomainError::UnknownVariant { kind: "decision", value: value.to_string() }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalEntityType {
    Request,
    Customization,
}

impl ApprovalEntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "REQUEST",
            Self::Customization => "CUSTOMIZATION",
        }
    }
}

impl FromStr for ApprovalEntityType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "REQUEST" => Ok(Self::Request),
            "CUSTOMIZATION" => Ok(Self::Customization),
            _ => Err(DomainError::UnknownVariant { kind: "entity type", value: value.to_string() }),
        }
    }
}

/// One approver's vote on one request or customization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub id: ApprovalId,
    pub entity_type: ApprovalEntityType,
    pub entity_id: String,
    pub approver_id: UserId,
    pub level: ApprovalLevel,
    pub decision: ApprovalDecision,
    pub comments: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Approval {
    pub fn is_pending(&self) -> bool {
        self.decision == ApprovalDecision::Pending
    }
}
