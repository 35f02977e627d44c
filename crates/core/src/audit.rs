use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::persisted_enum;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEntity {
    Request,
    Customization,
    Approval,
    Vm,
    Asset,
    License,
    PhysicalServer,
    Submission,
}

persisted_enum!(AuditEntity, "audit entity", {
    Request => "REQUEST",
    Customization => "CUSTOMIZATION",
    Approval => "APPROVAL",
    Vm => "VM",
    Asset => "ASSET",
    License => "LICENSE",
    PhysicalServer => "PHYSICAL_SERVER",
    Submission => "SUBMISSION",
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Success,
    Skipped,
}

persisted_enum!(AuditOutcome, "audit outcome", {
    Success => "SUCCESS",
    Skipped => "SKIPPED",
});

/// One row of the `audit_log` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub entity_type: AuditEntity,
    pub entity_id: String,
    pub action: String,
    pub actor_id: Option<String>,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        entity_type: AuditEntity,
        entity_id: impl Into<String>,
        action: impl Into<String>,
        actor_id: Option<&str>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            entity_type,
            entity_id: entity_id.into(),
            action: action.into(),
            actor_id: actor_id.map(str::to_string),
            outcome: AuditOutcome::Success,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn skipped(mut self) -> Self {
        self.outcome = AuditOutcome::Skipped;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{AuditEntity, AuditEvent, AuditOutcome};

    #[test]
    fn builder_collects_metadata_and_outcome() {
        let event = AuditEvent::new(AuditEntity::Request, "R1", "approval.decided", Some("u1"))
            .with_metadata("from", "PENDING_L1")
            .with_metadata("to", "PENDING_L2");

        assert_eq!(event.outcome, AuditOutcome::Success);
        assert_eq!(event.actor_id.as_deref(), Some("u1"));
        assert_eq!(event.metadata.get("to").map(String::as_str), Some("PENDING_L2"));

        let skipped = event.skipped();
        assert_eq!(skipped.outcome, AuditOutcome::Skipped);
        assert_eq!(skipped.outcome.as_str(), "SKIPPED");
    }
}
