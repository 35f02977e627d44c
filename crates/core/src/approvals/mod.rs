//! Sequential three-level sign-off for requests and customizations.
//!
//! Everything here is pure: callers load the approval row, its same-level
//! peers and the owning entity's status, then persist whatever
//! [`resolve_propagation`] returns inside one transaction.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::approval::{
    Approval, ApprovalDecision, ApprovalEntityType, ApprovalId, ApprovalLevel,
};
use crate::domain::customization::CustomizationStatus;
use crate::domain::request::RequestStatus;
use crate::domain::user::{Principal, Role, User};
use crate::errors::{DomainError, WorkflowError};

/// How several approvers holding the same level are reconciled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelQuorum {
    /// The first APPROVED decision at a level advances the entity.
    FirstDecision,
    /// Every approver at the level must approve before the entity advances.
    #[default]
    AllApprovers,
}

impl FromStr for LevelQuorum {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "first_decision" => Ok(Self::FirstDecision),
            "all_approvers" => Ok(Self::AllApprovers),
            _ => Err(DomainError::UnknownVariant { kind: "level quorum", value: value.to_string() }),
        }
    }
}

/// What a RETURNED decision does to a customization, which has no draft state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomizationReturnPolicy {
    #[default]
    Unchanged,
    Rejected,
    Closed,
}

impl FromStr for CustomizationReturnPolicy {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unchanged" => Ok(Self::Unchanged),
            "rejected" => Ok(Self::Rejected),
            "closed" => Ok(Self::Closed),
            _ => Err(DomainError::UnknownVariant {
                kind: "customization return policy",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    pub level_quorum: LevelQuorum,
    pub customization_returned: CustomizationReturnPolicy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity", content = "status", rename_all = "snake_case")]
pub enum StatusChange {
    Unchanged,
    Request(RequestStatus),
    Customization(CustomizationStatus),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity", content = "status", rename_all = "snake_case")]
pub enum EntityStatus {
    Request(RequestStatus),
    Customization(CustomizationStatus),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotAwaitingApproval,
    /// The approval's level was already cleared before this vote landed.
    WouldRegress,
    /// The approval's level has not been reached yet. The vote is kept and
    /// counts once the entity gets there.
    OutOfTurn,
    EntityMismatch,
    /// The approval belongs to an earlier submission round of the entity.
    Superseded,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAwaitingApproval => "entity_not_awaiting_approval",
            Self::WouldRegress => "status_would_regress",
            Self::OutOfTurn => "approval_out_of_turn",
            Self::EntityMismatch => "entity_type_mismatch",
            Self::Superseded => "approval_superseded",
        }
    }
}

/// What happens to the owning entity after one decision is recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Propagation {
    Apply { change: StatusChange },
    NoChange,
    AwaitingPeers,
    Skipped { reason: SkipReason },
}

/// Maps one decision at one level to the owning entity's next status.
pub fn next_status(
    entity_type: ApprovalEntityType,
    decision: ApprovalDecision,
    level: ApprovalLevel,
    policy: &ApprovalPolicy,
) -> Result<StatusChange, DomainError> {
    use ApprovalDecision::{Approved, Pending, Rejected, Returned};
    use ApprovalEntityType::{Customization, Request};

    let change = match (entity_type, decision) {
        (_, Pending) => {
            return Err(DomainError::Validation(
                "decision must be one of APPROVED|REJECTED|RETURNED".to_string(),
            ))
        }
        (Request, Rejected) => StatusChange::Request(RequestStatus::Rejected),
        (Request, Returned) => StatusChange::Request(RequestStatus::Draft),
        (Request, Approved) => StatusChange::Request(match level {
            ApprovalLevel::L1 => RequestStatus::PendingL2,
            ApprovalLevel::L2 => RequestStatus::PendingL3,
            ApprovalLevel::L3 => RequestStatus::Approved,
        }),
        (Customization, Rejected) => StatusChange::Customization(CustomizationStatus::Rejected),
        (Customization, Approved) => match level {
            ApprovalLevel::L3 => StatusChange::Customization(CustomizationStatus::Approved),
            ApprovalLevel::L1 | ApprovalLevel::L2 => StatusChange::Unchanged,
        },
        (Customization, Returned) => match policy.customization_returned {
            CustomizationReturnPolicy::Unchanged => StatusChange::Unchanged,
            CustomizationReturnPolicy::Rejected => {
                StatusChange::Customization(CustomizationStatus::Rejected)
            }
            CustomizationReturnPolicy::Closed => {
                StatusChange::Customization(CustomizationStatus::Closed)
            }
        },
    };

    Ok(change)
}

/// Checks, in order: authenticated caller, approval exists, caller is the
/// assigned approver, approval still pending. The first failure wins.
pub fn check_preconditions<'a>(
    principal: Option<&'a Principal>,
    approval_id: &ApprovalId,
    approval: Option<&'a Approval>,
) -> Result<(&'a Principal, &'a Approval), WorkflowError> {
    let principal = principal.ok_or(WorkflowError::Unauthorized)?;
    let approval = approval.ok_or_else(|| WorkflowError::not_found("approval", &approval_id.0))?;

    if approval.approver_id != principal.user_id {
        return Err(WorkflowError::Forbidden(format!(
            "approval `{}` is assigned to another approver",
            approval.id.0
        )));
    }

    if !approval.is_pending() {
        return Err(WorkflowError::AlreadyDecided(approval.id.0.clone()));
    }

    Ok((principal, approval))
}

/// Returns the approval with the decision applied.
pub fn apply_decision(
    approval: &Approval,
    decision: ApprovalDecision,
    comments: Option<String>,
    decided_at: DateTime<Utc>,
) -> Approval {
    let comments = comments.map(|text| text.trim().to_string()).filter(|text| !text.is_empty());
    Approval { decision, comments, decided_at: Some(decided_at), ..approval.clone() }
}

/// Decides whether, and how, the owning entity's status changes.
///
/// `decided` must already carry the new decision. `peers` are the approval
/// rows of the entity's current round; `decided` may or may not be among them.
///
/// REJECTED and RETURNED act at any level. An APPROVED vote only moves the
/// entity when its level is the one the entity is waiting on. A vote that
/// arrives early is recorded and counted once its level opens, so the entity
/// can pass through levels that are already fully approved but never skips
/// one that is not.
pub fn resolve_propagation(
    policy: &ApprovalPolicy,
    decided: &Approval,
    peers: &[Approval],
    current: EntityStatus,
) -> Result<Propagation, DomainError> {
    let change = next_status(decided.entity_type, decided.decision, decided.level, policy)?;
    if decided.decision != ApprovalDecision::Approved {
        return Ok(plan_propagation(current, change));
    }

    let round = RoundTally::new(decided, peers, policy.level_quorum);
    let propagation = match (decided.entity_type, current) {
        (ApprovalEntityType::Request, EntityStatus::Request(status)) => {
            approve_request(status, decided.level, &round)
        }
        (ApprovalEntityType::Customization, EntityStatus::Customization(status)) => {
            approve_customization(status, decided.level, &round)
        }
        _ => Propagation::Skipped { reason: SkipReason::EntityMismatch },
    };
    Ok(propagation)
}

/// Entity status changes for REJECTED and RETURNED: applied while the entity
/// is still in the approval chain, skipped once it has left it.
pub fn plan_propagation(current: EntityStatus, change: StatusChange) -> Propagation {
    let awaiting = match (current, change) {
        (_, StatusChange::Unchanged) => return Propagation::NoChange,
        (EntityStatus::Request(current), StatusChange::Request(_)) => current.is_awaiting_approval(),
        (EntityStatus::Customization(current), StatusChange::Customization(_)) => {
            current.is_awaiting_approval()
        }
        _ => return Propagation::Skipped { reason: SkipReason::EntityMismatch },
    };

    if awaiting {
        Propagation::Apply { change }
    } else {
        Propagation::Skipped { reason: SkipReason::NotAwaitingApproval }
    }
}

fn approve_request(current: RequestStatus, level: ApprovalLevel, round: &RoundTally<'_>) -> Propagation {
    if !current.is_awaiting_approval() {
        return Propagation::Skipped { reason: SkipReason::NotAwaitingApproval };
    }

    let turn = RequestStatus::pending_at(level);
    if current != turn {
        let reason = if turn.rank() < current.rank() {
            SkipReason::WouldRegress
        } else {
            SkipReason::OutOfTurn
        };
        return Propagation::Skipped { reason };
    }
    if !round.cleared(level) {
        return Propagation::AwaitingPeers;
    }

    let mut reached = level;
    while let Some(following) = reached.next() {
        if !round.cleared(following) {
            return Propagation::Apply {
                change: StatusChange::Request(RequestStatus::pending_at(following)),
            };
        }
        reached = following;
    }
    Propagation::Apply { change: StatusChange::Request(RequestStatus::Approved) }
}

/// Customizations keep PENDING_L1 until the whole chain is cleared, so the
/// turn is the lowest level that still lacks consent.
fn approve_customization(
    current: CustomizationStatus,
    level: ApprovalLevel,
    round: &RoundTally<'_>,
) -> Propagation {
    if !current.is_awaiting_approval() {
        return Propagation::Skipped { reason: SkipReason::NotAwaitingApproval };
    }

    match round.open_level() {
        None => Propagation::Apply {
            change: StatusChange::Customization(CustomizationStatus::Approved),
        },
        Some(open) if level > open => Propagation::Skipped { reason: SkipReason::OutOfTurn },
        Some(open) if level == open => Propagation::AwaitingPeers,
        Some(_) => Propagation::NoChange,
    }
}

/// Approval rows of one entity round, with the fresh decision folded in.
struct RoundTally<'a> {
    rows: Vec<&'a Approval>,
    quorum: LevelQuorum,
}

impl<'a> RoundTally<'a> {
    fn new(decided: &'a Approval, peers: &'a [Approval], quorum: LevelQuorum) -> Self {
        let rows = std::iter::once(decided)
            .chain(peers.iter().filter(|peer| {
                peer.id != decided.id
                    && peer.entity_type == decided.entity_type
                    && peer.entity_id == decided.entity_id
            }))
            .collect();
        Self { rows, quorum }
    }

    /// A level with no approvers never clears.
    fn cleared(&self, level: ApprovalLevel) -> bool {
        let mut decisions =
            self.rows.iter().filter(|row| row.level == level).map(|row| row.decision).peekable();
        if decisions.peek().is_none() {
            return false;
        }
        match self.quorum {
            LevelQuorum::FirstDecision => decisions.any(|decision| decision == ApprovalDecision::Approved),
            LevelQuorum::AllApprovers => decisions.all(|decision| decision == ApprovalDecision::Approved),
        }
    }

    fn open_level(&self) -> Option<ApprovalLevel> {
        ApprovalLevel::CHAIN.into_iter().find(|level| !self.cleared(*level))
    }
}

/// One PENDING approval per (approver, approver role held).
pub fn approval_batch(
    entity_type: ApprovalEntityType,
    entity_id: &str,
    approvers: &[User],
    created_at: DateTime<Utc>,
) -> Vec<Approval> {
    approvers
        .iter()
        .flat_map(|user| {
            user.roles.iter().filter_map(Role::approval_level).map(move |level| Approval {
                id: ApprovalId(format!("APR-{}", Uuid::new_v4().simple())),
                entity_type,
                entity_id: entity_id.to_string(),
                approver_id: user.id.clone(),
                level,
                decision: ApprovalDecision::Pending,
                comments: None,
                decided_at: None,
                created_at,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::user::{Role, UserId};

    fn approval(id: &str, entity: ApprovalEntityType, level: ApprovalLevel) -> Approval {
        Approval {
            id: ApprovalId(id.to_string()),
            entity_type: entity,
            entity_id: "R1".to_string(),
            approver_id: UserId(format!("approver-{id}")),
            level,
            decision: ApprovalDecision::Pending,
            comments: None,
            decided_at: None,
            created_at: Utc::now(),
        }
    }

    fn decided(
        id: &str,
        entity: ApprovalEntityType,
        level: ApprovalLevel,
        decision: ApprovalDecision,
    ) -> Approval {
        apply_decision(&approval(id, entity, level), decision, None, Utc::now())
    }

    #[test]
    fn request_approvals_advance_one_level_at_a_time() {
        let policy = ApprovalPolicy::default();
        let expected = [
            (ApprovalLevel::L1, RequestStatus::PendingL2),
            (ApprovalLevel::L2, RequestStatus::PendingL3),
            (ApprovalLevel::L3, RequestStatus::Approved),
        ];
        for (level, next) in expected {
            assert_eq!(
                next_status(ApprovalEntityType::Request, ApprovalDecision::Approved, level, &policy),
                Ok(StatusChange::Request(next))
            );
        }
    }

    #[test]
    fn request_rejection_and_return_ignore_level() {
        let policy = ApprovalPolicy::default();
        for level in [ApprovalLevel::L1, ApprovalLevel::L2, ApprovalLevel::L3] {
            assert_eq!(
                next_status(ApprovalEntityType::Request, ApprovalDecision::Rejected, level, &policy),
                Ok(StatusChange::Request(RequestStatus::Rejected))
            );
            assert_eq!(
                next_status(ApprovalEntityType::Request, ApprovalDecision::Returned, level, &policy),
                Ok(StatusChange::Request(RequestStatus::Draft))
            );
        }
    }

    #[test]
    fn customization_only_moves_on_final_approval_or_rejection() {
        let policy = ApprovalPolicy::default();
        let entity = ApprovalEntityType::Customization;

        assert_eq!(
            next_status(entity, ApprovalDecision::Approved, ApprovalLevel::L3, &policy),
            Ok(StatusChange::Customization(CustomizationStatus::Approved))
        );
        assert_eq!(
            next_status(entity, ApprovalDecision::Approved, ApprovalLevel::L1, &policy),
            Ok(StatusChange::Unchanged)
        );
        assert_eq!(
            next_status(entity, ApprovalDecision::Approved, ApprovalLevel::L2, &policy),
            Ok(StatusChange::Unchanged)
        );
        assert_eq!(
            next_status(entity, ApprovalDecision::Rejected, ApprovalLevel::L1, &policy),
            Ok(StatusChange::Customization(CustomizationStatus::Rejected))
        );
        assert_eq!(
            next_status(entity, ApprovalDecision::Returned, ApprovalLevel::L2, &policy),
            Ok(StatusChange::Unchanged)
        );
    }

    #[test]
    fn customization_return_follows_configured_policy() {
        let policy = ApprovalPolicy {
            customization_returned: CustomizationReturnPolicy::Closed,
            ..ApprovalPolicy::default()
        };
        assert_eq!(
            next_status(
                ApprovalEntityType::Customization,
                ApprovalDecision::Returned,
                ApprovalLevel::L1,
                &policy
            ),
            Ok(StatusChange::Customization(CustomizationStatus::Closed))
        );
    }

    #[test]
    fn pending_is_not_a_decision() {
        let result = next_status(
            ApprovalEntityType::Request,
            ApprovalDecision::Pending,
            ApprovalLevel::L1,
            &ApprovalPolicy::default(),
        );
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn preconditions_fail_in_declared_order() {
        let id = ApprovalId("A1".to_string());
        let row = approval("A1", ApprovalEntityType::Request, ApprovalLevel::L1);
        let owner = Principal::new("approver-A1", vec![Role::ApproverL1]);
        let stranger = Principal::new("someone-else", vec![Role::ApproverL1]);

        assert_eq!(check_preconditions(None, &id, None), Err(WorkflowError::Unauthorized));
        assert_eq!(
            check_preconditions(Some(&stranger), &id, None),
            Err(WorkflowError::not_found("approval", "A1"))
        );
        assert!(matches!(
            check_preconditions(Some(&stranger), &id, Some(&row)),
            Err(WorkflowError::Forbidden(_))
        ));

        let done = apply_decision(&row, ApprovalDecision::Approved, None, Utc::now());
        assert_eq!(
            check_preconditions(Some(&owner), &id, Some(&done)),
            Err(WorkflowError::AlreadyDecided("A1".to_string()))
        );
        assert!(check_preconditions(Some(&owner), &id, Some(&row)).is_ok());
    }

    #[test]
    fn apply_decision_stamps_time_and_drops_blank_comments() {
        let row = approval("A1", ApprovalEntityType::Request, ApprovalLevel::L1);
        let now = Utc::now();
        let updated = apply_decision(&row, ApprovalDecision::Rejected, Some("  ".into()), now);
        assert_eq!(updated.decision, ApprovalDecision::Rejected);
        assert_eq!(updated.comments, None);
        assert_eq!(updated.decided_at, Some(now));
        assert_eq!(updated.id, row.id);
    }

    #[test]
    fn all_approvers_quorum_waits_for_same_level_peers() {
        let policy = ApprovalPolicy::default();
        let first = decided("A1", ApprovalEntityType::Request, ApprovalLevel::L1, ApprovalDecision::Approved);
        let peer = approval("A2", ApprovalEntityType::Request, ApprovalLevel::L1);
        let other_level = approval("A3", ApprovalEntityType::Request, ApprovalLevel::L2);
        let current = EntityStatus::Request(RequestStatus::PendingL1);

        let waiting = resolve_propagation(
            &policy,
            &first,
            &[first.clone(), peer.clone(), other_level.clone()],
            current,
        );
        assert_eq!(waiting, Ok(Propagation::AwaitingPeers));

        let second = apply_decision(&peer, ApprovalDecision::Approved, None, Utc::now());
        let advanced =
            resolve_propagation(&policy, &second, &[first, second.clone(), other_level], current);
        assert_eq!(
            advanced,
            Ok(Propagation::Apply { change: StatusChange::Request(RequestStatus::PendingL2) })
        );
    }

    #[test]
    fn first_decision_quorum_advances_immediately() {
        let policy =
            ApprovalPolicy { level_quorum: LevelQuorum::FirstDecision, ..ApprovalPolicy::default() };
        let first = decided("A1", ApprovalEntityType::Request, ApprovalLevel::L1, ApprovalDecision::Approved);
        let peer = approval("A2", ApprovalEntityType::Request, ApprovalLevel::L1);

        let result = resolve_propagation(
            &policy,
            &first,
            &[peer],
            EntityStatus::Request(RequestStatus::PendingL1),
        );
        assert_eq!(
            result,
            Ok(Propagation::Apply { change: StatusChange::Request(RequestStatus::PendingL2) })
        );
    }

    #[test]
    fn rejection_short_circuits_regardless_of_peers_or_level() {
        let policy = ApprovalPolicy::default();
        let veto = decided("A2", ApprovalEntityType::Request, ApprovalLevel::L2, ApprovalDecision::Rejected);
        let pending_l1 = approval("A1", ApprovalEntityType::Request, ApprovalLevel::L1);
        let pending_l3 = approval("A3", ApprovalEntityType::Request, ApprovalLevel::L3);

        let result = resolve_propagation(
            &policy,
            &veto,
            &[pending_l1, pending_l3],
            EntityStatus::Request(RequestStatus::PendingL1),
        );
        assert_eq!(
            result,
            Ok(Propagation::Apply { change: StatusChange::Request(RequestStatus::Rejected) })
        );
    }

    #[test]
    fn guard_skips_entities_outside_the_chain() {
        let change = StatusChange::Request(RequestStatus::PendingL2);
        assert_eq!(
            plan_propagation(EntityStatus::Request(RequestStatus::Rejected), change),
            Propagation::Skipped { reason: SkipReason::NotAwaitingApproval }
        );
        assert_eq!(
            plan_propagation(EntityStatus::Request(RequestStatus::Draft), change),
            Propagation::Skipped { reason: SkipReason::NotAwaitingApproval }
        );
        assert_eq!(
            plan_propagation(
                EntityStatus::Customization(CustomizationStatus::Closed),
                StatusChange::Customization(CustomizationStatus::Approved)
            ),
            Propagation::Skipped { reason: SkipReason::NotAwaitingApproval }
        );
    }

    #[test]
    fn late_approval_never_drags_request_back_but_return_to_draft_applies() {
        let policy =
            ApprovalPolicy { level_quorum: LevelQuorum::FirstDecision, ..ApprovalPolicy::default() };
        let late = decided("A1", ApprovalEntityType::Request, ApprovalLevel::L1, ApprovalDecision::Approved);
        assert_eq!(
            resolve_propagation(&policy, &late, &[], EntityStatus::Request(RequestStatus::PendingL3)),
            Ok(Propagation::Skipped { reason: SkipReason::WouldRegress })
        );

        assert_eq!(
            plan_propagation(
                EntityStatus::Request(RequestStatus::PendingL3),
                StatusChange::Request(RequestStatus::Draft)
            ),
            Propagation::Apply { change: StatusChange::Request(RequestStatus::Draft) }
        );
        assert_eq!(
            plan_propagation(
                EntityStatus::Request(RequestStatus::PendingL1),
                StatusChange::Customization(CustomizationStatus::Approved)
            ),
            Propagation::Skipped { reason: SkipReason::EntityMismatch }
        );
    }

    #[test]
    fn approval_above_the_current_level_waits_its_turn() {
        let policy = ApprovalPolicy::default();
        let early = decided("A3", ApprovalEntityType::Request, ApprovalLevel::L3, ApprovalDecision::Approved);
        let l1 = approval("A1", ApprovalEntityType::Request, ApprovalLevel::L1);
        let l2 = approval("A2", ApprovalEntityType::Request, ApprovalLevel::L2);

        let result = resolve_propagation(
            &policy,
            &early,
            &[l1, l2],
            EntityStatus::Request(RequestStatus::PendingL1),
        );
        assert_eq!(result, Ok(Propagation::Skipped { reason: SkipReason::OutOfTurn }));
    }

    #[test]
    fn early_votes_count_once_their_level_opens() {
        let policy = ApprovalPolicy::default();
        let early_l2 = decided("A2", ApprovalEntityType::Request, ApprovalLevel::L2, ApprovalDecision::Approved);
        let l3 = approval("A3", ApprovalEntityType::Request, ApprovalLevel::L3);
        let l1 = decided("A1", ApprovalEntityType::Request, ApprovalLevel::L1, ApprovalDecision::Approved);

        let opened = resolve_propagation(
            &policy,
            &l1,
            &[early_l2.clone(), l3.clone()],
            EntityStatus::Request(RequestStatus::PendingL1),
        );
        assert_eq!(
            opened,
            Ok(Propagation::Apply { change: StatusChange::Request(RequestStatus::PendingL3) })
        );

        let early_l3 = apply_decision(&l3, ApprovalDecision::Approved, None, Utc::now());
        let finished = resolve_propagation(
            &policy,
            &l1,
            &[early_l2, early_l3],
            EntityStatus::Request(RequestStatus::PendingL1),
        );
        assert_eq!(
            finished,
            Ok(Propagation::Apply { change: StatusChange::Request(RequestStatus::Approved) })
        );
    }

    #[test]
    fn customization_needs_every_level_before_final_approval() {
        let policy = ApprovalPolicy::default();
        let entity = ApprovalEntityType::Customization;
        let current = EntityStatus::Customization(CustomizationStatus::PendingL1);
        let l1 = approval("A1", entity, ApprovalLevel::L1);
        let l2 = approval("A2", entity, ApprovalLevel::L2);
        let l3 = decided("A3", entity, ApprovalLevel::L3, ApprovalDecision::Approved);

        let early = resolve_propagation(&policy, &l3, &[l1.clone(), l2.clone()], current);
        assert_eq!(early, Ok(Propagation::Skipped { reason: SkipReason::OutOfTurn }));

        let l1 = apply_decision(&l1, ApprovalDecision::Approved, None, Utc::now());
        let middle = resolve_propagation(&policy, &l1, &[l2.clone(), l3.clone()], current);
        assert_eq!(middle, Ok(Propagation::NoChange));

        let l2 = apply_decision(&l2, ApprovalDecision::Approved, None, Utc::now());
        let last = resolve_propagation(&policy, &l2, &[l1, l3], current);
        assert_eq!(
            last,
            Ok(Propagation::Apply { change: StatusChange::Customization(CustomizationStatus::Approved) })
        );
    }

    #[test]
    fn batch_has_one_row_per_user_and_approver_role() {
        let now = Utc::now();
        let users = vec![
            User {
                id: UserId("u1".into()),
                email: "u1@example.org".into(),
                display_name: "U1".into(),
                roles: vec![Role::ApproverL1, Role::ApproverL3, Role::Requester],
                created_at: now,
            },
            User {
                id: UserId("u2".into()),
                email: "u2@example.org".into(),
                display_name: "U2".into(),
                roles: vec![Role::ApproverL2],
                created_at: now,
            },
        ];

        let batch = approval_batch(ApprovalEntityType::Request, "R1", &users, now);

        assert_eq!(batch.len(), 3);
        assert!(batch.iter().all(|row| row.is_pending() && row.entity_id == "R1"));
        let levels: Vec<_> = batch.iter().map(|row| (row.approver_id.0.as_str(), row.level)).collect();
        assert!(levels.contains(&("u1", ApprovalLevel::L1)));
        assert!(levels.contains(&("u1", ApprovalLevel::L3)));
        assert!(levels.contains(&("u2", ApprovalLevel::L2)));
    }
}
