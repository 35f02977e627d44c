use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use vmgate_core::domain::approval::{Approval, ApprovalEntityType, ApprovalId};
use vmgate_core::domain::user::UserId;

use super::{column, enum_column, optional_timestamp_column, timestamp_column, RepositoryError};

const APPROVAL_COLUMNS: &str =
    "id, entity_type, entity_id, approver_id, level, decision, comments, decided_at, created_at";

fn row_to_approval(row: &SqliteRow) -> Result<Approval, RepositoryError> {
    Ok(Approval {
        id: ApprovalId(column(row, "id")?),
        entity_type: enum_column(row, "entity_type")?,
        entity_id: column(row, "entity_id")?,
        approver_id: UserId(column(row, "approver_id")?),
        level: enum_column(row, "level")?,
        decision: enum_column(row, "decision")?,
        comments: column(row, "comments")?,
        decided_at: optional_timestamp_column(row, "decided_at")?,
        created_at: timestamp_column(row, "created_at")?,
    })
}

/// Inserts a new approval row. Existing rows are never overwritten; decisions
/// go through [`record_decision`].
pub async fn insert_approval(
    conn: &mut SqliteConnection,
    approval: &Approval,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO approval (id, entity_type, entity_id, approver_id, level, decision,
                               comments, decided_at, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&approval.id.0)
    .bind(approval.entity_type.as_str())
    .bind(&approval.entity_id)
    .bind(&approval.approver_id.0)
    .bind(approval.level.as_str())
    .bind(approval.decision.as_str())
    .bind(&approval.comments)
    .bind(approval.decided_at.map(|dt| dt.to_rfc3339()))
    .bind(approval.created_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Writes a decision only while the row is still PENDING. Returns `false`
/// when another decider got there first.
pub async fn record_decision(
    conn: &mut SqliteConnection,
    approval: &Approval,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        "UPDATE approval
         SET decision = ?, comments = ?, decided_at = ?
         WHERE id = ? AND decision = 'PENDING'",
    )
    .bind(approval.decision.as_str())
    .bind(&approval.comments)
    .bind(approval.decided_at.map(|dt| dt.to_rfc3339()))
    .bind(&approval.id.0)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn find_approval(
    conn: &mut SqliteConnection,
    id: &ApprovalId,
) -> Result<Option<Approval>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {APPROVAL_COLUMNS} FROM approval WHERE id = ?"))
        .bind(&id.0)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_to_approval).transpose()
}

pub async fn approvals_for_entity(
    conn: &mut SqliteConnection,
    entity_type: ApprovalEntityType,
    entity_id: &str,
) -> Result<Vec<Approval>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "SELECT {APPROVAL_COLUMNS} FROM approval
         WHERE entity_type = ? AND entity_id = ?
         ORDER BY created_at ASC, level ASC, approver_id ASC"
    ))
    .bind(entity_type.as_str())
    .bind(entity_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_approval).collect()
}

pub async fn pending_for_approver(
    conn: &mut SqliteConnection,
    approver_id: &UserId,
    limit: u32,
) -> Result<Vec<Approval>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "SELECT {APPROVAL_COLUMNS} FROM approval
         WHERE approver_id = ? AND decision = 'PENDING'
         ORDER BY created_at ASC
         LIMIT ?"
    ))
    .bind(&approver_id.0)
    .bind(i64::from(limit))
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_approval).collect()
}
