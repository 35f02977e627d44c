use std::collections::BTreeMap;

use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use vmgate_core::audit::{AuditEntity, AuditEvent};

use super::{column, enum_column, timestamp_column, RepositoryError};

fn row_to_event(row: &SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let metadata_json: String = column(row, "metadata_json")?;
    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_json)
        .map_err(|e| RepositoryError::Decode(format!("invalid audit metadata: {e}")))?;
    Ok(AuditEvent {
        id: column(row, "id")?,
        entity_type: enum_column(row, "entity_type")?,
        entity_id: column(row, "entity_id")?,
        action: column(row, "action")?,
        actor_id: column(row, "actor_id")?,
        outcome: enum_column(row, "outcome")?,
        metadata,
        occurred_at: timestamp_column(row, "occurred_at")?,
    })
}

pub async fn insert_event(
    conn: &mut SqliteConnection,
    event: &AuditEvent,
) -> Result<(), RepositoryError> {
    let metadata_json = serde_json::to_string(&event.metadata)
        .map_err(|e| RepositoryError::Decode(format!("audit metadata encode: {e}")))?;
    sqlx::query(
        "INSERT INTO audit_log (id, entity_type, entity_id, action, actor_id, outcome,
             metadata_json, occurred_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&event.id)
    .bind(event.entity_type.as_str())
    .bind(&event.entity_id)
    .bind(&event.action)
    .bind(&event.actor_id)
    .bind(event.outcome.as_str())
    .bind(metadata_json)
    .bind(event.occurred_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Most recent events for one entity, newest first.
pub async fn events_for_entity(
    conn: &mut SqliteConnection,
    entity_type: AuditEntity,
    entity_id: &str,
    limit: u32,
) -> Result<Vec<AuditEvent>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT id, entity_type, entity_id, action, actor_id, outcome, metadata_json, occurred_at
         FROM audit_log
         WHERE entity_type = ? AND entity_id = ?
         ORDER BY occurred_at DESC
         LIMIT ?",
    )
    .bind(entity_type.as_str())
    .bind(entity_id)
    .bind(i64::from(limit))
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(row_to_event).collect()
}
