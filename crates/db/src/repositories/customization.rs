use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use vmgate_core::domain::customization::{
    CustomizationId, CustomizationRequest, CustomizationStatus,
};
use vmgate_core::domain::request::RequestId;
use vmgate_core::domain::user::UserId;
use vmgate_core::domain::vm::VmId;

use super::{column, enum_column, optional_count_column, timestamp_column, RepositoryError};

const CUSTOMIZATION_COLUMNS: &str = "id, target_vm_id, requester_id, parent_request_id, vcpu,
    ram_gb, storage_gb, status, created_at, updated_at";

fn row_to_customization(row: &SqliteRow) -> Result<CustomizationRequest, RepositoryError> {
    let parent: Option<String> = column(row, "parent_request_id")?;
    Ok(CustomizationRequest {
        id: CustomizationId(column(row, "id")?),
        target_vm_id: VmId(column(row, "target_vm_id")?),
        requester_id: UserId(column(row, "requester_id")?),
        parent_request_id: parent.map(RequestId),
        vcpu: optional_count_column(row, "vcpu")?,
        ram_gb: optional_count_column(row, "ram_gb")?,
        storage_gb: optional_count_column(row, "storage_gb")?,
        status: enum_column(row, "status")?,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

pub async fn insert_customization(
    conn: &mut SqliteConnection,
    customization: &CustomizationRequest,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO customization_request (id, target_vm_id, requester_id, parent_request_id,
             vcpu, ram_gb, storage_gb, status, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&customization.id.0)
    .bind(&customization.target_vm_id.0)
    .bind(&customization.requester_id.0)
    .bind(customization.parent_request_id.as_ref().map(|id| id.0.as_str()))
    .bind(customization.vcpu.map(i64::from))
    .bind(customization.ram_gb.map(i64::from))
    .bind(customization.storage_gb.map(i64::from))
    .bind(customization.status.as_str())
    .bind(customization.created_at.to_rfc3339())
    .bind(customization.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn update_customization_status(
    conn: &mut SqliteConnection,
    id: &CustomizationId,
    status: CustomizationStatus,
    at: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE customization_request SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(at.to_rfc3339())
        .bind(&id.0)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn find_customization(
    conn: &mut SqliteConnection,
    id: &CustomizationId,
) -> Result<Option<CustomizationRequest>, RepositoryError> {
    let row = sqlx::query(&format!(
        "SELECT {CUSTOMIZATION_COLUMNS} FROM customization_request WHERE id = ?"
    ))
    .bind(&id.0)
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(row_to_customization).transpose()
}

/// Customizations on a VM that are still waiting for sign-off.
pub async fn open_customizations_for_vm(
    conn: &mut SqliteConnection,
    vm_id: &VmId,
) -> Result<Vec<CustomizationRequest>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "SELECT {CUSTOMIZATION_COLUMNS} FROM customization_request
         WHERE target_vm_id = ? AND status IN ('PENDING_L1', 'PENDING_L2', 'PENDING_L3')
         ORDER BY created_at ASC"
    ))
    .bind(&vm_id.0)
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(row_to_customization).collect()
}

/// Moves every open customization on the VM to CLOSED. Returns the closed ids.
pub async fn close_open_customizations(
    conn: &mut SqliteConnection,
    vm_id: &VmId,
    at: DateTime<Utc>,
) -> Result<Vec<CustomizationId>, RepositoryError> {
    let open = open_customizations_for_vm(conn, vm_id).await?;
    for customization in &open {
        update_customization_status(conn, &customization.id, CustomizationStatus::Closed, at)
            .await?;
    }
    Ok(open.into_iter().map(|customization| customization.id).collect())
}
