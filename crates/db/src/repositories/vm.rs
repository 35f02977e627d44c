use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use vmgate_core::domain::customization::CustomizationId;
use vmgate_core::domain::page::Paged;
use vmgate_core::domain::request::RequestId;
use vmgate_core::domain::user::UserId;
use vmgate_core::domain::vm::{VmId, VmInstance, VmQuery, VmSpec, VmSpecId, VmStatus, VmSummary};

use super::{
    column, count_column, enum_column, like_pattern, optional_timestamp_column, timestamp_column,
    RepositoryError,
};

const VM_SELECT: &str = "SELECT v.id, v.request_id, v.sequence_number, v.owner_id, v.hostname,
        v.ip_address, v.public_ip_address, v.status, v.provisioned_at, v.decommissioned_at,
        s.id AS spec_id, s.vcpu AS spec_vcpu, s.ram_gb AS spec_ram_gb,
        s.storage_gb AS spec_storage_gb, s.os_name AS spec_os_name,
        s.os_version AS spec_os_version, s.raid AS spec_raid,
        s.source_customization_id AS spec_source_customization_id,
        s.effective_from AS spec_effective_from,
        r.system_name, r.environment
    FROM vm_instance v
    JOIN vm_request r ON r.id = v.request_id
    LEFT JOIN vm_spec s ON s.id = v.current_spec_id";

fn row_to_spec(row: &SqliteRow, vm_id: &VmId) -> Result<Option<VmSpec>, RepositoryError> {
    let Some(spec_id) = column::<Option<String>>(row, "spec_id")? else {
        return Ok(None);
    };
    let source: Option<String> = column(row, "spec_source_customization_id")?;
    Ok(Some(VmSpec {
        id: VmSpecId(spec_id),
        vm_id: vm_id.clone(),
        vcpu: count_column(row, "spec_vcpu")?,
        ram_gb: count_column(row, "spec_ram_gb")?,
        storage_gb: count_column(row, "spec_storage_gb")?,
        os_name: column(row, "spec_os_name")?,
        os_version: column(row, "spec_os_version")?,
        raid: enum_column(row, "spec_raid")?,
        source_customization_id: source.map(CustomizationId),
        effective_from: timestamp_column(row, "spec_effective_from")?,
    }))
}

fn row_to_vm(row: &SqliteRow) -> Result<VmInstance, RepositoryError> {
    let id = VmId(column(row, "id")?);
    let owner_id: Option<String> = column(row, "owner_id")?;
    Ok(VmInstance {
        current_spec: row_to_spec(row, &id)?,
        id,
        request_id: RequestId(column(row, "request_id")?),
        sequence_number: count_column(row, "sequence_number")?,
        owner_id: owner_id.map(UserId),
        hostname: column(row, "hostname")?,
        ip_address: column(row, "ip_address")?,
        public_ip_address: column(row, "public_ip_address")?,
        status: enum_column(row, "status")?,
        provisioned_at: timestamp_column(row, "provisioned_at")?,
        decommissioned_at: optional_timestamp_column(row, "decommissioned_at")?,
    })
}

fn row_to_summary(row: &SqliteRow) -> Result<VmSummary, RepositoryError> {
    Ok(VmSummary {
        vm: row_to_vm(row)?,
        system_name: column(row, "system_name")?,
        environment: enum_column(row, "environment")?,
    })
}

/// Inserts the VM row. Its current spec, if any, must be written with
/// [`insert_spec`] and linked with [`set_current_spec`].
pub async fn insert_vm(conn: &mut SqliteConnection, vm: &VmInstance) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO vm_instance (id, request_id, sequence_number, owner_id, hostname,
             ip_address, public_ip_address, status, current_spec_id, provisioned_at,
             decommissioned_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)",
    )
    .bind(&vm.id.0)
    .bind(&vm.request_id.0)
    .bind(i64::from(vm.sequence_number))
    .bind(vm.owner_id.as_ref().map(|id| id.0.as_str()))
    .bind(&vm.hostname)
    .bind(&vm.ip_address)
    .bind(&vm.public_ip_address)
    .bind(vm.status.as_str())
    .bind(vm.provisioned_at.to_rfc3339())
    .bind(vm.decommissioned_at.map(|dt| dt.to_rfc3339()))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn insert_spec(conn: &mut SqliteConnection, spec: &VmSpec) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO vm_spec (id, vm_id, vcpu, ram_gb, storage_gb, os_name, os_version, raid,
             source_customization_id, effective_from)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&spec.id.0)
    .bind(&spec.vm_id.0)
    .bind(i64::from(spec.vcpu))
    .bind(i64::from(spec.ram_gb))
    .bind(i64::from(spec.storage_gb))
    .bind(&spec.os_name)
    .bind(&spec.os_version)
    .bind(spec.raid.as_str())
    .bind(spec.source_customization_id.as_ref().map(|id| id.0.as_str()))
    .bind(spec.effective_from.to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn set_current_spec(
    conn: &mut SqliteConnection,
    vm_id: &VmId,
    spec_id: &VmSpecId,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE vm_instance SET current_spec_id = ? WHERE id = ?")
        .bind(&spec_id.0)
        .bind(&vm_id.0)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn retire_vm(
    conn: &mut SqliteConnection,
    vm_id: &VmId,
    at: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE vm_instance SET status = ?, decommissioned_at = ? WHERE id = ?")
        .bind(VmStatus::Retired.as_str())
        .bind(at.to_rfc3339())
        .bind(&vm_id.0)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Whether a spec revision was already written for this customization.
pub async fn customization_applied(
    conn: &mut SqliteConnection,
    customization_id: &CustomizationId,
) -> Result<bool, RepositoryError> {
    let applied: i64 = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM vm_spec WHERE source_customization_id = ?)",
    )
    .bind(&customization_id.0)
    .fetch_one(&mut *conn)
    .await?;
    Ok(applied == 1)
}

pub async fn find_summary(
    conn: &mut SqliteConnection,
    id: &VmId,
) -> Result<Option<VmSummary>, RepositoryError> {
    let row = sqlx::query(&format!("{VM_SELECT} WHERE v.id = ?"))
        .bind(&id.0)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_summary).transpose()
}

pub async fn find_vm(
    conn: &mut SqliteConnection,
    id: &VmId,
) -> Result<Option<VmInstance>, RepositoryError> {
    Ok(find_summary(conn, id).await?.map(|summary| summary.vm))
}

pub async fn vms_for_request(
    conn: &mut SqliteConnection,
    request_id: &RequestId,
) -> Result<Vec<VmInstance>, RepositoryError> {
    let rows = sqlx::query(&format!("{VM_SELECT} WHERE v.request_id = ? ORDER BY v.sequence_number"))
        .bind(&request_id.0)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(row_to_vm).collect()
}

/// One page of the inventory, newest first, plus the unpaged total.
/// `owner` narrows the page to machines that user owns.
pub async fn list_summaries(
    conn: &mut SqliteConnection,
    query: &VmQuery,
    owner: Option<&UserId>,
) -> Result<(Vec<VmSummary>, u64), RepositoryError> {
    let status = query.status.map(|status| status.as_str());
    let pattern = query.search_term().map(like_pattern);
    let owner = owner.map(|id| id.0.as_str());
    let filter = "WHERE (?1 IS NULL OR v.status = ?1)
          AND (?2 IS NULL
               OR LOWER(v.hostname) LIKE ?2 ESCAPE '\\'
               OR LOWER(v.ip_address) LIKE ?2 ESCAPE '\\'
               OR LOWER(r.system_name) LIKE ?2 ESCAPE '\\')
          AND (?3 IS NULL OR v.owner_id = ?3)";

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(1) FROM vm_instance v JOIN vm_request r ON r.id = v.request_id {filter}"
    ))
    .bind(status)
    .bind(pattern.as_deref())
    .bind(owner)
    .fetch_one(&mut *conn)
    .await?;

    let rows = sqlx::query(&format!(
        "{VM_SELECT} {filter} ORDER BY v.provisioned_at DESC, v.id DESC LIMIT ?4 OFFSET ?5"
    ))
    .bind(status)
    .bind(pattern.as_deref())
    .bind(owner)
    .bind(i64::from(query.per_page()))
    .bind(i64::from(query.offset()))
    .fetch_all(&mut *conn)
    .await?;

    let items = rows.iter().map(row_to_summary).collect::<Result<Vec<_>, _>>()?;
    Ok((items, u64::try_from(total).unwrap_or_default()))
}
