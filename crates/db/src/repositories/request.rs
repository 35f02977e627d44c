use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use vmgate_core::domain::request::{
    AdditionalDisk, FirewallPort, HardwareSpec, NetworkAccessType, Request, RequestId,
};
use vmgate_core::domain::user::UserId;

use super::{
    column, count_column, enum_column, optional_date_column, optional_timestamp_column,
    timestamp_column, RepositoryError,
};

const REQUEST_COLUMNS: &str = "id, request_type, status, quantity, system_name, project_name,
    purpose, environment, expected_end_date, vcpu, ram_gb, storage_gb, os_name, os_version, raid,
    requester_id, responsible_person_name, responsible_person_email, va_report_submitted,
    created_at, submitted_at, provisioned_at, updated_at";

fn row_to_request(row: &SqliteRow) -> Result<Request, RepositoryError> {
    Ok(Request {
        id: RequestId(column(row, "id")?),
        request_type: enum_column(row, "request_type")?,
        status: enum_column(row, "status")?,
        quantity: count_column(row, "quantity")?,
        system_name: column(row, "system_name")?,
        project_name: column(row, "project_name")?,
        purpose: column(row, "purpose")?,
        environment: enum_column(row, "environment")?,
        expected_end_date: optional_date_column(row, "expected_end_date")?,
        hardware: HardwareSpec {
            vcpu: count_column(row, "vcpu")?,
            ram_gb: count_column(row, "ram_gb")?,
            storage_gb: count_column(row, "storage_gb")?,
            os_name: column(row, "os_name")?,
            os_version: column(row, "os_version")?,
            raid: enum_column(row, "raid")?,
        },
        requester_id: UserId(column(row, "requester_id")?),
        responsible_person_name: column(row, "responsible_person_name")?,
        responsible_person_email: column(row, "responsible_person_email")?,
        va_report_submitted: column(row, "va_report_submitted")?,
        additional_disks: Vec::new(),
        firewall_ports: Vec::new(),
        network_access: Vec::new(),
        created_at: timestamp_column(row, "created_at")?,
        submitted_at: optional_timestamp_column(row, "submitted_at")?,
        provisioned_at: optional_timestamp_column(row, "provisioned_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

async fn load_children(
    conn: &mut SqliteConnection,
    request: &mut Request,
) -> Result<(), RepositoryError> {
    let disks = sqlx::query(
        "SELECT sequence, size_gb, purpose FROM request_disk
         WHERE request_id = ? ORDER BY sequence",
    )
    .bind(&request.id.0)
    .fetch_all(&mut *conn)
    .await?;
    request.additional_disks = disks
        .iter()
        .map(|row| {
            Ok(AdditionalDisk {
                sequence: count_column(row, "sequence")?,
                size_gb: count_column(row, "size_gb")?,
                purpose: column(row, "purpose")?,
            })
        })
        .collect::<Result<Vec<_>, RepositoryError>>()?;

    let ports = sqlx::query(
        "SELECT port, protocol, purpose, source FROM request_firewall_port
         WHERE request_id = ? ORDER BY id",
    )
    .bind(&request.id.0)
    .fetch_all(&mut *conn)
    .await?;
    request.firewall_ports = ports
        .iter()
        .map(|row| {
            let port: i64 = column(row, "port")?;
            Ok(FirewallPort {
                port: u16::try_from(port)
                    .map_err(|_| RepositoryError::Decode(format!("invalid port {port}")))?,
                protocol: enum_column(row, "protocol")?,
                purpose: column(row, "purpose")?,
                source: column(row, "source")?,
            })
        })
        .collect::<Result<Vec<_>, RepositoryError>>()?;

    let access = sqlx::query(
        "SELECT access_type FROM request_network_access
         WHERE request_id = ? ORDER BY access_type",
    )
    .bind(&request.id.0)
    .fetch_all(&mut *conn)
    .await?;
    let mut network_access = access
        .iter()
        .map(|row| enum_column::<NetworkAccessType>(row, "access_type"))
        .collect::<Result<Vec<_>, _>>()?;
    network_access.sort();
    request.network_access = network_access;

    Ok(())
}

/// Upserts the request row and replaces its disks, ports and network access.
pub async fn save_request(
    conn: &mut SqliteConnection,
    request: &Request,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO vm_request (id, request_type, status, quantity, system_name, project_name,
             purpose, environment, expected_end_date, vcpu, ram_gb, storage_gb, os_name,
             os_version, raid, requester_id, responsible_person_name, responsible_person_email,
             va_report_submitted, created_at, submitted_at, provisioned_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             request_type = excluded.request_type,
             status = excluded.status,
             quantity = excluded.quantity,
             system_name = excluded.system_name,
             project_name = excluded.project_name,
             purpose = excluded.purpose,
             environment = excluded.environment,
             expected_end_date = excluded.expected_end_date,
             vcpu = excluded.vcpu,
             ram_gb = excluded.ram_gb,
             storage_gb = excluded.storage_gb,
             os_name = excluded.os_name,
             os_version = excluded.os_version,
             raid = excluded.raid,
             responsible_person_name = excluded.responsible_person_name,
             responsible_person_email = excluded.responsible_person_email,
             va_report_submitted = excluded.va_report_submitted,
             submitted_at = excluded.submitted_at,
             provisioned_at = excluded.provisioned_at,
             updated_at = excluded.updated_at",
    )
    .bind(&request.id.0)
    .bind(request.request_type.as_str())
    .bind(request.status.as_str())
    .bind(i64::from(request.quantity))
    .bind(&request.system_name)
    .bind(&request.project_name)
    .bind(&request.purpose)
    .bind(request.environment.as_str())
    .bind(request.expected_end_date.map(|date| date.format("%Y-%m-%d").to_string()))
    .bind(i64::from(request.hardware.vcpu))
    .bind(i64::from(request.hardware.ram_gb))
    .bind(i64::from(request.hardware.storage_gb))
    .bind(&request.hardware.os_name)
    .bind(&request.hardware.os_version)
    .bind(request.hardware.raid.as_str())
    .bind(&request.requester_id.0)
    .bind(&request.responsible_person_name)
    .bind(&request.responsible_person_email)
    .bind(request.va_report_submitted)
    .bind(request.created_at.to_rfc3339())
    .bind(request.submitted_at.map(|dt| dt.to_rfc3339()))
    .bind(request.provisioned_at.map(|dt| dt.to_rfc3339()))
    .bind(request.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    for table in ["request_disk", "request_firewall_port", "request_network_access"] {
        sqlx::query(&format!("DELETE FROM {table} WHERE request_id = ?"))
            .bind(&request.id.0)
            .execute(&mut *conn)
            .await?;
    }

    for disk in &request.additional_disks {
        sqlx::query(
            "INSERT INTO request_disk (request_id, sequence, size_gb, purpose) VALUES (?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(i64::from(disk.sequence))
        .bind(i64::from(disk.size_gb))
        .bind(&disk.purpose)
        .execute(&mut *conn)
        .await?;
    }

    for rule in &request.firewall_ports {
        sqlx::query(
            "INSERT INTO request_firewall_port (request_id, port, protocol, purpose, source)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(i64::from(rule.port))
        .bind(rule.protocol.as_str())
        .bind(&rule.purpose)
        .bind(&rule.source)
        .execute(&mut *conn)
        .await?;
    }

    for access in &request.network_access {
        sqlx::query(
            "INSERT OR IGNORE INTO request_network_access (request_id, access_type) VALUES (?, ?)",
        )
        .bind(&request.id.0)
        .bind(access.as_str())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Status and lifecycle timestamps only; children are left alone.
pub async fn update_request_status(
    conn: &mut SqliteConnection,
    request: &Request,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE vm_request
         SET status = ?, submitted_at = ?, provisioned_at = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(request.status.as_str())
    .bind(request.submitted_at.map(|dt| dt.to_rfc3339()))
    .bind(request.provisioned_at.map(|dt| dt.to_rfc3339()))
    .bind(request.updated_at.to_rfc3339())
    .bind(&request.id.0)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn find_request(
    conn: &mut SqliteConnection,
    id: &RequestId,
) -> Result<Option<Request>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM vm_request WHERE id = ?"))
        .bind(&id.0)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(ref r) => {
            let mut request = row_to_request(r)?;
            load_children(conn, &mut request).await?;
            Ok(Some(request))
        }
        None => Ok(None),
    }
}

pub async fn requests_for_requester(
    conn: &mut SqliteConnection,
    requester_id: &UserId,
) -> Result<Vec<Request>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "SELECT {REQUEST_COLUMNS} FROM vm_request WHERE requester_id = ? ORDER BY created_at DESC"
    ))
    .bind(&requester_id.0)
    .fetch_all(&mut *conn)
    .await?;

    let mut requests = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut request = row_to_request(row)?;
        load_children(conn, &mut request).await?;
        requests.push(request);
    }
    Ok(requests)
}
