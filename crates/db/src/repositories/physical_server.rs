use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use vmgate_core::domain::physical_server::{PhysicalServer, PhysicalServerId};

use super::{column, optional_count_column, timestamp_column, RepositoryError};

const SERVER_COLUMNS: &str =
    "id, vendor, model, serial, location, cpu_cores, ram_gb, storage_gb, created_at, updated_at";

fn row_to_server(row: &SqliteRow) -> Result<PhysicalServer, RepositoryError> {
    Ok(PhysicalServer {
        id: PhysicalServerId(column(row, "id")?),
        vendor: column(row, "vendor")?,
        model: column(row, "model")?,
        serial: column(row, "serial")?,
        location: column(row, "location")?,
        cpu_cores: optional_count_column(row, "cpu_cores")?,
        ram_gb: optional_count_column(row, "ram_gb")?,
        storage_gb: optional_count_column(row, "storage_gb")?,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

pub async fn save_server(
    conn: &mut SqliteConnection,
    server: &PhysicalServer,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO physical_server (id, vendor, model, serial, location, cpu_cores, ram_gb,
             storage_gb, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             vendor = excluded.vendor,
             model = excluded.model,
             serial = excluded.serial,
             location = excluded.location,
             cpu_cores = excluded.cpu_cores,
             ram_gb = excluded.ram_gb,
             storage_gb = excluded.storage_gb,
             updated_at = excluded.updated_at",
    )
    .bind(&server.id.0)
    .bind(&server.vendor)
    .bind(&server.model)
    .bind(&server.serial)
    .bind(&server.location)
    .bind(server.cpu_cores.map(i64::from))
    .bind(server.ram_gb.map(i64::from))
    .bind(server.storage_gb.map(i64::from))
    .bind(server.created_at.to_rfc3339())
    .bind(server.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn find_server(
    conn: &mut SqliteConnection,
    id: &PhysicalServerId,
) -> Result<Option<PhysicalServer>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {SERVER_COLUMNS} FROM physical_server WHERE id = ?"))
        .bind(&id.0)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_server).transpose()
}

pub async fn delete_server(
    conn: &mut SqliteConnection,
    id: &PhysicalServerId,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query("DELETE FROM physical_server WHERE id = ?")
        .bind(&id.0)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Every server, by location then serial.
pub async fn list_servers(
    conn: &mut SqliteConnection,
) -> Result<Vec<PhysicalServer>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "SELECT {SERVER_COLUMNS} FROM physical_server
         ORDER BY IFNULL(location, '') ASC, IFNULL(serial, '') ASC, id ASC"
    ))
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(row_to_server).collect()
}
