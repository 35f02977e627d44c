use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use vmgate_core::domain::license::{License, LicenseId, LicenseQuery};
use vmgate_core::domain::page::Paged;

use super::asset::date_text;
use super::{
    column, enum_column, like_pattern, optional_date_column, timestamp_column, RepositoryError,
};

const LICENSE_COLUMNS: &str = "id, name, vendor, license_type, expiry_date, maintenance_expiry,
    notes, created_at, updated_at";

fn row_to_license(row: &SqliteRow) -> Result<License, RepositoryError> {
    Ok(License {
        id: LicenseId(column(row, "id")?),
        name: column(row, "name")?,
        vendor: column(row, "vendor")?,
        license_type: enum_column(row, "license_type")?,
        expiry_date: optional_date_column(row, "expiry_date")?,
        maintenance_expiry: optional_date_column(row, "maintenance_expiry")?,
        notes: column(row, "notes")?,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

pub async fn save_license(
    conn: &mut SqliteConnection,
    license: &License,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO software_license (id, name, vendor, license_type, expiry_date,
             maintenance_expiry, notes, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             vendor = excluded.vendor,
             license_type = excluded.license_type,
             expiry_date = excluded.expiry_date,
             maintenance_expiry = excluded.maintenance_expiry,
             notes = excluded.notes,
             updated_at = excluded.updated_at",
    )
    .bind(&license.id.0)
    .bind(&license.name)
    .bind(&license.vendor)
    .bind(license.license_type.as_str())
    .bind(date_text(license.expiry_date))
    .bind(date_text(license.maintenance_expiry))
    .bind(&license.notes)
    .bind(license.created_at.to_rfc3339())
    .bind(license.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn find_license(
    conn: &mut SqliteConnection,
    id: &LicenseId,
) -> Result<Option<License>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {LICENSE_COLUMNS} FROM software_license WHERE id = ?"))
        .bind(&id.0)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_license).transpose()
}

pub async fn delete_license(
    conn: &mut SqliteConnection,
    id: &LicenseId,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query("DELETE FROM software_license WHERE id = ?")
        .bind(&id.0)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Name-ordered page matching name or vendor, optionally one type only.
pub async fn list_licenses(
    conn: &mut SqliteConnection,
    query: &LicenseQuery,
) -> Result<(Vec<License>, u64), RepositoryError> {
    let license_type = query.license_type.map(|kind| kind.as_str());
    let pattern = query.search_term().map(like_pattern);
    let filter = "WHERE (?1 IS NULL OR license_type = ?1)
          AND (?2 IS NULL
               OR LOWER(name) LIKE ?2 ESCAPE '\\'
               OR LOWER(vendor) LIKE ?2 ESCAPE '\\')";

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(1) FROM software_license {filter}"))
        .bind(license_type)
        .bind(pattern.as_deref())
        .fetch_one(&mut *conn)
        .await?;

    let rows = sqlx::query(&format!(
        "SELECT {LICENSE_COLUMNS} FROM software_license {filter}
         ORDER BY name ASC, id ASC LIMIT ?3 OFFSET ?4"
    ))
    .bind(license_type)
    .bind(pattern.as_deref())
    .bind(i64::from(query.per_page()))
    .bind(i64::from(query.offset()))
    .fetch_all(&mut *conn)
    .await?;

    let items = rows.iter().map(row_to_license).collect::<Result<Vec<_>, _>>()?;
    Ok((items, u64::try_from(total).unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use vmgate_core::domain::license::{LicenseId, LicenseQuery, LicenseType, NewLicense};

    use super::{find_license, list_licenses, save_license};
    use crate::workflow::testing::migrated_pool;

    #[tokio::test]
    async fn search_matches_name_or_vendor_and_filters_type() {
        let pool = migrated_pool().await;
        let mut conn = pool.acquire().await.expect("conn");
        let now = Utc::now();
        for (id, name, vendor, kind) in [
            ("1", "RHEL Server", "Red Hat", LicenseType::Subscription),
            ("2", "Windows Server", "Microsoft", LicenseType::Software),
            ("3", "vSphere", "Broadcom", LicenseType::Software),
            ("4", "100% Uptime Care", "Broadcom", LicenseType::Support),
        ] {
            let license = NewLicense {
                name: name.to_string(),
                vendor: vendor.to_string(),
                license_type: kind,
                expiry_date: None,
                maintenance_expiry: None,
                notes: None,
            }
            .into_license(LicenseId(format!("LIC-{id}")), now, now);
            save_license(&mut conn, &license).await.expect("save");
        }

        let by_vendor = LicenseQuery { search: Some("broad".into()), ..LicenseQuery::default() };
        let (items, total) = list_licenses(&mut conn, &by_vendor).await.expect("list");
        assert_eq!(total, 2);
        assert_eq!(items[0].name, "100% Uptime Care");

        let software = LicenseQuery {
            search: Some("server".into()),
            license_type: Some(LicenseType::Software),
            ..LicenseQuery::default()
        };
        let (items, total) = list_licenses(&mut conn, &software).await.expect("list");
        assert_eq!(total, 1);
        assert_eq!(items[0].vendor, "Microsoft");

        let percent = LicenseQuery { search: Some("0%".into()), ..LicenseQuery::default() };
        let (items, _) = list_licenses(&mut conn, &percent).await.expect("list");
        assert_eq!(items.len(), 1);

        let paged = LicenseQuery { per_page: Some(3), page: Some(2), ..LicenseQuery::default() };
        let (items, total) = list_licenses(&mut conn, &paged).await.expect("list");
        assert_eq!((items.len(), total), (1, 4));
    }

    #[tokio::test]
    async fn resave_updates_in_place() {
        let pool = migrated_pool().await;
        let mut conn = pool.acquire().await.expect("conn");
        let now = Utc::now();
        let mut license = NewLicense {
            name: "Veeam".to_string(),
            vendor: "Veeam".to_string(),
            license_type: LicenseType::Software,
            expiry_date: None,
            maintenance_expiry: None,
            notes: Some("20 sockets".to_string()),
        }
        .into_license(LicenseId("LIC-1".into()), now, now);
        save_license(&mut conn, &license).await.expect("save");

        license.notes = Some("40 sockets".to_string());
        save_license(&mut conn, &license).await.expect("resave");

        let stored = find_license(&mut conn, &license.id).await.expect("find").expect("exists");
        assert_eq!(stored.notes.as_deref(), Some("40 sockets"));
    }
}
