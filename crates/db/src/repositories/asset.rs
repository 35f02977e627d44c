use chrono::{Duration, NaiveDate};
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use vmgate_core::domain::asset::{Asset, AssetId, AssetQuery};
use vmgate_core::domain::page::Paged;

use super::{
    column, enum_column, like_pattern, optional_count_column, optional_date_column,
    timestamp_column, RepositoryError,
};

const ASSET_COLUMNS: &str = "id, name, asset_type, vendor, model, serial, location,
    warranty_expiry, cpu_cores, ram_gb, storage_gb, graphics_card_model, graphics_card_spec,
    interfaces, throughput_gbps, vlan_support, capacity_tb, created_at, updated_at";

fn row_to_asset(row: &SqliteRow) -> Result<Asset, RepositoryError> {
    Ok(Asset {
        id: AssetId(column(row, "id")?),
        name: column(row, "name")?,
        asset_type: enum_column(row, "asset_type")?,
        vendor: column(row, "vendor")?,
        model: column(row, "model")?,
        serial: column(row, "serial")?,
        location: column(row, "location")?,
        warranty_expiry: optional_date_column(row, "warranty_expiry")?,
        cpu_cores: optional_count_column(row, "cpu_cores")?,
        ram_gb: optional_count_column(row, "ram_gb")?,
        storage_gb: optional_count_column(row, "storage_gb")?,
        graphics_card_model: column(row, "graphics_card_model")?,
        graphics_card_spec: column(row, "graphics_card_spec")?,
        interfaces: optional_count_column(row, "interfaces")?,
        throughput_gbps: optional_count_column(row, "throughput_gbps")?,
        vlan_support: column(row, "vlan_support")?,
        capacity_tb: optional_count_column(row, "capacity_tb")?,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

pub(crate) fn date_text(date: Option<NaiveDate>) -> Option<String> {
    date.map(|date| date.format("%Y-%m-%d").to_string())
}

/// Inserts or fully replaces the asset row.
pub async fn save_asset(conn: &mut SqliteConnection, asset: &Asset) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO asset (id, name, asset_type, vendor, model, serial, location,
             warranty_expiry, cpu_cores, ram_gb, storage_gb, graphics_card_model,
             graphics_card_spec, interfaces, throughput_gbps, vlan_support, capacity_tb,
             created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             asset_type = excluded.asset_type,
             vendor = excluded.vendor,
             model = excluded.model,
             serial = excluded.serial,
             location = excluded.location,
             warranty_expiry = excluded.warranty_expiry,
             cpu_cores = excluded.cpu_cores,
             ram_gb = excluded.ram_gb,
             storage_gb = excluded.storage_gb,
             graphics_card_model = excluded.graphics_card_model,
             graphics_card_spec = excluded.graphics_card_spec,
             interfaces = excluded.interfaces,
             throughput_gbps = excluded.throughput_gbps,
             vlan_support = excluded.vlan_support,
             capacity_tb = excluded.capacity_tb,
             updated_at = excluded.updated_at",
    )
    .bind(&asset.id.0)
    .bind(&asset.name)
    .bind(asset.asset_type.as_str())
    .bind(&asset.vendor)
    .bind(&asset.model)
    .bind(&asset.serial)
    .bind(&asset.location)
    .bind(date_text(asset.warranty_expiry))
    .bind(asset.cpu_cores.map(i64::from))
    .bind(asset.ram_gb.map(i64::from))
    .bind(asset.storage_gb.map(i64::from))
    .bind(&asset.graphics_card_model)
    .bind(&asset.graphics_card_spec)
    .bind(asset.interfaces.map(i64::from))
    .bind(asset.throughput_gbps.map(i64::from))
    .bind(asset.vlan_support)
    .bind(asset.capacity_tb.map(i64::from))
    .bind(asset.created_at.to_rfc3339())
    .bind(asset.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn find_asset(
    conn: &mut SqliteConnection,
    id: &AssetId,
) -> Result<Option<Asset>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {ASSET_COLUMNS} FROM asset WHERE id = ?"))
        .bind(&id.0)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_asset).transpose()
}

/// Returns `false` when no row had that id.
pub async fn delete_asset(
    conn: &mut SqliteConnection,
    id: &AssetId,
) -> Result<bool, RepositoryError> {
    let result =
        sqlx::query("DELETE FROM asset WHERE id = ?").bind(&id.0).execute(&mut *conn).await?;
    Ok(result.rows_affected() == 1)
}

/// One page of assets ordered by name, plus the unpaged total.
pub async fn list_assets(
    conn: &mut SqliteConnection,
    query: &AssetQuery,
    today: NaiveDate,
) -> Result<(Vec<Asset>, u64), RepositoryError> {
    let asset_type = query.asset_type.map(|kind| kind.as_str());
    let pattern = query.search_term().map(like_pattern);
    let warranty_cutoff = query
        .warranty_within_days
        .and_then(|days| date_text(Some(today + Duration::days(i64::from(days)))));
    let filter = "WHERE (?1 IS NULL OR asset_type = ?1)
          AND (?2 IS NULL
               OR LOWER(name) LIKE ?2 ESCAPE '\\'
               OR LOWER(IFNULL(vendor, '')) LIKE ?2 ESCAPE '\\'
               OR LOWER(IFNULL(model, '')) LIKE ?2 ESCAPE '\\'
               OR LOWER(IFNULL(serial, '')) LIKE ?2 ESCAPE '\\')
          AND (?3 IS NULL OR (warranty_expiry IS NOT NULL AND warranty_expiry <= ?3))";

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(1) FROM asset {filter}"))
        .bind(asset_type)
        .bind(pattern.as_deref())
        .bind(warranty_cutoff.as_deref())
        .fetch_one(&mut *conn)
        .await?;

    let rows = sqlx::query(&format!(
        "SELECT {ASSET_COLUMNS} FROM asset {filter} ORDER BY name ASC, id ASC LIMIT ?4 OFFSET ?5"
    ))
    .bind(asset_type)
    .bind(pattern.as_deref())
    .bind(warranty_cutoff.as_deref())
    .bind(i64::from(query.per_page()))
    .bind(i64::from(query.offset()))
    .fetch_all(&mut *conn)
    .await?;

    let items = rows.iter().map(row_to_asset).collect::<Result<Vec<_>, _>>()?;
    Ok((items, u64::try_from(total).unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use vmgate_core::domain::asset::{AssetId, AssetQuery, AssetType, NewAsset};

    use super::{delete_asset, find_asset, list_assets, save_asset};
    use crate::workflow::testing::migrated_pool;

    fn asset(id: &str, name: &str, asset_type: AssetType, warranty: Option<NaiveDate>) -> NewAsset {
        NewAsset {
            name: name.to_string(),
            asset_type,
            vendor: Some("Acme".to_string()),
            model: None,
            serial: Some(format!("SN-{id}")),
            location: None,
            warranty_expiry: warranty,
            cpu_cores: None,
            ram_gb: None,
            storage_gb: None,
            graphics_card_model: None,
            graphics_card_spec: None,
            interfaces: Some(24),
            throughput_gbps: None,
            vlan_support: Some(true),
            capacity_tb: None,
        }
    }

    #[tokio::test]
    async fn save_find_and_delete() {
        let pool = migrated_pool().await;
        let mut conn = pool.acquire().await.expect("conn");
        let now = Utc::now();
        let warranty = NaiveDate::from_ymd_opt(2027, 1, 31);
        let stored = asset("1", "edge-sw-01", AssetType::Switch, warranty)
            .into_asset(AssetId("AST-1".into()), now, now);

        save_asset(&mut conn, &stored).await.expect("save");
        assert_eq!(find_asset(&mut conn, &stored.id).await.expect("find"), Some(stored.clone()));

        assert!(delete_asset(&mut conn, &stored.id).await.expect("delete"));
        assert!(!delete_asset(&mut conn, &stored.id).await.expect("delete again"));
        assert_eq!(find_asset(&mut conn, &stored.id).await.expect("find"), None);
    }

    #[tokio::test]
    async fn list_filters_by_type_search_and_warranty() {
        let pool = migrated_pool().await;
        let mut conn = pool.acquire().await.expect("conn");
        let now = Utc::now();
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).expect("date");
        for (id, name, kind, warranty) in [
            ("1", "edge-sw-01", AssetType::Switch, NaiveDate::from_ymd_opt(2026, 11, 1)),
            ("2", "edge-sw-02", AssetType::Switch, NaiveDate::from_ymd_opt(2028, 1, 1)),
            ("3", "ups_main", AssetType::Ups, NaiveDate::from_ymd_opt(2025, 1, 1)),
            ("4", "nas-01", AssetType::Storage, None),
        ] {
            let row =
                asset(id, name, kind, warranty).into_asset(AssetId(format!("AST-{id}")), now, now);
            save_asset(&mut conn, &row).await.expect("save");
        }

        let switches = AssetQuery { asset_type: Some(AssetType::Switch), ..AssetQuery::default() };
        let (items, total) = list_assets(&mut conn, &switches, today).await.expect("list");
        assert_eq!(total, 2);
        assert_eq!(items[0].name, "edge-sw-01");

        let serial = AssetQuery { search: Some("sn-4".into()), ..AssetQuery::default() };
        let (items, _) = list_assets(&mut conn, &serial, today).await.expect("list");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "nas-01");

        let underscore = AssetQuery { search: Some("_".into()), ..AssetQuery::default() };
        let (items, _) = list_assets(&mut conn, &underscore, today).await.expect("list");
        assert_eq!(items.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(), vec!["ups_main"]);

        let expiring = AssetQuery { warranty_within_days: Some(30), ..AssetQuery::default() };
        let (items, total) = list_assets(&mut conn, &expiring, today).await.expect("list");
        assert_eq!(total, 2);
        let names = items.iter().map(|a| a.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["edge-sw-01", "ups_main"]);
    }
}
