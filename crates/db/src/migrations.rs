use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Versions shipped in this build that the database has not applied yet.
pub async fn pending_versions(pool: &DbPool) -> Result<Vec<i64>, sqlx::Error> {
    let tracked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;
    let applied: Vec<i64> = if tracked == 0 {
        Vec::new()
    } else {
        sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?
    };

    Ok(MIGRATOR
        .iter()
        .filter(|migration| !migration.migration_type.is_down_migration())
        .map(|migration| migration.version)
        .filter(|version| !applied.contains(version))
        .collect())
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{pending_versions, run_pending};
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const MANAGED_TABLES: &[&str] = &[
        "app_user",
        "user_role",
        "user_session",
        "vm_request",
        "request_disk",
        "request_firewall_port",
        "request_network_access",
        "vm_instance",
        "vm_spec",
        "customization_request",
        "approval",
        "audit_log",
        "asset",
        "software_license",
        "physical_server",
        "designation",
        "manpower_submission",
    ];

    const MANAGED_INDEXES: &[&str] = &[
        "idx_user_session_user_id",
        "idx_vm_request_requester_id",
        "idx_vm_request_status",
        "idx_vm_instance_request_id",
        "idx_vm_instance_status",
        "idx_vm_spec_vm_id",
        "idx_customization_request_target_vm_id",
        "idx_approval_entity",
        "idx_approval_approver_id",
        "idx_audit_log_entity",
        "idx_asset_asset_type",
        "idx_software_license_license_type",
        "idx_manpower_submission_submitter_id",
        "idx_manpower_submission_submitted_at",
    ];

    async fn object_count(pool: &sqlx::SqlitePool, kind: &str, name: &str) -> i64 {
        sqlx::query("SELECT COUNT(*) AS count FROM sqlite_master WHERE type = ?1 AND name = ?2")
            .bind(kind)
            .bind(name)
            .fetch_one(pool)
            .await
            .expect("query sqlite_master")
            .get::<i64, _>("count")
    }

    #[tokio::test]
    async fn migrations_create_baseline_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for table in MANAGED_TABLES {
            assert_eq!(object_count(&pool, "table", table).await, 1, "missing table {table}");
        }
        for index in MANAGED_INDEXES {
            assert_eq!(object_count(&pool, "index", index).await, 1, "missing index {index}");
        }
    }

    #[tokio::test]
    async fn pending_versions_drain_after_run() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        assert_eq!(pending_versions(&pool).await.expect("pending before"), vec![1, 2]);

        run_pending(&pool).await.expect("run migrations");
        assert!(pending_versions(&pool).await.expect("pending after").is_empty());
    }

    #[tokio::test]
    async fn user_roles_accept_reporting_roles_after_upgrade() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        sqlx::query(
            "INSERT INTO app_user (id, email, display_name, created_at)
             VALUES ('u1', 'u1@example.org', 'U1', '2026-01-01T00:00:00+00:00')",
        )
        .execute(&pool)
        .await
        .expect("insert user");

        for role in ["SUBMITTER", "EXPORTER", "REQUESTER"] {
            sqlx::query("INSERT INTO user_role (user_id, role) VALUES ('u1', ?1)")
                .bind(role)
                .execute(&pool)
                .await
                .expect("insert role");
        }
        let bogus = sqlx::query("INSERT INTO user_role (user_id, role) VALUES ('u1', 'AUDITOR')")
            .execute(&pool)
            .await;
        assert!(bogus.is_err(), "check constraint should refuse unknown roles");

        let designations: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM designation")
            .fetch_one(&pool)
            .await
            .expect("count designations");
        assert_eq!(designations, 4);
    }

    #[tokio::test]
    async fn approval_decision_defaults_to_pending_and_rejects_unknown_values() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        sqlx::query(
            "INSERT INTO app_user (id, email, display_name, created_at)
             VALUES ('u1', 'u1@example.org', 'U1', '2026-01-01T00:00:00+00:00')",
        )
        .execute(&pool)
        .await
        .expect("insert user");

        sqlx::query(
            "INSERT INTO approval (id, entity_type, entity_id, approver_id, level, created_at)
             VALUES ('A1', 'REQUEST', 'R1', 'u1', 'L1', '2026-01-01T00:00:00+00:00')",
        )
        .execute(&pool)
        .await
        .expect("insert approval");

        let decision: String = sqlx::query_scalar("SELECT decision FROM approval WHERE id = 'A1'")
            .fetch_one(&pool)
            .await
            .expect("read decision");
        assert_eq!(decision, "PENDING");

        let bogus = sqlx::query("UPDATE approval SET decision = 'MAYBE' WHERE id = 'A1'")
            .execute(&pool)
            .await;
        assert!(bogus.is_err(), "check constraint should refuse unknown decisions");
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        for table in MANAGED_TABLES {
            assert_eq!(object_count(&pool, "table", table).await, 0, "table {table} survived undo");
        }
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            MANAGED_TABLES.len() + MANAGED_INDEXES.len(),
            "initial migration pass should create all managed schema objects",
        );

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let after_down_signature = managed_schema_signature(&pool).await;
        assert!(
            after_down_signature.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");

        let after_second_up_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            after_second_up_signature, initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            let managed = MANAGED_TABLES.contains(&name.as_str())
                || MANAGED_INDEXES.contains(&name.as_str());
            managed.then(|| (row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
        })
        .collect();
        signature.sort();
        signature
    }
}
