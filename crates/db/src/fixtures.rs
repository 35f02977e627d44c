use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Demo accounts shipped in `config/fixtures/demo_seed.sql`, one per role.
const DEMO_USERS: &[DemoUser] = &[
    DemoUser { user_id: "user-requester", role: "REQUESTER", token: "vmg_demo_requester" },
    DemoUser { user_id: "user-approver-l1", role: "APPROVER_L1", token: "vmg_demo_approver_l1" },
    DemoUser { user_id: "user-approver-l2", role: "APPROVER_L2", token: "vmg_demo_approver_l2" },
    DemoUser { user_id: "user-approver-l3", role: "APPROVER_L3", token: "vmg_demo_approver_l3" },
    DemoUser { user_id: "user-dcops", role: "DC_OPS", token: "vmg_demo_dcops" },
    DemoUser { user_id: "user-admin", role: "ADMIN", token: "vmg_demo_admin" },
    DemoUser { user_id: "user-submitter", role: "SUBMITTER", token: "vmg_demo_submitter" },
    DemoUser { user_id: "user-exporter", role: "EXPORTER", token: "vmg_demo_exporter" },
];

/// Seed dataset for local demos and end-to-end checks: one user per role,
/// each with a non-expiring bearer session.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    /// Loads the dataset. Safe to run repeatedly.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult { users: DEMO_USERS.to_vec() })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for user in DEMO_USERS {
            let has_role: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM user_role WHERE user_id = ?1 AND role = ?2)",
            )
            .bind(user.user_id)
            .bind(user.role)
            .fetch_one(pool)
            .await?;
            checks.push((user.user_id, has_role == 1));

            let has_session: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM user_session WHERE user_id = ?1 AND token_hash = ?2)",
            )
            .bind(user.user_id)
            .bind(vmgate_core::auth::hash_token(user.token))
            .fetch_one(pool)
            .await?;
            checks.push((user.token, has_session == 1));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the demo users and everything that references them.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let ids = sql_array_from_ids(DEMO_USERS.iter().map(|user| user.user_id));
        let mut tx = pool.begin().await?;
        for table in ["user_session", "user_role"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE user_id IN {ids}"))
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query(&format!("DELETE FROM approval WHERE approver_id IN {ids}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM manpower_submission WHERE submitter_id IN {ids}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM app_user WHERE id IN {ids}")).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

fn sql_array_from_ids<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    let quoted = ids.map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoUser {
    pub user_id: &'static str,
    pub role: &'static str,
    /// Raw bearer token; only its digest is stored.
    pub token: &'static str,
}

#[derive(Debug)]
pub struct SeedResult {
    pub users: Vec<DemoUser>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use vmgate_core::auth::SessionToken;
    use vmgate_core::domain::user::Role;

    use super::*;
    use crate::repositories::{SqlUserRepository, UserRepository};
    use crate::{connect_with_settings, migrations};

    #[test]
    fn sql_fixture_covers_every_demo_user() {
        for user in DEMO_USERS {
            assert!(DemoSeedDataset::SQL.contains(user.user_id), "{} missing", user.user_id);
            assert!(
                DemoSeedDataset::SQL.contains(&vmgate_core::auth::hash_token(user.token)),
                "session digest for {} missing",
                user.user_id
            );
        }
    }

    #[tokio::test]
    async fn seed_is_idempotent_and_verifiable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");

        let first = DemoSeedDataset::load(&pool).await.expect("first load");
        let second = DemoSeedDataset::load(&pool).await.expect("second load");
        assert_eq!(first.users, second.users);

        let verification = DemoSeedDataset::verify(&pool).await.expect("verify");
        assert!(verification.all_present, "failed checks: {:?}", verification.checks);

        let users: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM app_user")
            .fetch_one(&pool)
            .await
            .expect("count users");
        assert_eq!(users, DEMO_USERS.len() as i64);
    }

    #[tokio::test]
    async fn demo_tokens_resolve_to_principals() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        DemoSeedDataset::load(&pool).await.expect("load");

        let users = SqlUserRepository::new(pool.clone());
        let token = SessionToken::from_raw("vmg_demo_approver_l2");
        let principal = users
            .resolve_session(&token.hash(), Utc::now())
            .await
            .expect("resolve")
            .expect("demo session active");
        assert_eq!(principal.user_id.0, "user-approver-l2");
        assert!(principal.has_role(Role::ApproverL2));
    }

    #[tokio::test]
    async fn clean_removes_demo_users() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        DemoSeedDataset::load(&pool).await.expect("load");

        DemoSeedDataset::clean(&pool).await.expect("clean");

        let verification = DemoSeedDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        assert!(verification.checks.iter().all(|(_, present)| !present));
    }
}
