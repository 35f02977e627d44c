use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use vmgate_core::domain::user::{Principal, Role, User, UserId};

use super::{column, enum_column, timestamp_column, RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &SqliteRow, roles: Vec<Role>) -> Result<User, RepositoryError> {
    Ok(User {
        id: UserId(column(row, "id")?),
        email: column(row, "email")?,
        display_name: column(row, "display_name")?,
        roles,
        created_at: timestamp_column(row, "created_at")?,
    })
}

async fn roles_for(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<Vec<Role>, RepositoryError> {
    let rows = sqlx::query("SELECT role FROM user_role WHERE user_id = ? ORDER BY role")
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;
    let mut roles = rows.iter().map(|row| enum_column::<Role>(row, "role")).collect::<Result<Vec<_>, _>>()?;
    roles.sort();
    Ok(roles)
}

pub async fn save_user(conn: &mut SqliteConnection, user: &User) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO app_user (id, email, display_name, created_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             email = excluded.email,
             display_name = excluded.display_name",
    )
    .bind(&user.id.0)
    .bind(&user.email)
    .bind(&user.display_name)
    .bind(user.created_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM user_role WHERE user_id = ?").bind(&user.id.0).execute(&mut *conn).await?;
    for role in &user.roles {
        sqlx::query("INSERT OR IGNORE INTO user_role (user_id, role) VALUES (?, ?)")
            .bind(&user.id.0)
            .bind(role.as_str())
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

pub async fn find_user(
    conn: &mut SqliteConnection,
    id: &UserId,
) -> Result<Option<User>, RepositoryError> {
    let row = sqlx::query("SELECT id, email, display_name, created_at FROM app_user WHERE id = ?")
        .bind(&id.0)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(ref r) => {
            let roles = roles_for(conn, &id.0).await?;
            Ok(Some(row_to_user(r, roles)?))
        }
        None => Ok(None),
    }
}

pub async fn list_approvers(conn: &mut SqliteConnection) -> Result<Vec<User>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT DISTINCT u.id, u.email, u.display_name, u.created_at
         FROM app_user u
         JOIN user_role r ON r.user_id = u.id
         WHERE r.role IN ('APPROVER_L1', 'APPROVER_L2', 'APPROVER_L3')
         ORDER BY u.id",
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut users = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: String = column(row, "id")?;
        let roles = roles_for(conn, &id).await?;
        users.push(row_to_user(row, roles)?);
    }
    Ok(users)
}

pub async fn insert_session(
    conn: &mut SqliteConnection,
    user_id: &UserId,
    token_hash: &str,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO user_session (token_hash, user_id, created_at, expires_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(token_hash) DO UPDATE SET expires_at = excluded.expires_at",
    )
    .bind(token_hash)
    .bind(&user_id.0)
    .bind(created_at.to_rfc3339())
    .bind(expires_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn resolve_session(
    conn: &mut SqliteConnection,
    token_hash: &str,
    now: DateTime<Utc>,
) -> Result<Option<Principal>, RepositoryError> {
    let row = sqlx::query("SELECT user_id, expires_at FROM user_session WHERE token_hash = ?")
        .bind(token_hash)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    if timestamp_column(&row, "expires_at")? <= now {
        return Ok(None);
    }

    let user_id: String = column(&row, "user_id")?;
    let roles = roles_for(conn, &user_id).await?;
    Ok(Some(Principal { user_id: UserId(user_id), roles }))
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        find_user(&mut conn, id).await
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        save_user(&mut tx, &user).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_approvers(&self) -> Result<Vec<User>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        list_approvers(&mut conn).await
    }

    async fn create_session(
        &self,
        user_id: &UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        insert_session(&mut conn, user_id, token_hash, Utc::now(), expires_at).await
    }

    async fn resolve_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Principal>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        resolve_session(&mut conn, token_hash, now).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use vmgate_core::domain::user::{Role, User, UserId};

    use super::SqlUserRepository;
    use crate::repositories::UserRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn user(id: &str, roles: Vec<Role>) -> User {
        User {
            id: UserId(id.to_string()),
            email: format!("{id}@example.org"),
            display_name: id.to_uppercase(),
            roles,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_replaces_roles() {
        let repo = SqlUserRepository::new(setup().await);
        repo.save(user("u1", vec![Role::Requester, Role::ApproverL1])).await.expect("save");
        repo.save(user("u1", vec![Role::ApproverL2])).await.expect("resave");

        let found = repo.find_by_id(&UserId("u1".into())).await.expect("find").expect("exists");
        assert_eq!(found.roles, vec![Role::ApproverL2]);
    }

    #[tokio::test]
    async fn approvers_exclude_non_approver_roles() {
        let repo = SqlUserRepository::new(setup().await);
        repo.save(user("req", vec![Role::Requester])).await.expect("save requester");
        repo.save(user("ops", vec![Role::DcOps])).await.expect("save ops");
        repo.save(user("a1", vec![Role::ApproverL1, Role::ApproverL3])).await.expect("save a1");

        let approvers = repo.list_approvers().await.expect("list");
        assert_eq!(approvers.len(), 1);
        assert_eq!(approvers[0].id.0, "a1");
        assert_eq!(approvers[0].roles, vec![Role::ApproverL1, Role::ApproverL3]);
    }

    #[tokio::test]
    async fn sessions_resolve_until_expiry() {
        let repo = SqlUserRepository::new(setup().await);
        repo.save(user("u1", vec![Role::Requester])).await.expect("save");
        let now = Utc::now();
        repo.create_session(&UserId("u1".into()), "hash-1", now + Duration::hours(1))
            .await
            .expect("session");

        let principal = repo.resolve_session("hash-1", now).await.expect("resolve");
        assert_eq!(principal.map(|p| p.user_id.0), Some("u1".to_string()));

        let expired = repo.resolve_session("hash-1", now + Duration::hours(2)).await.expect("resolve");
        assert!(expired.is_none());
        assert!(repo.resolve_session("unknown", now).await.expect("resolve").is_none());
    }
}
