use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

use vmgate_core::domain::user::{Principal, User, UserId};
use vmgate_core::errors::{DomainError, WorkflowError};

pub mod approval;
pub mod asset;
pub mod audit;
pub mod customization;
pub mod license;
pub mod manpower;
pub mod physical_server;
pub mod request;
pub mod user;
pub mod vm;

pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for WorkflowError {
    fn from(value: RepositoryError) -> Self {
        WorkflowError::Persistence(value.to_string())
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn save(&self, user: User) -> Result<(), RepositoryError>;
    /// Every user holding at least one approver role.
    async fn list_approvers(&self) -> Result<Vec<User>, RepositoryError>;
    async fn create_session(
        &self,
        user_id: &UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    /// The caller behind an unexpired session, if any.
    async fn resolve_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Principal>, RepositoryError>;
}

/// Lowercased `%term%` pattern for `LIKE ... ESCAPE '\\'`, with the
/// wildcard characters in `term` matched literally.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.to_lowercase().chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn count_column(row: &SqliteRow, name: &str) -> Result<u32, RepositoryError> {
    let value: i64 = column(row, name)?;
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("column `{name}` out of range: {value}")))
}

pub(crate) fn optional_count_column(
    row: &SqliteRow,
    name: &str,
) -> Result<Option<u32>, RepositoryError> {
    let value: Option<i64> = column(row, name)?;
    value
        .map(|value| {
            u32::try_from(value).map_err(|_| {
                RepositoryError::Decode(format!("column `{name}` out of range: {value}"))
            })
        })
        .transpose()
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{value}`: {e}")))
}

pub(crate) fn timestamp_column(
    row: &SqliteRow,
    name: &str,
) -> Result<DateTime<Utc>, RepositoryError> {
    let raw: String = column(row, name)?;
    parse_timestamp(&raw)
}

pub(crate) fn optional_timestamp_column(
    row: &SqliteRow,
    name: &str,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    let raw: Option<String> = column(row, name)?;
    raw.as_deref().map(parse_timestamp).transpose()
}

pub(crate) fn optional_date_column(
    row: &SqliteRow,
    name: &str,
) -> Result<Option<NaiveDate>, RepositoryError> {
    let raw: Option<String> = column(row, name)?;
    raw.map(|value| {
        NaiveDate::parse_from_str(&value, "%Y-%m-%d")
            .map_err(|e| RepositoryError::Decode(format!("invalid date `{value}`: {e}")))
    })
    .transpose()
}

pub(crate) fn enum_column<T>(row: &SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: FromStr<Err = DomainError>,
{
    let raw: String = column(row, name)?;
    raw.parse::<T>().map_err(|e| RepositoryError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::like_pattern;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Web"), "%web%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }
}
