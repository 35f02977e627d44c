use chrono::{NaiveDate, NaiveTime};
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use vmgate_core::domain::manpower::{
    Designation, DesignationId, ManpowerSubmission, SubmissionId, SubmissionQuery,
};
use vmgate_core::domain::page::Paged;
use vmgate_core::domain::user::UserId;

use super::{column, count_column, like_pattern, timestamp_column, RepositoryError};

const SUBMISSION_COLUMNS: &str = "id, submitter_id, designation_id, facility_code, facility_name,
    consolidated_salary, total_post, male, female, total_manpower, vacant, submitted_at,
    updated_at";

fn row_to_submission(row: &SqliteRow) -> Result<ManpowerSubmission, RepositoryError> {
    let salary: i64 = column(row, "consolidated_salary")?;
    Ok(ManpowerSubmission {
        id: SubmissionId(column(row, "id")?),
        submitter_id: UserId(column(row, "submitter_id")?),
        designation_id: DesignationId(column(row, "designation_id")?),
        facility_code: column(row, "facility_code")?,
        facility_name: column(row, "facility_name")?,
        consolidated_salary: u64::try_from(salary)
            .map_err(|_| RepositoryError::Decode(format!("invalid salary {salary}")))?,
        total_post: count_column(row, "total_post")?,
        male: count_column(row, "male")?,
        female: count_column(row, "female")?,
        total_manpower: count_column(row, "total_manpower")?,
        vacant: count_column(row, "vacant")?,
        submitted_at: timestamp_column(row, "submitted_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

pub async fn list_designations(
    conn: &mut SqliteConnection,
) -> Result<Vec<Designation>, RepositoryError> {
    let rows = sqlx::query("SELECT id, name, category FROM designation ORDER BY name ASC")
        .fetch_all(&mut *conn)
        .await?;
    rows.iter()
        .map(|row| {
            Ok(Designation {
                id: DesignationId(column(row, "id")?),
                name: column(row, "name")?,
                category: column(row, "category")?,
            })
        })
        .collect()
}

pub async fn designation_exists(
    conn: &mut SqliteConnection,
    id: &DesignationId,
) -> Result<bool, RepositoryError> {
    let exists: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM designation WHERE id = ?)")
        .bind(&id.0)
        .fetch_one(&mut *conn)
        .await?;
    Ok(exists == 1)
}

pub async fn save_submission(
    conn: &mut SqliteConnection,
    submission: &ManpowerSubmission,
) -> Result<(), RepositoryError> {
    let salary = i64::try_from(submission.consolidated_salary)
        .map_err(|_| RepositoryError::Decode("salary out of range".to_string()))?;
    sqlx::query(
        "INSERT INTO manpower_submission (id, submitter_id, designation_id, facility_code,
             facility_name, consolidated_salary, total_post, male, female, total_manpower,
             vacant, submitted_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             designation_id = excluded.designation_id,
             consolidated_salary = excluded.consolidated_salary,
             total_post = excluded.total_post,
             male = excluded.male,
             female = excluded.female,
             total_manpower = excluded.total_manpower,
             vacant = excluded.vacant,
             updated_at = excluded.updated_at",
    )
    .bind(&submission.id.0)
    .bind(&submission.submitter_id.0)
    .bind(&submission.designation_id.0)
    .bind(&submission.facility_code)
    .bind(&submission.facility_name)
    .bind(salary)
    .bind(i64::from(submission.total_post))
    .bind(i64::from(submission.male))
    .bind(i64::from(submission.female))
    .bind(i64::from(submission.total_manpower))
    .bind(i64::from(submission.vacant))
    .bind(submission.submitted_at.to_rfc3339())
    .bind(submission.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn find_submission(
    conn: &mut SqliteConnection,
    id: &SubmissionId,
) -> Result<Option<ManpowerSubmission>, RepositoryError> {
    let row = sqlx::query(&format!(
        "SELECT {SUBMISSION_COLUMNS} FROM manpower_submission WHERE id = ?"
    ))
    .bind(&id.0)
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(row_to_submission).transpose()
}

/// RFC 3339 lower and exclusive upper bounds covering whole UTC days.
fn day_bounds(query: &SubmissionQuery) -> (Option<String>, Option<String>) {
    let start_of = |date: NaiveDate| date.and_time(NaiveTime::MIN).and_utc().to_rfc3339();
    (
        query.date_from.map(start_of),
        query.date_to.and_then(|date| date.succ_opt()).map(start_of),
    )
}

/// Newest-first page of submissions. `submitter` narrows to one user's rows.
pub async fn list_submissions(
    conn: &mut SqliteConnection,
    query: &SubmissionQuery,
    submitter: Option<&UserId>,
) -> Result<(Vec<ManpowerSubmission>, u64), RepositoryError> {
    let facility = query.facility_term().map(like_pattern);
    let designation = query.designation();
    let submitter = submitter.map(|id| id.0.as_str());
    let (from, until) = day_bounds(query);
    let filter = "WHERE (?1 IS NULL OR LOWER(facility_code) LIKE ?1 ESCAPE '\\')
          AND (?2 IS NULL OR designation_id = ?2)
          AND (?3 IS NULL OR submitter_id = ?3)
          AND (?4 IS NULL OR submitted_at >= ?4)
          AND (?5 IS NULL OR submitted_at < ?5)";

    let total: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(1) FROM manpower_submission {filter}"))
            .bind(facility.as_deref())
            .bind(designation)
            .bind(submitter)
            .bind(from.as_deref())
            .bind(until.as_deref())
            .fetch_one(&mut *conn)
            .await?;

    let rows = sqlx::query(&format!(
        "SELECT {SUBMISSION_COLUMNS} FROM manpower_submission {filter}
         ORDER BY submitted_at DESC, id DESC LIMIT ?6 OFFSET ?7"
    ))
    .bind(facility.as_deref())
    .bind(designation)
    .bind(submitter)
    .bind(from.as_deref())
    .bind(until.as_deref())
    .bind(i64::from(query.per_page()))
    .bind(i64::from(query.offset()))
    .fetch_all(&mut *conn)
    .await?;

    let items = rows.iter().map(row_to_submission).collect::<Result<Vec<_>, _>>()?;
    Ok((items, u64::try_from(total).unwrap_or_default()))
}
