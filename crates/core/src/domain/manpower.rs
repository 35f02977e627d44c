//! Facility manpower returns: per designation, how many posts exist and how
//! many are filled.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::page::{search_term, Paged};
use crate::domain::user::UserId;
use crate::errors::DomainError;
use crate::intake::require_text;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DesignationId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Designation {
    pub id: DesignationId,
    pub name: String,
    pub category: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManpowerSubmission {
    pub id: SubmissionId,
    pub submitter_id: UserId,
    pub designation_id: DesignationId,
    pub facility_code: String,
    pub facility_name: String,
    pub consolidated_salary: u64,
    pub total_post: u32,
    pub male: u32,
    pub female: u32,
    pub total_manpower: u32,
    pub vacant: u32,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Headcount derived from posts and filled positions. Overstaffing clamps
/// `vacant` at zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Headcount {
    pub total_manpower: u32,
    pub vacant: u32,
}

impl Headcount {
    pub fn new(total_post: u32, male: u32, female: u32) -> Self {
        let total_manpower = male.saturating_add(female);
        Self { total_manpower, vacant: total_post.saturating_sub(total_manpower) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubmission {
    pub designation_id: DesignationId,
    pub facility_code: String,
    pub facility_name: String,
    pub consolidated_salary: u64,
    pub total_post: u32,
    #[serde(default)]
    pub male: u32,
    #[serde(default)]
    pub female: u32,
}

impl NewSubmission {
    pub fn validate(&self) -> Result<(), DomainError> {
        require_text("designation_id", &self.designation_id.0)?;
        require_text("facility_code", &self.facility_code)?;
        require_text("facility_name", &self.facility_name)?;
        if self.consolidated_salary == 0 {
            return Err(DomainError::Validation("consolidated_salary must be positive".to_string()));
        }
        if self.total_post == 0 {
            return Err(DomainError::Validation("total_post must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn into_submission(
        self,
        id: SubmissionId,
        submitter_id: UserId,
        submitted_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ManpowerSubmission {
        let headcount = Headcount::new(self.total_post, self.male, self.female);
        ManpowerSubmission {
            id,
            submitter_id,
            designation_id: DesignationId(self.designation_id.0.trim().to_string()),
            facility_code: self.facility_code.trim().to_string(),
            facility_name: self.facility_name.trim().to_string(),
            consolidated_salary: self.consolidated_salary,
            total_post: self.total_post,
            male: self.male,
            female: self.female,
            total_manpower: headcount.total_manpower,
            vacant: headcount.vacant,
            submitted_at,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Substring of the facility code.
    pub facility_code: Option<String>,
    pub designation_id: Option<String>,
    /// Inclusive bounds on the submission date.
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl Paged for SubmissionQuery {
    fn requested_page(&self) -> Option<u32> {
        self.page
    }

    fn requested_per_page(&self) -> Option<u32> {
        self.per_page
    }
}

impl SubmissionQuery {
    pub fn facility_term(&self) -> Option<&str> {
        search_term(self.facility_code.as_deref())
    }

    pub fn designation(&self) -> Option<&str> {
        search_term(self.designation_id.as_deref())
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(DomainError::Validation(
                    "date_from must not be after date_to".to_string(),
                ));
            }
        }
        Ok(())
    }
}
