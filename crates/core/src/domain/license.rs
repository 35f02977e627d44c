use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::page::{search_term, Paged};
use crate::domain::persisted_enum;
use crate::errors::DomainError;
use crate::intake::{require_text, trimmed};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LicenseId(pub String);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LicenseType {
    #[default]
    Software,
    Subscription,
    Support,
}

persisted_enum!(LicenseType, "license type", {
    Software => "SOFTWARE",
    Subscription => "SUBSCRIPTION",
    Support => "SUPPORT",
});

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub id: LicenseId,
    pub name: String,
    pub vendor: String,
    pub license_type: LicenseType,
    pub expiry_date: Option<NaiveDate>,
    pub maintenance_expiry: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLicense {
    pub name: String,
    pub vendor: String,
    #[serde(default)]
    pub license_type: LicenseType,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub maintenance_expiry: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewLicense {
    pub fn validate(&self) -> Result<(), DomainError> {
        require_text("name", &self.name)?;
        require_text("vendor", &self.vendor)
    }

    pub fn into_license(
        self,
        id: LicenseId,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> License {
        License {
            id,
            name: self.name.trim().to_string(),
            vendor: self.vendor.trim().to_string(),
            license_type: self.license_type,
            expiry_date: self.expiry_date,
            maintenance_expiry: self.maintenance_expiry,
            notes: trimmed(self.notes),
            created_at,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Matches name or vendor.
    pub search: Option<String>,
    pub license_type: Option<LicenseType>,
}

impl Paged for LicenseQuery {
    fn requested_page(&self) -> Option<u32> {
        self.page
    }

    fn requested_per_page(&self) -> Option<u32> {
        self.per_page
    }
}

impl LicenseQuery {
    pub fn search_term(&self) -> Option<&str> {
        search_term(self.search.as_deref())
    }
}
