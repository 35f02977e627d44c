use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::intake::trimmed;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysicalServerId(pub String);

/// A bare-metal host. Every descriptive field is optional.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalServer {
    pub id: PhysicalServerId,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub location: Option<String>,
    pub cpu_cores: Option<u32>,
    pub ram_gb: Option<u32>,
    pub storage_gb: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPhysicalServer {
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub cpu_cores: Option<u32>,
    #[serde(default)]
    pub ram_gb: Option<u32>,
    #[serde(default)]
    pub storage_gb: Option<u32>,
}

impl NewPhysicalServer {
    pub fn validate(&self) -> Result<(), DomainError> {
        for (field, value) in [
            ("cpu_cores", self.cpu_cores),
            ("ram_gb", self.ram_gb),
            ("storage_gb", self.storage_gb),
        ] {
            if value == Some(0) {
                return Err(DomainError::Validation(format!("{field} must be at least 1 when set")));
            }
        }
        Ok(())
    }

    pub fn into_server(
        self,
        id: PhysicalServerId,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> PhysicalServer {
        PhysicalServer {
            id,
            vendor: trimmed(self.vendor),
            model: trimmed(self.model),
            serial: trimmed(self.serial),
            location: trimmed(self.location),
            cpu_cores: self.cpu_cores,
            ram_gb: self.ram_gb,
            storage_gb: self.storage_gb,
            created_at,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{NewPhysicalServer, PhysicalServerId};

    #[test]
    fn zero_sizes_are_refused_and_blanks_dropped() {
        assert_eq!(NewPhysicalServer::default().validate(), Ok(()));
        let zero = NewPhysicalServer { cpu_cores: Some(0), ..NewPhysicalServer::default() };
        assert!(zero.validate().is_err());

        let now = Utc::now();
        let server = NewPhysicalServer {
            vendor: Some(" HPE ".to_string()),
            serial: Some("   ".to_string()),
            ..NewPhysicalServer::default()
        }
        .into_server(PhysicalServerId("SRV-1".into()), now, now);
        assert_eq!(server.vendor.as_deref(), Some("HPE"));
        assert_eq!(server.serial, None);
    }
}
