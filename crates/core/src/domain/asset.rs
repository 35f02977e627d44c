//! Data-center hardware register: racks of routers, switches, storage and
//! anything else that carries a serial number and a warranty.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::page::{search_term, Paged};
use crate::domain::persisted_enum;
use crate::errors::DomainError;
use crate::intake::{require_text, trimmed};

/// Days before expiry at which a warranty counts as expiring.
pub const WARRANTY_NOTICE_DAYS: i64 = 30;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetType {
    Server,
    Router,
    Switch,
    Firewall,
    Storage,
    Ups,
    ConsoleServer,
    Other,
}

persisted_enum!(AssetType, "asset type", {
    Server => "SERVER",
    Router => "ROUTER",
    Switch => "SWITCH",
    Firewall => "FIREWALL",
    Storage => "STORAGE",
    Ups => "UPS",
    ConsoleServer => "CONSOLE_SERVER",
    Other => "OTHER",
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarrantyState {
    Unknown,
    Covered,
    Expiring,
    Expired,
}

/// Every field beyond name and type is optional; which ones matter depends
/// on the kind of equipment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub name: String,
    pub asset_type: AssetType,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub location: Option<String>,
    pub warranty_expiry: Option<NaiveDate>,
    pub cpu_cores: Option<u32>,
    pub ram_gb: Option<u32>,
    pub storage_gb: Option<u32>,
    pub graphics_card_model: Option<String>,
    pub graphics_card_spec: Option<String>,
    pub interfaces: Option<u32>,
    pub throughput_gbps: Option<u32>,
    pub vlan_support: Option<bool>,
    pub capacity_tb: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    pub fn warranty_state(&self, today: NaiveDate) -> WarrantyState {
        match self.warranty_expiry {
            None => WarrantyState::Unknown,
            Some(expiry) if expiry < today => WarrantyState::Expired,
            Some(expiry) if (expiry - today).num_days() <= WARRANTY_NOTICE_DAYS => {
                WarrantyState::Expiring
            }
            Some(_) => WarrantyState::Covered,
        }
    }

    pub fn view(self, today: NaiveDate) -> AssetView {
        let warranty_state = self.warranty_state(today);
        AssetView { asset: self, warranty_state }
    }
}

/// An asset with its warranty state as of one day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AssetView {
    #[serde(flatten)]
    pub asset: Asset,
    pub warranty_state: WarrantyState,
}

/// Create and update payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAsset {
    pub name: String,
    pub asset_type: AssetType,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub warranty_expiry: Option<NaiveDate>,
    #[serde(default)]
    pub cpu_cores: Option<u32>,
    #[serde(default)]
    pub ram_gb: Option<u32>,
    #[serde(default)]
    pub storage_gb: Option<u32>,
    #[serde(default)]
    pub graphics_card_model: Option<String>,
    #[serde(default)]
    pub graphics_card_spec: Option<String>,
    #[serde(default)]
    pub interfaces: Option<u32>,
    #[serde(default)]
    pub throughput_gbps: Option<u32>,
    #[serde(default)]
    pub vlan_support: Option<bool>,
    #[serde(default)]
    pub capacity_tb: Option<u32>,
}

impl NewAsset {
    pub fn validate(&self) -> Result<(), DomainError> {
        require_text("name", &self.name)?;
        for (field, value) in [
            ("cpu_cores", self.cpu_cores),
            ("ram_gb", self.ram_gb),
            ("storage_gb", self.storage_gb),
            ("interfaces", self.interfaces),
            ("throughput_gbps", self.throughput_gbps),
            ("capacity_tb", self.capacity_tb),
        ] {
            if value == Some(0) {
                return Err(DomainError::Validation(format!("{field} must be at least 1 when set")));
            }
        }
        Ok(())
    }

    /// Builds the stored row; blank text fields become `None`.
    pub fn into_asset(self, id: AssetId, created_at: DateTime<Utc>, now: DateTime<Utc>) -> Asset {
        Asset {
            id,
            name: self.name.trim().to_string(),
            asset_type: self.asset_type,
            vendor: trimmed(self.vendor),
            model: trimmed(self.model),
            serial: trimmed(self.serial),
            location: trimmed(self.location),
            warranty_expiry: self.warranty_expiry,
            cpu_cores: self.cpu_cores,
            ram_gb: self.ram_gb,
            storage_gb: self.storage_gb,
            graphics_card_model: trimmed(self.graphics_card_model),
            graphics_card_spec: trimmed(self.graphics_card_spec),
            interfaces: self.interfaces,
            throughput_gbps: self.throughput_gbps,
            vlan_support: self.vlan_support,
            capacity_tb: self.capacity_tb,
            created_at,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub asset_type: Option<AssetType>,
    /// Matches name, vendor, model or serial.
    pub search: Option<String>,
    /// Only assets whose warranty ends within this many days, expired ones
    /// included.
    pub warranty_within_days: Option<u32>,
}

impl Paged for AssetQuery {
    fn requested_page(&self) -> Option<u32> {
        self.page
    }

    fn requested_per_page(&self) -> Option<u32> {
        self.per_page
    }
}

impl AssetQuery {
    pub fn search_term(&self) -> Option<&str> {
        search_term(self.search.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::{AssetId, AssetType, NewAsset, WarrantyState};

    fn router() -> NewAsset {
        NewAsset {
            name: "  core-rtr-01 ".to_string(),
            asset_type: AssetType::Router,
            vendor: Some("Juniper".to_string()),
            model: Some("  ".to_string()),
            serial: None,
            location: Some("DC1 / Row C".to_string()),
            warranty_expiry: NaiveDate::from_ymd_opt(2026, 11, 1),
            cpu_cores: None,
            ram_gb: None,
            storage_gb: None,
            graphics_card_model: None,
            graphics_card_spec: None,
            interfaces: Some(48),
            throughput_gbps: Some(100),
            vlan_support: Some(true),
            capacity_tb: None,
        }
    }

    #[test]
    fn blank_name_and_zero_sizes_are_refused() {
        assert_eq!(router().validate(), Ok(()));

        let mut unnamed = router();
        unnamed.name = " ".to_string();
        assert!(unnamed.validate().is_err());

        let mut zero = router();
        zero.interfaces = Some(0);
        assert!(zero.validate().is_err());
    }

    #[test]
    fn stored_row_is_trimmed() {
        let now = Utc::now();
        let asset = router().into_asset(AssetId("AST-1".into()), now, now);
        assert_eq!(asset.name, "core-rtr-01");
        assert_eq!(asset.model, None);
        assert_eq!(asset.vendor.as_deref(), Some("Juniper"));
    }

    #[test]
    fn warranty_state_tracks_notice_window() {
        let now = Utc::now();
        let asset = router().into_asset(AssetId("AST-1".into()), now, now);
        let day = |m, d| NaiveDate::from_ymd_opt(2026, m, d).expect("date");

        assert_eq!(asset.warranty_state(day(9, 1)), WarrantyState::Covered);
        assert_eq!(asset.warranty_state(day(10, 19)), WarrantyState::Expiring);
        assert_eq!(asset.warranty_state(day(11, 2)), WarrantyState::Expired);

        let mut unknown = asset;
        unknown.warranty_expiry = None;
        assert_eq!(unknown.warranty_state(day(1, 1)), WarrantyState::Unknown);
    }

    #[test]
    fn asset_type_wire_name() {
        assert_eq!("console_server".parse::<AssetType>(), Ok(AssetType::ConsoleServer));
        let json = serde_json::to_string(&AssetType::Ups).expect("serialize");
        assert_eq!(json, "\"UPS\"");
    }
}
