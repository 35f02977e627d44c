//! Inbound payloads for requests, customizations and provisioning, with the
//! field checks applied before anything is persisted.

use std::collections::BTreeSet;
use std::net::IpAddr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::request::{
    Environment, FirewallPort, HardwareSpec, NetworkAccessType, Request, RequestId, RequestType,
};
use crate::domain::vm::VmId;
use crate::errors::DomainError;

fn default_request_type() -> RequestType {
    RequestType::NewVm
}

fn default_quantity() -> u32 {
    1
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDisk {
    pub size_gb: u32,
    #[serde(default)]
    pub purpose: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    #[serde(default = "default_request_type")]
    pub request_type: RequestType,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    pub system_name: String,
    #[serde(default)]
    pub project_name: Option<String>,
    pub purpose: String,
    pub environment: Environment,
    #[serde(default)]
    pub expected_end_date: Option<NaiveDate>,
    pub hardware: HardwareSpec,
    #[serde(default)]
    pub responsible_person_name: Option<String>,
    #[serde(default)]
    pub responsible_person_email: Option<String>,
    #[serde(default)]
    pub va_report_submitted: bool,
    #[serde(default)]
    pub additional_disks: Vec<NewDisk>,
    #[serde(default)]
    pub firewall_ports: Vec<FirewallPort>,
    #[serde(default)]
    pub network_access: Vec<NetworkAccessType>,
}

impl NewRequest {
    /// Template for a new request cloned from an earlier one.
    pub fn from_existing(request: &Request) -> Self {
        Self {
            request_type: RequestType::CloneVm,
            quantity: request.quantity,
            system_name: request.system_name.clone(),
            project_name: request.project_name.clone(),
            purpose: request.purpose.clone(),
            environment: request.environment,
            expected_end_date: request.expected_end_date,
            hardware: request.hardware.clone(),
            responsible_person_name: request.responsible_person_name.clone(),
            responsible_person_email: request.responsible_person_email.clone(),
            va_report_submitted: false,
            additional_disks: request
                .additional_disks
                .iter()
                .map(|disk| NewDisk { size_gb: disk.size_gb, purpose: disk.purpose.clone() })
                .collect(),
            firewall_ports: request.firewall_ports.clone(),
            network_access: request.network_access.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        require_text("system_name", &self.system_name)?;
        require_text("purpose", &self.purpose)?;
        if self.quantity == 0 {
            return Err(invalid("quantity must be at least 1"));
        }
        validate_hardware(&self.hardware)?;

        if let Some(email) = self.responsible_person_email.as_deref() {
            if !email.trim().is_empty() && !email.contains('@') {
                return Err(invalid("responsible_person_email must be an email address"));
            }
        }

        for (index, disk) in self.additional_disks.iter().enumerate() {
            if disk.size_gb == 0 {
                return Err(DomainError::Validation(format!(
                    "additional_disks[{index}].size_gb must be at least 1"
                )));
            }
        }

        for (index, rule) in self.firewall_ports.iter().enumerate() {
            if rule.port == 0 {
                return Err(DomainError::Validation(format!(
                    "firewall_ports[{index}].port must be in range 1..=65535"
                )));
            }
        }

        Ok(())
    }

    /// Trimmed copy with duplicate network-access entries removed.
    pub fn normalized(mut self) -> Self {
        self.system_name = self.system_name.trim().to_string();
        self.purpose = self.purpose.trim().to_string();
        self.project_name = trimmed(self.project_name);
        self.responsible_person_name = trimmed(self.responsible_person_name);
        self.responsible_person_email = trimmed(self.responsible_person_email);
        let unique: BTreeSet<_> = self.network_access.into_iter().collect();
        self.network_access = unique.into_iter().collect();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomization {
    pub target_vm_id: VmId,
    #[serde(default)]
    pub parent_request_id: Option<RequestId>,
    #[serde(default)]
    pub vcpu: Option<u32>,
    #[serde(default)]
    pub ram_gb: Option<u32>,
    #[serde(default)]
    pub storage_gb: Option<u32>,
}

impl NewCustomization {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.vcpu.is_none() && self.ram_gb.is_none() && self.storage_gb.is_none() {
            return Err(invalid("customization must change at least one of vcpu, ram_gb, storage_gb"));
        }
        for (field, value) in
            [("vcpu", self.vcpu), ("ram_gb", self.ram_gb), ("storage_gb", self.storage_gb)]
        {
            if value == Some(0) {
                return Err(DomainError::Validation(format!("{field} must be at least 1")));
            }
        }
        Ok(())
    }
}

/// Where one provisioned machine landed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmPlacement {
    pub hostname: String,
    pub ip_address: String,
    #[serde(default)]
    pub public_ip_address: Option<String>,
}

impl VmPlacement {
    pub fn validate(&self) -> Result<(), DomainError> {
        require_text("hostname", &self.hostname)?;
        if self.ip_address.trim().parse::<IpAddr>().is_err() {
            return Err(DomainError::Validation(format!(
                "ip_address `{}` is not a valid IP address",
                self.ip_address
            )));
        }
        if let Some(public) = self.public_ip_address.as_deref() {
            if public.trim().parse::<IpAddr>().is_err() {
                return Err(DomainError::Validation(format!(
                    "public_ip_address `{public}` is not a valid IP address"
                )));
            }
        }
        Ok(())
    }
}

fn validate_hardware(hardware: &HardwareSpec) -> Result<(), DomainError> {
    for (field, value) in [
        ("hardware.vcpu", hardware.vcpu),
        ("hardware.ram_gb", hardware.ram_gb),
        ("hardware.storage_gb", hardware.storage_gb),
    ] {
        if value == 0 {
            return Err(DomainError::Validation(format!("{field} must be at least 1")));
        }
    }
    Ok(())
}

pub(crate) fn require_text(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

pub(crate) fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|text| text.trim().to_string()).filter(|text| !text.is_empty())
}

fn invalid(message: &str) -> DomainError {
    DomainError::Validation(message.to_string())
}
