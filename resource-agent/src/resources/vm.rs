//! Virtual machines.
//!
//! A VM references disks and interfaces that exist as resources of their
//! own. The definition stores them by name; the controller fills in the
//! resolved host path and MAC address before the provider sees it.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{Resource, ResourceKind, validate_name};
use crate::error::{Error, Result};
use crate::store::{Artifact, FieldValue};

const MIN_MEMORY_MB: u64 = 128;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachine {
    pub name: String,
    #[serde(default)]
    pub hardware: HardwareProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareProfile {
    #[serde(default = "default_vcpus")]
    pub vcpus: u32,
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u64,
}

fn default_vcpus() -> u32 {
    2
}

fn default_memory_mb() -> u64 {
    2048
}

impl Default for HardwareProfile {
    fn default() -> Self {
        Self {
            vcpus: default_vcpus(),
            memory_mb: default_memory_mb(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsType {
    Linux,
    Windows,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsProfile {
    pub os_type: OsType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computer_name: Option<String>,
    pub admin_username: String,
    #[serde(default)]
    pub ssh_public_keys: Vec<String>,
    /// Raw user-data passed through instead of the generated cloud-config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageProfile {
    pub os_disk: DiskReference,
    #[serde(default)]
    pub data_disks: Vec<DiskReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskReference {
    /// Name of a VirtualHardDisk resource.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl DiskReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkProfile {
    #[serde(default)]
    pub interfaces: Vec<InterfaceReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceReference {
    /// Name of a NetworkInterface resource.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
}

impl InterfaceReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mac_address: None,
        }
    }
}

impl VirtualMachine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hardware: HardwareProfile::default(),
            os: None,
            storage: None,
            network: None,
        }
    }

    /// OS disk first, then data disks in order.
    pub fn disks(&self) -> impl Iterator<Item = &DiskReference> {
        self.storage
            .iter()
            .flat_map(|s| std::iter::once(&s.os_disk).chain(s.data_disks.iter()))
    }

    pub fn disks_mut(&mut self) -> impl Iterator<Item = &mut DiskReference> {
        self.storage
            .iter_mut()
            .flat_map(|s| std::iter::once(&mut s.os_disk).chain(s.data_disks.iter_mut()))
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &InterfaceReference> {
        self.network.iter().flat_map(|n| n.interfaces.iter())
    }

    pub fn interfaces_mut(&mut self) -> impl Iterator<Item = &mut InterfaceReference> {
        self.network.iter_mut().flat_map(|n| n.interfaces.iter_mut())
    }

    fn hostname(&self) -> &str {
        self.os
            .as_ref()
            .and_then(|os| os.computer_name.as_deref())
            .unwrap_or(&self.name)
    }

    fn user_data(&self, os: &OsProfile) -> String {
        if let Some(custom) = &os.custom_data {
            return custom.clone();
        }

        // JSON strings are valid YAML scalars, which keeps keys with odd
        // characters intact.
        let quote = |s: &str| serde_json::Value::from(s).to_string();

        let mut out = String::from("#cloud-config\n");
        out.push_str(&format!("hostname: {}\n", quote(self.hostname())));
        out.push_str("users:\n");
        out.push_str(&format!("  - name: {}\n", quote(&os.admin_username)));
        out.push_str("    sudo: \"ALL=(ALL) NOPASSWD:ALL\"\n");
        if !os.ssh_public_keys.is_empty() {
            out.push_str("    ssh_authorized_keys:\n");
            for key in &os.ssh_public_keys {
                out.push_str(&format!("      - {}\n", quote(key)));
            }
        }
        out
    }
}

impl Resource for VirtualMachine {
    const KIND: ResourceKind = ResourceKind::VirtualMachine;

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<()> {
        validate_name(Self::KIND, &self.name)?;

        let os = self.os.as_ref().ok_or_else(|| {
            Error::InvalidInput(format!("virtual machine '{}' requires an os section", self.name))
        })?;
        let storage = self.storage.as_ref().ok_or_else(|| {
            Error::InvalidInput(format!(
                "virtual machine '{}' requires a storage section",
                self.name
            ))
        })?;

        if self.hardware.vcpus == 0 {
            return Err(Error::InvalidInput(format!(
                "virtual machine '{}' needs at least one vCPU",
                self.name
            )));
        }
        if self.hardware.memory_mb < MIN_MEMORY_MB {
            return Err(Error::InvalidInput(format!(
                "virtual machine '{}' needs at least {} MB of memory",
                self.name, MIN_MEMORY_MB
            )));
        }
        if os.admin_username.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "virtual machine '{}' requires an admin username",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for disk in std::iter::once(&storage.os_disk).chain(storage.data_disks.iter()) {
            if disk.name.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "virtual machine '{}' has a disk reference without a name",
                    self.name
                )));
            }
            if !seen.insert(disk.name.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "disk '{}' is attached to '{}' more than once",
                    disk.name, self.name
                )));
            }
        }

        let mut seen = HashSet::new();
        for nic in self.interfaces() {
            if nic.name.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "virtual machine '{}' has an interface reference without a name",
                    self.name
                )));
            }
            if !seen.insert(nic.name.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "interface '{}' is attached to '{}' more than once",
                    nic.name, self.name
                )));
            }
        }

        Ok(())
    }

    fn field(&self, field: &str) -> FieldValue<'_> {
        match field {
            "computer_name" => {
                FieldValue::Str(self.os.as_ref().and_then(|os| os.computer_name.as_deref()))
            }
            "hardware" | "os" | "storage" | "network" => FieldValue::NotString,
            _ => FieldValue::Unknown,
        }
    }

    /// Cloud-init NoCloud seed files.
    fn artifacts(&self, id: &str) -> Vec<Artifact> {
        let Some(os) = &self.os else {
            return Vec::new();
        };

        let meta_data = format!("instance-id: {}\nlocal-hostname: {}\n", id, self.hostname());
        let network_config = r#"version: 2
ethernets:
  all:
    match:
      name: "*"
    dhcp4: true
    dhcp6: true
"#;

        vec![
            Artifact::new("meta-data", meta_data),
            Artifact::new("user-data", self.user_data(os)),
            Artifact::new("network-config", network_config),
        ]
    }
}
