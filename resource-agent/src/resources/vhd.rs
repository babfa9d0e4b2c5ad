//! Virtual hard disks.

use serde::{Deserialize, Serialize};

use super::{Resource, ResourceKind, validate_name};
use crate::error::{Error, Result};
use crate::store::FieldValue;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskFormat {
    Vhd,
    #[default]
    Vhdx,
}

impl DiskFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            DiskFormat::Vhd => "vhd",
            DiskFormat::Vhdx => "vhdx",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualHardDisk {
    pub name: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub format: DiskFormat,
    /// Dynamically expanding (sparse) rather than fixed size.
    #[serde(default = "default_dynamic")]
    pub dynamic: bool,
    /// Host path of the backing file, filled in by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn default_dynamic() -> bool {
    true
}

impl VirtualHardDisk {
    pub fn new(name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            format: DiskFormat::default(),
            dynamic: true,
            path: None,
        }
    }
}

impl Resource for VirtualHardDisk {
    const KIND: ResourceKind = ResourceKind::VirtualHardDisk;

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<()> {
        validate_name(Self::KIND, &self.name)?;
        if self.size_bytes == 0 {
            return Err(Error::InvalidInput(format!(
                "disk '{}' must have a non-zero size",
                self.name
            )));
        }
        Ok(())
    }

    fn field(&self, field: &str) -> FieldValue<'_> {
        match field {
            "path" => FieldValue::Str(self.path.as_deref()),
            "size_bytes" | "format" | "dynamic" => FieldValue::NotString,
            _ => FieldValue::Unknown,
        }
    }
}
