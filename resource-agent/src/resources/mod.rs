//! Resource kinds managed by the agent.
//!
//! Each kind is a plain serde payload implementing [`Resource`]. The store
//! keeps them opaque; the controller uses the trait for validation, name
//! lookup and filtering.

pub mod keyvault;
pub mod loadbalancer;
pub mod nic;
pub mod vhd;
pub mod vm;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::store::{Artifact, FieldValue, Record};

pub use keyvault::KeyVault;
pub use loadbalancer::{LoadBalancer, LoadBalancingRule, Protocol};
pub use nic::NetworkInterface;
pub use vhd::{DiskFormat, VirtualHardDisk};
pub use vm::{
    DiskReference, HardwareProfile, InterfaceReference, NetworkProfile, OsProfile, OsType,
    StorageProfile, VirtualMachine,
};

const MAX_NAME_LEN: usize = 64;

/// The closed set of resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    VirtualMachine,
    VirtualHardDisk,
    NetworkInterface,
    LoadBalancer,
    KeyVault,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::VirtualMachine,
        ResourceKind::VirtualHardDisk,
        ResourceKind::NetworkInterface,
        ResourceKind::LoadBalancer,
        ResourceKind::KeyVault,
    ];

    /// Stable identifier used for directory names and config keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::VirtualMachine => "virtualmachine",
            ResourceKind::VirtualHardDisk => "virtualharddisk",
            ResourceKind::NetworkInterface => "networkinterface",
            ResourceKind::LoadBalancer => "loadbalancer",
            ResourceKind::KeyVault => "keyvault",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown resource kind '{}'", s)))
    }
}

/// A resource definition managed through a lifecycle controller.
pub trait Resource: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: ResourceKind;

    fn name(&self) -> &str;

    /// Kind-specific required-field checks. Failures are `InvalidInput`.
    fn validate(&self) -> Result<()>;

    /// String-field accessor over the payload. Must classify field names
    /// independently of the values held.
    fn field(&self, field: &str) -> FieldValue<'_>;

    /// Files rendered into the record's config directory when it is built.
    fn artifacts(&self, _id: &str) -> Vec<Artifact> {
        Vec::new()
    }
}

/// Field extractor handed to the store: payload fields first, then the
/// record-level ones.
pub fn record_field<'a, R: Resource>(record: &'a Record<R>, field: &str) -> FieldValue<'a> {
    match record.payload.field(field) {
        FieldValue::Unknown => record.base_field(field),
        value => value,
    }
}

/// Names become host file names, so keep them to a portable subset.
pub fn validate_name(kind: ResourceKind, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput(format!("{} name is required", kind)));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidInput(format!(
            "{} name '{}' is longer than {} characters",
            kind, name, MAX_NAME_LEN
        )));
    }
    if name == "." || name == ".." {
        return Err(Error::InvalidInput(format!("{} name '{}' is reserved", kind, name)));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(Error::InvalidInput(format!(
            "{} name '{}' contains invalid character '{}'",
            kind, name, c
        )));
    }
    Ok(())
}

/// Decode a YAML definition. An empty document, or one that does not
/// describe an `R`, is `InvalidInput`.
pub fn parse_definition<R: Resource>(contents: &str) -> Result<R> {
    if contents.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{} definition is empty", R::KIND)));
    }

    serde_saphyr::from_str(contents)
        .map_err(|e| Error::InvalidInput(format!("malformed {} definition: {}", R::KIND, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.as_str().parse::<ResourceKind>().unwrap(), kind);
        }
        assert!("bucket".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_validate_name() {
        let kind = ResourceKind::VirtualMachine;
        assert!(validate_name(kind, "vm1").is_ok());
        assert!(validate_name(kind, "web-01.prod_a").is_ok());

        let long = "x".repeat(65);
        for bad in ["", ".", "..", "a/b", "has space", long.as_str()] {
            assert!(
                matches!(validate_name(kind, bad), Err(Error::InvalidInput(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_definition() {
        let disk: VirtualHardDisk =
            parse_definition("name: os\nsize_bytes: 1048576\nformat: vhd\n").unwrap();
        assert_eq!(disk.name, "os");
        assert_eq!(disk.format, DiskFormat::Vhd);
        assert!(disk.dynamic);

        assert!(matches!(
            parse_definition::<VirtualHardDisk>("  \n"),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            parse_definition::<VirtualHardDisk>("name: os\n"),
            Err(Error::InvalidInput(_))
        ));
    }
}
