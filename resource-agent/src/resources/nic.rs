//! Virtual network interfaces.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use super::{Resource, ResourceKind, validate_name};
use crate::error::{Error, Result};
use crate::store::FieldValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub name: String,
    /// Name of the virtual network the port is attached to.
    pub network: String,
    /// Assigned by the provider when not requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

impl NetworkInterface {
    pub fn new(name: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            network: network.into(),
            mac_address: None,
            ip_address: None,
        }
    }
}

impl Resource for NetworkInterface {
    const KIND: ResourceKind = ResourceKind::NetworkInterface;

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<()> {
        validate_name(Self::KIND, &self.name)?;
        if self.network.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "interface '{}' must name a network",
                self.name
            )));
        }
        if let Some(mac) = &self.mac_address {
            if !is_valid_mac(mac) {
                return Err(Error::InvalidInput(format!("invalid MAC address: {}", mac)));
            }
        }
        if let Some(ip) = &self.ip_address {
            ip.parse::<IpAddr>()
                .map_err(|_| Error::InvalidInput(format!("invalid IP address: {}", ip)))?;
        }
        Ok(())
    }

    fn field(&self, field: &str) -> FieldValue<'_> {
        match field {
            "network" => FieldValue::Str(Some(&self.network)),
            "mac_address" => FieldValue::Str(self.mac_address.as_deref()),
            "ip_address" => FieldValue::Str(self.ip_address.as_deref()),
            _ => FieldValue::Unknown,
        }
    }
}

/// Six colon-separated hex octets.
pub fn is_valid_mac(mac: &str) -> bool {
    let octets: Vec<&str> = mac.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Generate a MAC address with the local/unicast bit set.
pub fn generate_mac() -> String {
    let uuid = uuid::Uuid::new_v4();
    let bytes = uuid.as_bytes();
    let b0 = (bytes[0] & 0xfe) | 0x02;
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        b0, bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_validation() {
        assert!(is_valid_mac("52:54:00:ab:cd:ef"));
        assert!(!is_valid_mac("52:54:00:ab:cd"));
        assert!(!is_valid_mac("52-54-00-ab-cd-ef"));
        assert!(!is_valid_mac("zz:54:00:ab:cd:ef"));
    }

    #[test]
    fn test_generated_mac_is_local_unicast() {
        let mac = generate_mac();
        assert!(is_valid_mac(&mac));
        let first = u8::from_str_radix(&mac[..2], 16).unwrap();
        assert_eq!(first & 0x01, 0);
        assert_eq!(first & 0x02, 0x02);
    }

    #[test]
    fn test_validate() {
        let mut nic = NetworkInterface::new("eth0", "");
        assert!(matches!(nic.validate(), Err(Error::InvalidInput(_))));

        nic.network = "tenant".to_string();
        assert!(nic.validate().is_ok());

        nic.ip_address = Some("10.0.0.300".to_string());
        assert!(matches!(nic.validate(), Err(Error::InvalidInput(_))));

        nic.ip_address = Some("fd00::5".to_string());
        nic.mac_address = Some("nope".to_string());
        assert!(matches!(nic.validate(), Err(Error::InvalidInput(_))));
    }
}
