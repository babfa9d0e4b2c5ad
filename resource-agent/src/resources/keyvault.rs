//! Key vaults.
//!
//! A vault is a named host directory with free-form tags. The provider
//! chooses the directory and reports it back through `vault_path`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Resource, ResourceKind, validate_name};
use crate::error::Result;
use crate::store::FieldValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyVault {
    pub name: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Host directory holding the vault, filled in by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_path: Option<String>,
}

impl KeyVault {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: BTreeMap::new(),
            vault_path: None,
        }
    }
}

impl Resource for KeyVault {
    const KIND: ResourceKind = ResourceKind::KeyVault;

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<()> {
        validate_name(Self::KIND, &self.name)
    }

    fn field(&self, field: &str) -> FieldValue<'_> {
        match field {
            "vault_path" => FieldValue::Str(self.vault_path.as_deref()),
            "tags" => FieldValue::NotString,
            _ => FieldValue::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::resources::parse_definition;

    #[test]
    fn test_validate_name() {
        assert!(KeyVault::new("team-secrets_1").validate().is_ok());

        for name in ["", "a/b", "..", "has space"] {
            let err = KeyVault::new(name).validate().unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{name}: {err}");
        }
    }

    #[test]
    fn test_fields() {
        let mut vault = KeyVault::new("secrets");
        assert!(matches!(vault.field("vault_path"), FieldValue::Str(None)));

        vault.vault_path = Some("/srv/vaults/secrets".to_string());
        assert!(matches!(
            vault.field("vault_path"),
            FieldValue::Str(Some("/srv/vaults/secrets"))
        ));
        assert!(matches!(vault.field("tags"), FieldValue::NotString));
        assert!(matches!(vault.field("size"), FieldValue::Unknown));
    }

    #[test]
    fn test_parse_without_tags() {
        let vault: KeyVault = parse_definition("name: secrets\n").unwrap();
        assert_eq!(vault, KeyVault::new("secrets"));
    }
}
