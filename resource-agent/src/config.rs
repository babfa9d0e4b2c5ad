//! Agent configuration.
//!
//! Loaded once at startup from an optional YAML file and overridden by
//! command-line flags. Each kind's settings are resolved into a
//! [`KindConfig`] that is handed to that kind's store and controller.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::provider::HCS;
use crate::resources::ResourceKind;

// -----------------------------------------------------------------------------
// AgentConfig (root)
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_host_dir")]
    pub host_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Per-kind overrides, keyed by kind identifier (`virtualmachine`, ...).
    #[serde(default)]
    pub kinds: BTreeMap<String, KindSettings>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            host_dir: default_host_dir(),
            log_dir: default_log_dir(),
            kinds: BTreeMap::new(),
        }
    }
}

impl AgentConfig {
    /// Read a YAML config file. An empty file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::io("read", path, e))?;
        Self::parse(path, &contents)
    }

    fn parse(path: &Path, contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Self = serde_saphyr::from_str(contents).map_err(|source| Error::Decode {
            path: path.to_path_buf(),
            source,
        })?;

        for key in config.kinds.keys() {
            key.parse::<ResourceKind>()?;
        }
        Ok(config)
    }

    /// Place data, host and log directories under one root.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            data_dir: root.join("data"),
            host_dir: root.join("host"),
            log_dir: root.join("logs"),
            kinds: BTreeMap::new(),
        }
    }

    /// Resolved settings for `kind`.
    pub fn kind(&self, kind: ResourceKind) -> KindConfig {
        let settings = self.kinds.get(kind.as_str()).cloned().unwrap_or_default();

        KindConfig {
            data_dir: self.data_dir.join(kind.as_str()),
            log_path: self.log_dir.join(format!("{}.log", kind.as_str())),
            backend: settings.backend,
            drift_detection: settings.drift_detection,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/resource-agent")
}

fn default_host_dir() -> PathBuf {
    PathBuf::from("/var/lib/resource-agent/host")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/resource-agent")
}

// -----------------------------------------------------------------------------
// KindSettings
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindSettings {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_drift_detection")]
    pub drift_detection: bool,
}

impl Default for KindSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            drift_detection: default_drift_detection(),
        }
    }
}

fn default_backend() -> String {
    HCS.to_string()
}

fn default_drift_detection() -> bool {
    true
}

// -----------------------------------------------------------------------------
// KindConfig
// -----------------------------------------------------------------------------

/// Settings of one kind, resolved once per run and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct KindConfig {
    /// Base directory of the kind's record store.
    pub data_dir: PathBuf,
    /// The kind's audit journal.
    pub log_path: PathBuf,
    /// Provider backend name.
    pub backend: String,
    pub drift_detection: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        let vm = config.kind(ResourceKind::VirtualMachine);

        assert_eq!(
            vm.data_dir,
            PathBuf::from("/var/lib/resource-agent/virtualmachine")
        );
        assert_eq!(
            vm.log_path,
            PathBuf::from("/var/log/resource-agent/virtualmachine.log")
        );
        assert_eq!(vm.backend, "hcs");
        assert!(vm.drift_detection);
    }

    #[test]
    fn test_parse_overrides() {
        let yaml = r#"
data_dir: /tmp/agent
kinds:
  keyvault:
    backend: vmms
  virtualharddisk:
    drift_detection: false
"#;
        let config = AgentConfig::parse(Path::new("agent.yaml"), yaml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/agent"));
        assert_eq!(config.log_dir, default_log_dir());

        let vault = config.kind(ResourceKind::KeyVault);
        assert_eq!(vault.backend, "vmms");
        assert!(vault.drift_detection);
        assert_eq!(vault.data_dir, PathBuf::from("/tmp/agent/keyvault"));

        let disk = config.kind(ResourceKind::VirtualHardDisk);
        assert_eq!(disk.backend, "hcs");
        assert!(!disk.drift_detection);
    }

    #[test]
    fn test_unknown_kind_key() {
        let yaml = "kinds:\n  toaster:\n    backend: hcs\n";
        let err = AgentConfig::parse(Path::new("agent.yaml"), yaml).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_empty_file() {
        let config = AgentConfig::parse(Path::new("agent.yaml"), "\n").unwrap();
        assert_eq!(config, AgentConfig::default());
    }

    #[tokio::test]
    async fn test_load_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("agent.yaml");
        std::fs::write(&path, "host_dir: /srv/host\n").unwrap();

        let config = AgentConfig::load(&path).await.unwrap();
        assert_eq!(config.host_dir, PathBuf::from("/srv/host"));

        assert!(AgentConfig::load(&dir.path().join("missing.yaml")).await.is_err());
    }
}
