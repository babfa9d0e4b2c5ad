//! Host-backed provider.
//!
//! Materializes every kind as an artifact under a host directory:
//!
//! ```text
//! <host_dir>/disks/<name>.<vhd|vhdx>      sparse backing file
//! <host_dir>/nics/<name>.json             port manifest
//! <host_dir>/vms/<name>/vm.json           machine manifest
//! <host_dir>/loadbalancers/<name>.json    load balancer manifest
//! <host_dir>/keyvaults/<name>/            vault directory
//! ```
//!
//! Materialize adopts an existing artifact when it matches the request, so
//! re-creating after a lost record does not fail.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tracing::{debug, info};

use super::{HCS, Provider};
use crate::error::{Error, Result};
use crate::resources::nic::generate_mac;
use crate::resources::{KeyVault, LoadBalancer, NetworkInterface, OsType, VirtualHardDisk, VirtualMachine};

const MANIFEST_FILE: &str = "vm.json";

#[derive(Debug, Clone)]
pub struct HostProvider {
    host_dir: PathBuf,
}

impl HostProvider {
    pub fn new(host_dir: impl Into<PathBuf>) -> Self {
        Self {
            host_dir: host_dir.into(),
        }
    }

    fn disk_path(&self, disk: &VirtualHardDisk) -> PathBuf {
        self.host_dir
            .join("disks")
            .join(format!("{}.{}", disk.name, disk.format.extension()))
    }

    fn nic_path(&self, name: &str) -> PathBuf {
        self.host_dir.join("nics").join(format!("{}.json", name))
    }

    fn vm_dir(&self, name: &str) -> PathBuf {
        self.host_dir.join("vms").join(name)
    }

    fn lb_path(&self, name: &str) -> PathBuf {
        self.host_dir
            .join("loadbalancers")
            .join(format!("{}.json", name))
    }

    fn vault_dir(&self, name: &str) -> PathBuf {
        self.host_dir.join("keyvaults").join(name)
    }
}

/// Machine definition handed to the hypervisor.
#[derive(Debug, Serialize, serde::Deserialize)]
struct MachineManifest {
    name: String,
    vcpus: u32,
    memory_mb: u64,
    os_type: OsType,
    disks: Vec<String>,
    nics: Vec<String>,
}

// =============================================================================
// Virtual hard disks
// =============================================================================

#[async_trait]
impl Provider<VirtualHardDisk> for HostProvider {
    fn backend(&self) -> &'static str {
        HCS
    }

    async fn materialize(&self, definition: &VirtualHardDisk) -> Result<VirtualHardDisk> {
        let path = self.disk_path(definition);
        ensure_parent(&path).await?;

        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .await
            .map_err(|e| Error::io("open", &path, e))?;
        let current = file
            .metadata()
            .await
            .map_err(|e| Error::io("stat", &path, e))?
            .len();

        if current != 0 && current != definition.size_bytes {
            return Err(Error::InvalidInput(format!(
                "disk file {} is already present with size {} (requested {})",
                path.display(),
                current,
                definition.size_bytes
            )));
        }
        if current == 0 {
            file.set_len(definition.size_bytes)
                .await
                .map_err(|e| Error::io("resize", &path, e))?;
        } else {
            debug!(path = %path.display(), "Adopting existing disk file");
        }

        info!(
            name = %definition.name,
            path = %path.display(),
            size_bytes = definition.size_bytes,
            dynamic = definition.dynamic,
            "Disk materialized"
        );

        let mut realized = definition.clone();
        realized.path = Some(path.display().to_string());
        Ok(realized)
    }

    async fn teardown(&self, definition: &VirtualHardDisk) -> Result<()> {
        let path = self.disk_path(definition);
        remove_file_if_present(&path).await?;
        info!(name = %definition.name, path = %path.display(), "Disk removed");
        Ok(())
    }

    async fn exists(&self, definition: &VirtualHardDisk) -> Result<bool> {
        path_exists(&self.disk_path(definition)).await
    }
}

// =============================================================================
// Network interfaces
// =============================================================================

#[async_trait]
impl Provider<NetworkInterface> for HostProvider {
    fn backend(&self) -> &'static str {
        HCS
    }

    async fn materialize(&self, definition: &NetworkInterface) -> Result<NetworkInterface> {
        let path = self.nic_path(&definition.name);

        let existing: Option<NetworkInterface> = read_manifest(&path).await?;
        let mac_address = match (&definition.mac_address, existing) {
            (Some(requested), Some(port)) if port.mac_address.as_ref() != Some(requested) => {
                return Err(Error::InvalidInput(format!(
                    "port {} is already present with a different MAC address",
                    definition.name
                )));
            }
            (Some(requested), _) => requested.clone(),
            (None, Some(NetworkInterface { mac_address: Some(mac), .. })) => mac,
            (None, _) => generate_mac(),
        };

        let mut realized = definition.clone();
        realized.mac_address = Some(mac_address);
        write_manifest(&path, &realized).await?;

        info!(
            name = %realized.name,
            network = %realized.network,
            mac = realized.mac_address.as_deref().unwrap_or_default(),
            "Interface materialized"
        );
        Ok(realized)
    }

    async fn teardown(&self, definition: &NetworkInterface) -> Result<()> {
        remove_file_if_present(&self.nic_path(&definition.name)).await?;
        info!(name = %definition.name, "Interface removed");
        Ok(())
    }

    async fn exists(&self, definition: &NetworkInterface) -> Result<bool> {
        path_exists(&self.nic_path(&definition.name)).await
    }
}

// =============================================================================
// Virtual machines
// =============================================================================

#[async_trait]
impl Provider<VirtualMachine> for HostProvider {
    fn backend(&self) -> &'static str {
        HCS
    }

    async fn materialize(&self, definition: &VirtualMachine) -> Result<VirtualMachine> {
        let os = definition.os.as_ref().ok_or_else(|| {
            Error::InvalidInput(format!("virtual machine '{}' has no os section", definition.name))
        })?;

        let disks = definition
            .disks()
            .map(|d| {
                d.path.clone().ok_or_else(|| {
                    Error::InvalidInput(format!("disk '{}' has not been resolved", d.name))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let nics = definition
            .interfaces()
            .map(|n| {
                n.mac_address.clone().ok_or_else(|| {
                    Error::InvalidInput(format!("interface '{}' has not been resolved", n.name))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let manifest = MachineManifest {
            name: definition.name.clone(),
            vcpus: definition.hardware.vcpus,
            memory_mb: definition.hardware.memory_mb,
            os_type: os.os_type,
            disks,
            nics,
        };
        let path = self.vm_dir(&definition.name).join(MANIFEST_FILE);
        write_manifest(&path, &manifest).await?;

        info!(
            name = %definition.name,
            vcpus = manifest.vcpus,
            memory_mb = manifest.memory_mb,
            disks = manifest.disks.len(),
            nics = manifest.nics.len(),
            "Virtual machine materialized"
        );
        Ok(definition.clone())
    }

    async fn teardown(&self, definition: &VirtualMachine) -> Result<()> {
        remove_dir_if_present(&self.vm_dir(&definition.name)).await?;
        info!(name = %definition.name, "Virtual machine removed");
        Ok(())
    }

    async fn exists(&self, definition: &VirtualMachine) -> Result<bool> {
        path_exists(&self.vm_dir(&definition.name).join(MANIFEST_FILE)).await
    }
}

// =============================================================================
// Load balancers
// =============================================================================

#[async_trait]
impl Provider<LoadBalancer> for HostProvider {
    fn backend(&self) -> &'static str {
        HCS
    }

    async fn materialize(&self, definition: &LoadBalancer) -> Result<LoadBalancer> {
        write_manifest(&self.lb_path(&definition.name), definition).await?;
        info!(
            name = %definition.name,
            backends = definition.backends.len(),
            rules = definition.rules.len(),
            "Load balancer materialized"
        );
        Ok(definition.clone())
    }

    async fn teardown(&self, definition: &LoadBalancer) -> Result<()> {
        remove_file_if_present(&self.lb_path(&definition.name)).await?;
        info!(name = %definition.name, "Load balancer removed");
        Ok(())
    }

    async fn exists(&self, definition: &LoadBalancer) -> Result<bool> {
        path_exists(&self.lb_path(&definition.name)).await
    }
}

// =============================================================================
// Key vaults
// =============================================================================

#[async_trait]
impl Provider<KeyVault> for HostProvider {
    fn backend(&self) -> &'static str {
        HCS
    }

    async fn materialize(&self, definition: &KeyVault) -> Result<KeyVault> {
        let dir = self.vault_dir(&definition.name);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::io("create", &dir, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))
                .await
                .map_err(|e| Error::io("restrict", &dir, e))?;
        }

        info!(name = %definition.name, path = %dir.display(), "Key vault materialized");

        let mut realized = definition.clone();
        realized.vault_path = Some(dir.display().to_string());
        Ok(realized)
    }

    async fn teardown(&self, definition: &KeyVault) -> Result<()> {
        remove_dir_if_present(&self.vault_dir(&definition.name)).await?;
        info!(name = %definition.name, "Key vault removed");
        Ok(())
    }

    async fn exists(&self, definition: &KeyVault) -> Result<bool> {
        path_exists(&self.vault_dir(&definition.name)).await
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io("create", parent, e))?;
    }
    Ok(())
}

async fn path_exists(path: &Path) -> Result<bool> {
    fs::try_exists(path)
        .await
        .map_err(|e| Error::io("stat", path, e))
}

async fn write_manifest<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path).await?;
    let json = serde_json::to_vec_pretty(value)?;

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, json)
        .await
        .map_err(|e| Error::io("write", &temp_path, e))?;
    fs::rename(&temp_path, path)
        .await
        .map_err(|e| Error::io("rename", path, e))
}

async fn read_manifest<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io("read", path, e)),
    }
}

async fn remove_file_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io("remove", path, e)),
    }
}

async fn remove_dir_if_present(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io("remove", path, e)),
    }
}
