//! Agent wiring: one store, provider and controller per resource kind.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::audit::AuditLog;
use crate::config::AgentConfig;
use crate::controller::{LifecycleController, References};
use crate::error::{Error, Result};
use crate::provider::{HostProvider, Provider, ProviderFactory};
use crate::resources::{
    KeyVault, LoadBalancer, NetworkInterface, Resource, VirtualHardDisk, VirtualMachine,
    record_field,
};
use crate::store::RecordStore;

pub struct Agent {
    vms: Arc<LifecycleController<VirtualMachine>>,
    disks: Arc<LifecycleController<VirtualHardDisk>>,
    nics: Arc<LifecycleController<NetworkInterface>>,
    load_balancers: Arc<LifecycleController<LoadBalancer>>,
    key_vaults: Arc<LifecycleController<KeyVault>>,
}

impl Agent {
    /// Resolve every kind's configuration, bind its provider and load its
    /// store. Fails on an unknown provider backend.
    pub async fn open(config: AgentConfig) -> Result<Self> {
        let factory = ProviderFactory::new(&config.host_dir);

        let disks = Arc::new(open_controller::<VirtualHardDisk>(&config, &factory).await?);
        let nics = Arc::new(open_controller::<NetworkInterface>(&config, &factory).await?);

        let vms = Arc::new(
            open_controller::<VirtualMachine>(&config, &factory)
                .await?
                .with_references(Arc::new(VmReferences {
                    disks: disks.clone(),
                    nics: nics.clone(),
                })),
        );
        let load_balancers = Arc::new(
            open_controller::<LoadBalancer>(&config, &factory)
                .await?
                .with_references(Arc::new(LbReferences { nics: nics.clone() })),
        );
        let key_vaults = Arc::new(open_controller::<KeyVault>(&config, &factory).await?);

        info!(
            data_dir = %config.data_dir.display(),
            host_dir = %config.host_dir.display(),
            "Agent ready"
        );

        Ok(Self {
            vms,
            disks,
            nics,
            load_balancers,
            key_vaults,
        })
    }

    pub fn vms(&self) -> &Arc<LifecycleController<VirtualMachine>> {
        &self.vms
    }

    pub fn disks(&self) -> &Arc<LifecycleController<VirtualHardDisk>> {
        &self.disks
    }

    pub fn nics(&self) -> &Arc<LifecycleController<NetworkInterface>> {
        &self.nics
    }

    pub fn load_balancers(&self) -> &Arc<LifecycleController<LoadBalancer>> {
        &self.load_balancers
    }

    pub fn key_vaults(&self) -> &Arc<LifecycleController<KeyVault>> {
        &self.key_vaults
    }
}

async fn open_controller<R>(
    config: &AgentConfig,
    factory: &ProviderFactory,
) -> Result<LifecycleController<R>>
where
    R: Resource,
    HostProvider: Provider<R>,
{
    let kind = config.kind(R::KIND);
    let provider = factory.provider::<R>(&kind.backend).await?;
    let store = RecordStore::open(&kind.data_dir, record_field::<R>).await?;
    let audit = AuditLog::new(R::KIND, &kind.log_path);

    Ok(LifecycleController::new(store, provider, audit).with_drift_detection(kind.drift_detection))
}

/// Fills a VM's disk paths and interface MACs from their own records.
struct VmReferences {
    disks: Arc<LifecycleController<VirtualHardDisk>>,
    nics: Arc<LifecycleController<NetworkInterface>>,
}

#[async_trait]
impl References<VirtualMachine> for VmReferences {
    async fn resolve(&self, mut definition: VirtualMachine) -> Result<VirtualMachine> {
        for disk in definition.disks_mut() {
            let record = self.disks.get_by_name(&disk.name).await?;
            let path = record.payload.path.ok_or_else(|| {
                Error::InvalidInput(format!("disk '{}' has no backing path", disk.name))
            })?;
            disk.path = Some(path);
        }

        for nic in definition.interfaces_mut() {
            let record = self.nics.get_by_name(&nic.name).await?;
            nic.mac_address = record.payload.mac_address;
        }

        Ok(definition)
    }
}

/// Checks that every backend interface exists.
struct LbReferences {
    nics: Arc<LifecycleController<NetworkInterface>>,
}

#[async_trait]
impl References<LoadBalancer> for LbReferences {
    async fn resolve(&self, definition: LoadBalancer) -> Result<LoadBalancer> {
        for backend in &definition.backends {
            self.nics.get_by_name(backend).await?;
        }
        Ok(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KindSettings;
    use crate::resources::{DiskReference, OsProfile, OsType, StorageProfile};
    use tempfile::TempDir;

    fn vm(name: &str, disk: &str) -> VirtualMachine {
        let mut vm = VirtualMachine::new(name);
        vm.os = Some(OsProfile {
            os_type: OsType::Linux,
            computer_name: None,
            admin_username: "admin".to_string(),
            ssh_public_keys: vec![],
            custom_data: None,
        });
        vm.storage = Some(StorageProfile {
            os_disk: DiskReference::new(disk),
            data_disks: vec![],
        });
        vm
    }

    #[tokio::test]
    async fn test_vm_resolves_disk_path() {
        let dir = TempDir::new().unwrap();
        let agent = Agent::open(AgentConfig::rooted_at(dir.path()))
            .await
            .unwrap();

        let err = agent.vms().create(vm("vm1", "os")).await.unwrap_err();
        assert!(err.is_not_found());

        let disk = agent
            .disks()
            .create(VirtualHardDisk::new("os", 1024 * 1024))
            .await
            .unwrap();

        let record = agent.vms().create(vm("vm1", "os")).await.unwrap();
        let storage = record.payload.storage.unwrap();
        assert_eq!(storage.os_disk.path, disk.payload.path);
    }

    #[tokio::test]
    async fn test_unknown_backend_fails_open() {
        let dir = TempDir::new().unwrap();
        let mut config = AgentConfig::rooted_at(dir.path());
        config.kinds.insert(
            "loadbalancer".to_string(),
            KindSettings {
                backend: "nsx".to_string(),
                drift_detection: true,
            },
        );

        let err = Agent::open(config).await.err().unwrap();
        assert!(matches!(err, Error::UnknownBackend { .. }));
    }
}
