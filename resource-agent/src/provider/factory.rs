use std::any::Any;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use super::{HCS, HostProvider, Provider, UnsupportedProvider, VMMS};
use crate::error::{Error, Result};
use crate::resources::{Resource, ResourceKind};

type CacheKey = (ResourceKind, String);

/// Resolves a backend name to a provider and caches it per (kind, backend),
/// so every controller of a kind shares one instance.
pub struct ProviderFactory {
    host: Arc<HostProvider>,
    cache: Mutex<HashMap<CacheKey, Box<dyn Any + Send + Sync>>>,
}

impl ProviderFactory {
    pub fn new(host_dir: impl Into<PathBuf>) -> Self {
        Self {
            host: Arc::new(HostProvider::new(host_dir)),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Provider for kind `R` on `backend`.
    ///
    /// An unrecognised backend is `UnknownBackend`; callers resolve providers
    /// at startup and abort on it.
    pub async fn provider<R>(&self, backend: &str) -> Result<Arc<dyn Provider<R>>>
    where
        R: Resource,
        HostProvider: Provider<R>,
    {
        let key = (R::KIND, backend.to_string());
        let mut cache = self.cache.lock().await;

        if let Some(provider) = cache
            .get(&key)
            .and_then(|cached| cached.downcast_ref::<Arc<dyn Provider<R>>>())
        {
            return Ok(Arc::clone(provider));
        }

        let provider: Arc<dyn Provider<R>> = match backend {
            HCS => self.host.clone(),
            VMMS => Arc::new(UnsupportedProvider::new(VMMS)),
            other => {
                return Err(Error::UnknownBackend {
                    kind: R::KIND.to_string(),
                    backend: other.to_string(),
                });
            }
        };

        info!(kind = %R::KIND, backend = %backend, "Provider bound");
        cache.insert(key, Box::new(Arc::clone(&provider)));
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{KeyVault, NetworkInterface, VirtualHardDisk};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_provider_is_cached_per_kind() {
        let dir = TempDir::new().unwrap();
        let factory = ProviderFactory::new(dir.path());

        let a = factory.provider::<VirtualHardDisk>(HCS).await.unwrap();
        let b = factory.provider::<VirtualHardDisk>(HCS).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.backend(), HCS);

        let nic = factory.provider::<NetworkInterface>(HCS).await.unwrap();
        assert_eq!(nic.backend(), HCS);
    }

    #[tokio::test]
    async fn test_unknown_backend() {
        let dir = TempDir::new().unwrap();
        let factory = ProviderFactory::new(dir.path());

        let err = factory.provider::<KeyVault>("esx").await.err().unwrap();
        assert!(matches!(
            err,
            Error::UnknownBackend { ref kind, ref backend } if kind == "keyvault" && backend == "esx"
        ));
    }

    #[tokio::test]
    async fn test_vmms_is_not_supported() {
        let dir = TempDir::new().unwrap();
        let factory = ProviderFactory::new(dir.path());

        let provider = factory.provider::<VirtualHardDisk>(VMMS).await.unwrap();
        assert_eq!(provider.backend(), VMMS);
        let err = provider
            .materialize(&VirtualHardDisk::new("os", 1024))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
    }
}
