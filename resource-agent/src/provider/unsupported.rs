use async_trait::async_trait;

use super::Provider;
use crate::error::{Error, Result};
use crate::resources::Resource;

/// Backend that is recognised but not implemented. Every call fails with
/// `NotSupported`.
#[derive(Debug, Clone)]
pub struct UnsupportedProvider {
    backend: &'static str,
}

impl UnsupportedProvider {
    pub fn new(backend: &'static str) -> Self {
        Self { backend }
    }

    fn unsupported(&self, operation: &str, kind: impl std::fmt::Display) -> Error {
        Error::NotSupported(format!(
            "{} backend does not implement {} for {}",
            self.backend, operation, kind
        ))
    }
}

#[async_trait]
impl<R: Resource> Provider<R> for UnsupportedProvider {
    fn backend(&self) -> &'static str {
        self.backend
    }

    async fn materialize(&self, _definition: &R) -> Result<R> {
        Err(self.unsupported("materialize", R::KIND))
    }

    async fn teardown(&self, _definition: &R) -> Result<()> {
        Err(self.unsupported("teardown", R::KIND))
    }

    async fn exists(&self, _definition: &R) -> Result<bool> {
        Err(self.unsupported("exists", R::KIND))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::VMMS;
    use crate::resources::VirtualHardDisk;

    #[tokio::test]
    async fn test_every_call_is_not_supported() {
        let provider = UnsupportedProvider::new(VMMS);
        let disk = VirtualHardDisk::new("os", 1024);

        let err = Provider::<VirtualHardDisk>::materialize(&provider, &disk)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotSupported(ref m) if m.contains("vmms")));
        assert!(matches!(
            Provider::<VirtualHardDisk>::teardown(&provider, &disk).await,
            Err(Error::NotSupported(_))
        ));
        assert!(matches!(
            Provider::<VirtualHardDisk>::exists(&provider, &disk).await,
            Err(Error::NotSupported(_))
        ));
    }
}
