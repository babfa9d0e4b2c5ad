//! External provider gateway.
//!
//! A provider performs the physical side of a lifecycle operation on the
//! host. Controllers only see the [`Provider`] trait; which backend is bound
//! is decided by configuration through the [`ProviderFactory`].

mod factory;
mod host;
mod unsupported;

use async_trait::async_trait;

use crate::error::Result;
use crate::resources::Resource;

pub use factory::ProviderFactory;
pub use host::HostProvider;
pub use unsupported::UnsupportedProvider;

/// Backend that materializes resources on the local host.
pub const HCS: &str = "hcs";
/// Placeholder backend, not implemented.
pub const VMMS: &str = "vmms";

/// Materializes and tears down physical resources of kind `R`.
///
/// Calls may block for as long as the physical operation takes; no timeout
/// is applied here.
#[async_trait]
pub trait Provider<R: Resource>: Send + Sync {
    /// Backend name this provider was registered under.
    fn backend(&self) -> &'static str;

    /// Create the physical resource, returning the definition as realized
    /// (with provider-assigned fields filled in).
    async fn materialize(&self, definition: &R) -> Result<R>;

    /// Destroy the physical resource.
    async fn teardown(&self, definition: &R) -> Result<()>;

    /// Whether the physical resource is still present.
    async fn exists(&self, definition: &R) -> Result<bool>;
}
