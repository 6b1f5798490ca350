use crate::k8s::{Address, AddressSpace};
use anyhow::Result;

/// Outcome of an optimistic-concurrency status write.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Replace {
    Replaced,
    NotFound,
    /// The resource changed since it was read.
    Conflict,
}

#[async_trait::async_trait]
pub trait AddressStore: Send + Sync {
    /// The address space being reconciled, if it exists.
    async fn address_space(&self) -> Result<Option<AddressSpace>>;

    /// Writes the address's status, conditioned on its resource version.
    async fn replace_status(&self, address: &Address) -> Result<Replace>;

    async fn delete(&self, address: &Address) -> Result<()>;
}
