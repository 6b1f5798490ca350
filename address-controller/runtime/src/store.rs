use crate::{
    core::{AddressStore, Replace},
    k8s::{self, Address, AddressSpace, Api, DeleteParams, PostParams, ResourceExt},
};
use anyhow::Result;

/// Reads and writes addresses through the Kubernetes API.
pub(crate) struct KubeAddressStore {
    addresses: Api<Address>,
    spaces: Api<AddressSpace>,
    address_space: String,
}

// === impl KubeAddressStore ===

impl KubeAddressStore {
    pub(crate) fn new(client: k8s::Client, namespace: &str, address_space: &str) -> Self {
        Self {
            addresses: Api::namespaced(client.clone(), namespace),
            spaces: Api::namespaced(client, namespace),
            address_space: address_space.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl AddressStore for KubeAddressStore {
    async fn address_space(&self) -> Result<Option<AddressSpace>> {
        Ok(self.spaces.get_opt(&self.address_space).await?)
    }

    /// Replaces the address's status, guarded by the resource version it was
    /// read at.
    async fn replace_status(&self, address: &Address) -> Result<Replace> {
        let name = address.name_any();
        let data = serde_json::to_vec(address)?;
        match self
            .addresses
            .replace_status(&name, &PostParams::default(), data)
            .await
        {
            Ok(_) => Ok(Replace::Replaced),
            Err(k8s::Error::Api(error)) if error.code == 409 => {
                tracing::debug!(%name, "Address was modified concurrently");
                Ok(Replace::Conflict)
            }
            Err(k8s::Error::Api(error)) if error.code == 404 => Ok(Replace::NotFound),
            Err(error) => Err(error.into()),
        }
    }

    async fn delete(&self, address: &Address) -> Result<()> {
        let name = address.name_any();
        match self.addresses.delete(&name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(k8s::Error::Api(error)) if error.code == 404 => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}
