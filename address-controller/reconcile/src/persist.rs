use address_controller_core::{
    k8s::{Address, AddressSpec, AddressStatus, ResourceExt},
    AddressStore, Replace,
};
use anyhow::Result;
use std::collections::BTreeMap;

/// A deep copy of what reconciliation may change on an address.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ProvisionState {
    status: Option<AddressStatus>,
    applied_spec: Option<AddressSpec>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Persisted {
    pub written: usize,
    pub stale: usize,
    pub missing: usize,
}

// === impl ProvisionState ===

impl ProvisionState {
    pub(crate) fn of(address: &Address) -> Self {
        Self {
            status: address.status.clone(),
            applied_spec: address.status().and_then(|s| s.applied_spec.clone()),
        }
    }

    /// Snapshots every address of the batch by resource name.
    pub(crate) fn snapshot(batch: &[Address]) -> BTreeMap<String, Self> {
        batch.iter().map(|a| (a.name_any(), Self::of(a))).collect()
    }
}

/// Writes the status of every address that changed during the pass.
///
/// An address that was modified concurrently is skipped: the watch delivers
/// its current state and the next pass recomputes it.
pub(crate) async fn persist(
    store: &dyn AddressStore,
    addresses: &[&Address],
    previous: &BTreeMap<String, ProvisionState>,
) -> Result<Persisted> {
    let mut persisted = Persisted::default();
    for &address in addresses {
        let name = address.name_any();
        if previous.get(&name) == Some(&ProvisionState::of(address)) {
            tracing::trace!(address = %name, "No change");
            continue;
        }

        match store.replace_status(address).await? {
            Replace::Replaced => {
                tracing::debug!(address = %name, phase = %address.phase(), "Updated address status");
                persisted.written += 1;
            }
            Replace::Conflict => {
                tracing::debug!(
                    address = %name,
                    resource_version = ?address.resource_version(),
                    "Address has stale resource version"
                );
                persisted.stale += 1;
            }
            Replace::NotFound => {
                tracing::info!(address = %name, "Failed to persist address state; address not found");
                persisted.missing += 1;
            }
        }
    }

    if persisted.stale > 0 {
        tracing::info!(stale = persisted.stale, "Some addresses were stale");
    }
    Ok(persisted)
}
