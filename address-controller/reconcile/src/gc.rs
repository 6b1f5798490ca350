use address_controller_core::{
    k8s::{Address, ResourceExt},
    AddressResolver, AddressStore, RouterStatus,
};
use address_controller_status::{check_address_statuses, BrokerStatusCollector};
use anyhow::Result;

/// Deletes terminating addresses that no router or broker knows about any
/// more. Returns the number of deleted addresses.
pub(crate) async fn collect_terminating(
    store: &dyn AddressStore,
    terminating: &[Address],
    resolver: &AddressResolver<'_>,
    routers: &[RouterStatus],
    collector: &mut BrokerStatusCollector<'_>,
) -> Result<usize> {
    if terminating.is_empty() {
        return Ok(0);
    }

    // Checks run on copies so that their diagnostics are discarded.
    let mut probes = terminating.to_vec();
    let ok_counts = check_address_statuses(probes.iter_mut().collect(), resolver, routers, collector).await;

    let mut deleted = 0;
    for address in terminating {
        let name = address.name_any();
        if ok_counts.get(&name).copied().unwrap_or_default() > 0 {
            tracing::debug!(address = %name, "Terminating address is still configured");
            continue;
        }
        tracing::info!(address = %name, "Garbage collecting");
        store.delete(address).await?;
        deleted += 1;
    }
    Ok(deleted)
}
