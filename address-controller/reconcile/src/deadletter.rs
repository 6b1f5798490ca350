use address_controller_core::k8s::{Address, AddressType, BrokerState, BrokerStatus};
use std::collections::{BTreeMap, BTreeSet};

/// Places dead letter addresses on every broker used by other addresses.
///
/// Brokers that no longer host any other address stay in the list as
/// `Draining` until their dead letters have been consumed. The result is
/// ordered by container id.
pub(crate) fn derive_dead_letter_statuses(addresses: &mut [Address]) {
    let in_use = addresses
        .iter()
        .filter(|a| a.spec.address_type != AddressType::Deadletter)
        .flat_map(|a| a.broker_statuses())
        .map(|bs| (bs.cluster_id.clone(), bs.container_id.clone()))
        .collect::<BTreeSet<_>>();

    for address in addresses
        .iter_mut()
        .filter(|a| a.spec.address_type == AddressType::Deadletter)
    {
        let mut by_container = BTreeMap::<String, BrokerStatus>::new();
        for (cluster_id, container_id) in &in_use {
            by_container
                .entry(container_id.clone())
                .or_insert_with(|| BrokerStatus::new(cluster_id.clone(), container_id.clone()));
        }
        for previous in address.broker_statuses() {
            by_container
                .entry(previous.container_id.clone())
                .or_insert_with(|| previous.clone().with_state(BrokerState::Draining));
        }

        let statuses = by_container.into_values().collect::<Vec<_>>();
        if statuses.as_slice() != address.broker_statuses() {
            tracing::debug!(address = %address.spec.address, brokers = statuses.len(), "Updated dead letter brokers");
            address.status_mut().broker_statuses = statuses;
        }
    }
}
