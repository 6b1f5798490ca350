use address_controller_core::{
    events::{Event, ObjectKind, Reason},
    k8s::{Address, BrokerState, ForwarderStatus, Phase},
    BrokerCluster, BrokerManagement, ClusterManager, EventSink,
};
use std::collections::BTreeSet;

/// Clears the diagnostics of the previous pass so that they are recomputed
/// from scratch.
pub(crate) fn reset_transient_status(address: &mut Address) {
    let forwarders = address
        .spec
        .forwarders
        .iter()
        .map(|f| ForwarderStatus {
            name: f.name.clone(),
            ready: true,
            messages: Vec::new(),
        })
        .collect::<Vec<_>>();

    let status = address.status_mut();
    status.messages.clear();
    if matches!(status.phase, Phase::Configuring | Phase::Active) {
        status.ready = true;
    }
    status.forwarders = forwarders;
}

/// Live addresses that passed every check become `Active`.
pub(crate) fn promote_ready<'a>(addresses: impl IntoIterator<Item = &'a mut Address>) {
    for address in addresses {
        let status = address.status_mut();
        if status.ready && status.phase == Phase::Configuring {
            tracing::info!(address = %address.spec.address, "Address is active");
            address.status_mut().phase = Phase::Active;
        }
    }
}

/// Moves `Migrating` brokers to `Draining` once every active broker of the
/// address runs on a cluster with ready replicas.
pub(crate) fn migrate_to_draining<'a>(
    addresses: impl IntoIterator<Item = &'a mut Address>,
    clusters: &[BrokerCluster],
) {
    let ready = clusters
        .iter()
        .filter(|c| c.ready_replicas > 0)
        .map(|c| c.cluster_id.as_str())
        .collect::<BTreeSet<_>>();

    for address in addresses {
        let brokers = &mut address.status_mut().broker_statuses;
        let all_active_ready = brokers
            .iter()
            .filter(|bs| bs.state == BrokerState::Active)
            .all(|bs| ready.contains(bs.cluster_id.as_str()));
        if !all_active_ready {
            continue;
        }
        for bs in brokers.iter_mut() {
            if bs.state == BrokerState::Migrating {
                tracing::info!(cluster = %bs.cluster_id, "Draining broker");
                bs.state = BrokerState::Draining;
            }
        }
    }
}

/// Drops `Draining` brokers whose queue for the address is empty. A broker
/// that cannot be queried is kept.
pub(crate) async fn remove_drained(
    addresses: Vec<&mut Address>,
    brokers: &dyn BrokerManagement,
) {
    for address in addresses {
        if !address
            .broker_statuses()
            .iter()
            .any(|bs| bs.state == BrokerState::Draining)
        {
            continue;
        }

        let queue = address.spec.address.clone();
        let mut kept = Vec::new();
        for bs in std::mem::take(&mut address.status_mut().broker_statuses) {
            if bs.state != BrokerState::Draining {
                kept.push(bs);
                continue;
            }
            match brokers.queue_message_count(&queue, &bs.cluster_id).await {
                Ok(0) => {
                    tracing::info!(address = %queue, cluster = %bs.cluster_id, "Broker drained");
                }
                Ok(count) => {
                    tracing::debug!(address = %queue, cluster = %bs.cluster_id, count, "Broker still draining");
                    kept.push(bs);
                }
                Err(error) => {
                    tracing::warn!(address = %queue, cluster = %bs.cluster_id, container = %bs.container_id, %error, "Error checking draining broker; keeping");
                    kept.push(bs);
                }
            }
        }
        address.status_mut().broker_statuses = kept;
    }
}

/// Clusters that no address refers to.
pub(crate) fn unused_clusters<'c>(
    clusters: &'c [BrokerCluster],
    addresses: &[&Address],
) -> Vec<&'c BrokerCluster> {
    let used = addresses
        .iter()
        .flat_map(|a| a.broker_statuses())
        .map(|bs| bs.cluster_id.as_str())
        .collect::<BTreeSet<_>>();
    clusters
        .iter()
        .filter(|c| !used.contains(c.cluster_id.as_str()))
        .collect()
}

/// Deletes unused clusters. Failures are reported and do not stop the pass.
pub(crate) async fn deprovision(
    manager: &dyn ClusterManager,
    events: &dyn EventSink,
    unused: &[&BrokerCluster],
) {
    for cluster in unused {
        let id = cluster.cluster_id.as_str();
        match manager.delete(cluster).await {
            Ok(()) => {
                tracing::info!(cluster = %id, "Deleted unused broker cluster");
                events.log(Event::normal(
                    Reason::BrokerDeleted,
                    ObjectKind::Address,
                    id,
                    format!("Deleted broker {id}"),
                ));
            }
            Err(error) => {
                tracing::warn!(cluster = %id, %error, "Error deleting cluster");
                events.log(Event::warning(
                    Reason::BrokerDeleteFailed,
                    ObjectKind::Address,
                    id,
                    format!("Error deleting broker cluster {id}: {error}"),
                ));
            }
        }
    }
}
