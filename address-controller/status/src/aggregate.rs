use crate::{
    broker::{BrokerStatusCollector, ClusterView},
    checks,
    settings::{resolve_message_redelivery, resolve_message_ttl},
};
use address_controller_core::{
    k8s::{Address, AddressType, BrokerStatus, ResourceExt},
    resolver::{self, AddressResolver},
    RouterStatus,
};
use std::collections::{BTreeMap, BTreeSet};

/// Checks every address against the latest router statuses and the brokers it
/// is assigned to, returning the number of satisfied checks per address
/// resource name.
///
/// Each failed check clears the address's `ready` flag and appends a message;
/// checking always continues through all routers and brokers.
pub async fn check_address_statuses(
    addresses: Vec<&mut Address>,
    resolver: &AddressResolver<'_>,
    routers: &[RouterStatus],
    collector: &mut BrokerStatusCollector<'_>,
) -> BTreeMap<String, usize> {
    let mut ok_counts = BTreeMap::new();
    for address in addresses {
        let ok = check_address(address, resolver, routers, collector).await;
        tracing::trace!(address = %address.spec.address, ok, "Checked address");
        ok_counts.insert(address.name_any(), ok);
    }
    ok_counts
}

async fn check_address(
    address: &mut Address,
    resolver: &AddressResolver<'_>,
    routers: &[RouterStatus],
    collector: &mut BrokerStatusCollector<'_>,
) -> usize {
    let plan = resolver.applied_plan(address);
    let brokers = address.broker_statuses().to_vec();
    let name = address.spec.address.clone();

    let mut ok = 0;
    match address.spec.address_type {
        AddressType::Deadletter => {
            ok += check_broker_status(address, &brokers, collector).await;
            for router in routers {
                ok += checks::check_address(router, address);
                ok += checks::check_auto_links(router, address, 1);
            }
            for broker in &brokers {
                let view = collector.cluster(&broker.cluster_id).await;
                ok += check_address_and_queue(address, broker, view, &name, Some(&name));
            }
            ok += checks::check_active_auto_link(address, routers, 1);
        }

        AddressType::Queue => {
            ok += check_broker_status(address, &brokers, collector).await;
            for router in routers {
                ok += checks::check_address(router, address);
                ok += checks::check_auto_links(router, address, 2);
            }
            let related = [address.spec.deadletter.clone(), address.spec.expiry.clone()];
            for broker in &brokers {
                let view = collector.cluster(&broker.cluster_id).await;
                ok += check_address_and_queue(address, broker, view, &name, Some(&name));
                for target in related.iter().flatten() {
                    ok += check_address_and_queue(address, broker, view, target, Some(target));
                }
            }
            ok += checks::check_active_auto_link(address, routers, 2);
            ok += checks::check_forwarder_links(address, routers);
        }

        AddressType::Subscription => {
            ok += check_broker_status(address, &brokers, collector).await;
            let topic = address.spec.topic.clone().unwrap_or_default();
            for broker in &brokers {
                let view = collector.cluster(&broker.cluster_id).await;
                ok += check_address_and_queue(address, broker, view, &topic, Some(&name));
            }
            ok += checks::check_forwarder_links(address, routers);
        }

        AddressType::Topic => {
            ok += check_broker_status(address, &brokers, collector).await;
            for router in routers {
                ok += checks::check_link_routes(router, address);
            }
            let pooled = resolver
                .granted_resources(address)
                .map(|r| resolver::is_pooled(&r))
                .unwrap_or(true);
            if pooled {
                let expiry = address.spec.expiry.clone();
                for broker in &brokers {
                    let view = collector.cluster(&broker.cluster_id).await;
                    ok += check_address_and_queue(address, broker, view, &name, None);
                    if let Some(expiry) = expiry.as_deref() {
                        ok += check_address_and_queue(address, broker, view, expiry, Some(expiry));
                    }
                }
                ok += checks::check_active_link_route(address, routers);
            } else {
                ok += checks::check_connection(address, routers);
            }
        }

        AddressType::Anycast | AddressType::Multicast => {
            for router in routers {
                ok += checks::check_address(router, address);
            }
        }
    }

    if matches!(
        address.spec.address_type,
        AddressType::Queue | AddressType::Topic | AddressType::Deadletter
    ) {
        if let Some(plan) = plan {
            let ttl = resolve_message_ttl(plan, &address.spec);
            let redelivery = resolve_message_redelivery(plan, &address.spec);
            let status = address.status_mut();
            status.message_ttl = ttl;
            status.message_redelivery = redelivery;
        }
    }

    ok
}

/// Counts the distinct assigned clusters that are available.
async fn check_broker_status(
    address: &mut Address,
    brokers: &[BrokerStatus],
    collector: &mut BrokerStatusCollector<'_>,
) -> usize {
    let mut cluster_ids = BTreeSet::new();
    for bs in brokers {
        cluster_ids.insert(bs.cluster_id.clone());
    }
    let mut ok = 0;
    for cluster_id in cluster_ids {
        if collector.cluster(&cluster_id).await.ready {
            ok += 1;
        } else {
            address.fail(format!("Cluster {cluster_id} is unavailable"));
        }
    }
    ok
}

fn check_address_and_queue(
    address: &mut Address,
    broker: &BrokerStatus,
    view: &ClusterView,
    expected_address: &str,
    expected_queue: Option<&str>,
) -> usize {
    let mut ok = 0;
    if view.addresses.contains(expected_address) {
        ok += 1;
    } else {
        address.fail(format!(
            "Address {expected_address} is not configured on broker {}",
            broker.container_id
        ));
    }
    if let Some(queue) = expected_queue {
        if view.queues.contains(queue) {
            ok += 1;
        } else {
            address.fail(format!(
                "Queue {queue} is not configured on broker {}",
                broker.container_id
            ));
        }
    }
    ok
}
