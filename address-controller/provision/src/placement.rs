use crate::usage::{self, UsageMap, ALL_HOSTS, EPSILON};
use address_controller_core::{
    cluster::{POOLED_PREFIX, SHARDED_PREFIX},
    k8s::{Address, AddressType, ResourceExt},
    resolver::BROKER,
};

/// Maximum length of a Kubernetes object name that also serves as a DNS label.
const MAX_NAME_LEN: usize = 63;

/// Capacity of one pooled broker, in broker units.
const POOLED_CAPACITY: f64 = 1.0;

pub fn pooled_cluster_id(infra_uuid: &str, index: usize) -> String {
    format!("{POOLED_PREFIX}-{infra_uuid}-{index}")
}

/// The dedicated cluster of an address, derived from its resource name so that
/// it stays stable across reconciliations.
pub fn sharded_cluster_id(resource_name: &str) -> String {
    let sanitized = resource_name
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect::<String>();
    let mut id = format!("{SHARDED_PREFIX}-{sanitized}");
    id.truncate(MAX_NAME_LEN);
    id.trim_end_matches('-').to_string()
}

/// Records an address's broker demand in the usage map, choosing the clusters
/// it lives on. Returns those clusters.
///
/// `preferred` lists clusters the address already lives on; a pooled address
/// stays there if the cluster still has room.
pub(crate) fn place(
    usage: &mut UsageMap,
    infra_uuid: &str,
    address: &Address,
    amount: f64,
    preferred: &[String],
) -> Vec<String> {
    let name = address.spec.address.as_str();
    match address.spec.address_type {
        AddressType::Subscription => {
            let topic = address.spec.topic.as_deref().unwrap_or_default();
            let clusters = usage::hosts_of(usage, BROKER, topic)
                .filter(|host| *host != ALL_HOSTS)
                .map(str::to_string)
                .collect::<Vec<_>>();
            if clusters.is_empty() {
                // Accounted for, but placed once its topic is.
                usage::add(usage, BROKER, ALL_HOSTS, amount, name);
            }
            for cluster in &clusters {
                usage::add(usage, BROKER, cluster, amount, name);
            }
            clusters
        }

        // Dead letters follow the addresses that reference them.
        AddressType::Deadletter => {
            usage::add(usage, BROKER, ALL_HOSTS, amount, name);
            vec![]
        }

        _ if amount >= POOLED_CAPACITY => {
            let cluster = sharded_cluster_id(&address.name_any());
            usage::add(usage, BROKER, &cluster, amount, name);
            vec![cluster]
        }

        _ => {
            let cluster = pooled_cluster(usage, infra_uuid, amount, preferred);
            usage::add(usage, BROKER, &cluster, amount, name);
            vec![cluster]
        }
    }
}

fn pooled_cluster(usage: &UsageMap, infra_uuid: &str, amount: f64, preferred: &[String]) -> String {
    let brokers = usage.get(BROKER);
    let fits = |id: &str| {
        let used = brokers
            .and_then(|b| b.get(id))
            .map(|u| u.used)
            .unwrap_or(0.0);
        used + amount <= POOLED_CAPACITY + EPSILON
    };

    if let Some(id) = preferred
        .iter()
        .find(|id| id.starts_with(POOLED_PREFIX) && fits(id))
    {
        return id.clone();
    }

    let existing = brokers
        .into_iter()
        .flat_map(|b| b.keys())
        .filter(|id| id.starts_with(POOLED_PREFIX));
    for id in existing {
        if fits(id) {
            return id.clone();
        }
    }

    (0..)
        .map(|i| pooled_cluster_id(infra_uuid, i))
        .find(|id| brokers.map_or(true, |b| !b.contains_key(id)))
        .unwrap_or_else(|| pooled_cluster_id(infra_uuid, 0))
}
