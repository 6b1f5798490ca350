use crate::{
    placement,
    usage::{self, UsageMap, ALL_HOSTS, EPSILON},
};
use address_controller_core::{
    cluster::SHARDED_PREFIX,
    events::{Event, ObjectKind, Reason},
    k8s::{Address, AddressType, BrokerState, BrokerStatus, Phase, StandardInfraConfigSpec},
    resolver::{self, AddressResolver, AGGREGATE, BROKER, ROUTER},
    BrokerCluster, BrokerSetGenerator, ClusterManager, EventSink, RouterCluster,
};
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};

/// Accounts for the resources of admitted addresses, admits pending ones
/// within the address space's limits, and provisions the broker clusters they
/// are placed on.
pub struct AddressProvisioner<'a> {
    resolver: AddressResolver<'a>,
    clusters: &'a dyn ClusterManager,
    generator: &'a dyn BrokerSetGenerator,
    events: &'a dyn EventSink,
    infra_uuid: &'a str,
}

impl<'a> AddressProvisioner<'a> {
    pub fn new(
        resolver: AddressResolver<'a>,
        clusters: &'a dyn ClusterManager,
        generator: &'a dyn BrokerSetGenerator,
        events: &'a dyn EventSink,
        infra_uuid: &'a str,
    ) -> Self {
        Self {
            resolver,
            clusters,
            generator,
            events,
            infra_uuid,
        }
    }

    /// Computes the usage of addresses that have been granted resources.
    ///
    /// Broker usage is keyed by the cluster the address is active on. Granted
    /// addresses without an active broker are placed here, so that the usage
    /// map always describes where every granted address should live.
    pub fn check_usage<'b>(&self, granted: impl IntoIterator<Item = &'b Address>) -> UsageMap {
        let mut usage = UsageMap::new();
        let mut unplaced = Vec::new();
        for address in granted {
            let Some(resources) = self.resolver.granted_resources(address) else {
                tracing::debug!(address = %address.spec.address, "No plan for granted address");
                continue;
            };
            let name = address.spec.address.as_str();
            add_shared_resources(&mut usage, name, &resources);

            let amount = resolver::amount(&resources, BROKER);
            let active = active_clusters(address);
            if active.is_empty() {
                if address.spec.address_type.is_brokered() {
                    unplaced.push((address, amount));
                }
                continue;
            }
            for cluster in active {
                usage::add(&mut usage, BROKER, &cluster, amount, name);
            }
        }

        // Topics before their subscriptions.
        unplaced.sort_by_key(|(a, _)| a.spec.address_type == AddressType::Subscription);
        for (address, amount) in unplaced {
            placement::place(&mut usage, self.infra_uuid, address, amount, &[]);
        }
        usage
    }

    /// Admits pending addresses in batch order while their demand fits within
    /// the address space plan's limits. Returns the usage needed to serve
    /// every admitted address.
    ///
    /// A rejected address keeps its previous grant and gets a quota message;
    /// addresses that were already granted are never evicted. Topics are
    /// considered before subscriptions so that a subscription finds its
    /// topic's clusters.
    pub fn check_quota<'b>(
        &self,
        usage: &UsageMap,
        pending: impl IntoIterator<Item = &'b mut Address>,
    ) -> UsageMap {
        let mut pending = pending.into_iter().collect::<Vec<_>>();
        pending.sort_by_key(|a| a.spec.address_type == AddressType::Subscription);

        let mut needed = usage.clone();
        for address in pending {
            let Some(desired) = self.resolver.desired_plan_status(address) else {
                continue;
            };
            let name = address.spec.address.clone();

            let mut trial = needed.clone();
            let current = active_clusters(address);
            if address.phase() != Phase::Pending {
                if let Some(granted) = self.resolver.granted_resources(address) {
                    remove_resources(&mut trial, &name, &granted);
                }
            }
            add_shared_resources(&mut trial, &name, &desired.resources);
            if address.spec.address_type.is_brokered() {
                let amount = resolver::amount(&desired.resources, BROKER);
                placement::place(&mut trial, self.infra_uuid, address, amount, &current);
            }

            if let Some((resource, total, limit)) = self.exceeded(&trial, &desired.resources) {
                tracing::info!(address = %name, %resource, total, limit, "Quota exceeded");
                address.fail(format!(
                    "Quota exceeded for resource {resource}: {total:.3} of limit {limit:.3} would be used"
                ));
                continue;
            }

            needed = trial;
            let spec = address.spec.clone();
            let status = address.status_mut();
            if status.phase == Phase::Pending {
                status.phase = Phase::Configuring;
            }
            status.plan_status = Some(desired);
            status.applied_spec = Some(spec);
        }
        needed
    }

    /// Finds a limit that the usage would exceed, considering only the
    /// resources the address requests.
    fn exceeded(
        &self,
        usage: &UsageMap,
        requested: &BTreeMap<String, f64>,
    ) -> Option<(String, f64, f64)> {
        self.resolver
            .limits()
            .iter()
            .filter(|(resource, _)| {
                resource.as_str() == AGGREGATE || resolver::amount(requested, resource) > 0.0
            })
            .find_map(|(resource, limit)| {
                let total = usage::total(usage, resource);
                (total > limit + EPSILON).then(|| (resource.clone(), total, *limit))
            })
    }

    /// Scales routers, creates the broker clusters in `needed` that do not
    /// exist yet, and assigns every placed address to its clusters.
    ///
    /// Addresses whose clusters changed keep their old brokers in the
    /// `Migrating` state until they can be drained.
    pub async fn provision_resources(
        &self,
        router: &RouterCluster,
        existing: &[BrokerCluster],
        needed: &UsageMap,
        addresses: Vec<&mut Address>,
        infra: &StandardInfraConfigSpec,
    ) -> Result<()> {
        self.scale_routers(router, needed, infra).await?;

        let mut missing = Vec::new();
        if let Some(brokers) = needed.get(BROKER) {
            for (cluster_id, info) in brokers {
                if cluster_id == ALL_HOSTS || existing.iter().any(|c| &c.cluster_id == cluster_id) {
                    continue;
                }
                let replicas = if cluster_id.starts_with(SHARDED_PREFIX) {
                    info.needed()
                } else {
                    1
                };
                missing.push((cluster_id.clone(), replicas));
            }
        }
        for (cluster_id, replicas) in missing {
            self.create_cluster(&cluster_id, replicas, infra).await?;
        }

        for address in addresses {
            assign_brokers(address, needed);
        }
        Ok(())
    }

    async fn scale_routers(
        &self,
        router: &RouterCluster,
        needed: &UsageMap,
        infra: &StandardInfraConfigSpec,
    ) -> Result<()> {
        let min_replicas = infra.router.min_replicas.unwrap_or(1);
        let required = usage::total(needed, ROUTER);
        let replicas = ((required - EPSILON).ceil() as i32).max(min_replicas);
        if replicas <= router.replicas {
            return Ok(());
        }
        tracing::info!(router = %router.name, from = router.replicas, to = replicas, "Scaling routers");
        self.clusters.scale_router(replicas).await?;
        self.events.log(Event::normal(
            Reason::RouterScaled,
            ObjectKind::Router,
            &router.name,
            format!("Scaled router from {} to {replicas} replicas", router.replicas),
        ));
        Ok(())
    }

    async fn create_cluster(
        &self,
        cluster_id: &str,
        replicas: i32,
        infra: &StandardInfraConfigSpec,
    ) -> Result<()> {
        let resources = self.generator.generate(cluster_id, replicas, infra)?;
        if let Err(error) = self.clusters.apply(&resources, false).await {
            self.events.log(Event::warning(
                Reason::BrokerCreateFailed,
                ObjectKind::Broker,
                cluster_id,
                error.to_string(),
            ));
            return Err(error.into());
        }
        tracing::info!(cluster = %cluster_id, replicas, "Created broker cluster");
        self.events.log(Event::normal(
            Reason::BrokerCreated,
            ObjectKind::Broker,
            cluster_id,
            format!("Created broker cluster with {replicas} replicas"),
        ));
        Ok(())
    }
}

/// Points an address at the clusters it is placed on in `needed`.
fn assign_brokers(address: &mut Address, needed: &UsageMap) {
    let name = address.spec.address.as_str();
    let targets = usage::hosts_of(needed, BROKER, name)
        .filter(|host| *host != ALL_HOSTS)
        .map(str::to_string)
        .collect::<BTreeSet<_>>();
    if targets.is_empty() || address.spec.address_type == AddressType::Deadletter {
        return;
    }

    let status = address.status_mut();
    for bs in status.broker_statuses.iter_mut() {
        if bs.state == BrokerState::Active && !targets.contains(&bs.cluster_id) {
            tracing::info!(cluster = %bs.cluster_id, "Migrating address off broker");
            bs.state = BrokerState::Migrating;
        }
    }
    for cluster_id in targets {
        if status
            .broker_statuses
            .iter()
            .any(|bs| bs.cluster_id == cluster_id && bs.state == BrokerState::Active)
        {
            continue;
        }
        // Moving back onto a cluster that is still being left.
        let previous = status
            .broker_statuses
            .iter()
            .position(|bs| bs.cluster_id == cluster_id);
        match previous {
            Some(i) => {
                tracing::info!(cluster = %cluster_id, "Reactivating broker");
                status.broker_statuses[i].state = BrokerState::Active;
            }
            None => status
                .broker_statuses
                .push(BrokerStatus::new(cluster_id.clone(), cluster_id)),
        }
    }
}

fn active_clusters(address: &Address) -> Vec<String> {
    address
        .broker_statuses()
        .iter()
        .filter(|bs| bs.state == BrokerState::Active)
        .map(|bs| bs.cluster_id.clone())
        .collect()
}

/// Records resources other than brokers, plus the aggregate of all of them.
fn add_shared_resources(usage: &mut UsageMap, address: &str, resources: &BTreeMap<String, f64>) {
    let mut aggregate = 0.0;
    for (resource, amount) in resources {
        if resource == AGGREGATE {
            continue;
        }
        aggregate += amount;
        if resource != BROKER {
            usage::add(usage, resource, ALL_HOSTS, *amount, address);
        }
    }
    usage::add(usage, AGGREGATE, ALL_HOSTS, aggregate, address);
}

fn remove_resources(usage: &mut UsageMap, address: &str, resources: &BTreeMap<String, f64>) {
    let mut aggregate = 0.0;
    for (resource, amount) in resources {
        if resource == AGGREGATE {
            continue;
        }
        aggregate += amount;
        usage::remove(usage, resource, *amount, address);
    }
    usage::remove(usage, AGGREGATE, aggregate, address);
}
