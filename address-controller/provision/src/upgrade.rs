use address_controller_core::{
    events::{Event, ObjectKind, Reason},
    k8s::{labels, Address, StandardInfraConfigSpec},
    quantity,
    resolver::{self, AddressResolver, BROKER},
    ApplyError, BrokerCluster, BrokerSetGenerator, ClusterManager, ClusterResource, EventSink,
};
use anyhow::Result;

/// Substring of the API server error returned when a patch addresses a list
/// index that no longer exists, e.g. after the container env shrinks.
pub const INVALID_INDEX_ERROR: &str = "Unable to access invalid index";

/// Brings running broker clusters in line with the desired infra config.
pub struct Upgrader<'a> {
    clusters: &'a dyn ClusterManager,
    generator: &'a dyn BrokerSetGenerator,
    events: &'a dyn EventSink,
    version: &'a str,
}

impl<'a> Upgrader<'a> {
    pub fn new(
        clusters: &'a dyn ClusterManager,
        generator: &'a dyn BrokerSetGenerator,
        events: &'a dyn EventSink,
        version: &'a str,
    ) -> Self {
        Self {
            clusters,
            generator,
            events,
            version,
        }
    }

    /// Regenerates every cluster whose applied config differs from `desired`.
    ///
    /// Nothing is upgraded unless the desired config was written for this
    /// controller's version.
    pub async fn upgrade_clusters(
        &self,
        desired: &StandardInfraConfigSpec,
        resolver: &AddressResolver<'_>,
        clusters: &[BrokerCluster],
        addresses: &[&Address],
    ) -> Result<()> {
        if desired.version != self.version {
            tracing::debug!(
                desired = %desired.version,
                version = %self.version,
                "Desired infra config is for another version; skipping upgrade"
            );
            return Ok(());
        }

        for cluster in clusters {
            if cluster.infra_config.as_ref() == Some(desired) {
                continue;
            }
            self.upgrade(desired, resolver, cluster, addresses).await?;
        }
        Ok(())
    }

    async fn upgrade(
        &self,
        desired: &StandardInfraConfigSpec,
        resolver: &AddressResolver<'_>,
        cluster: &BrokerCluster,
        addresses: &[&Address],
    ) -> Result<()> {
        let target = guard_storage(desired, cluster);
        let replicas = if cluster.is_sharded() {
            addresses
                .iter()
                .find(|a| {
                    a.broker_statuses()
                        .iter()
                        .any(|bs| bs.cluster_id == cluster.cluster_id)
                })
                .and_then(|a| resolver.granted_resources(a))
                .map(|r| resolver::amount(&r, BROKER).ceil() as i32)
                .unwrap_or(cluster.replicas)
        } else {
            1
        };

        tracing::info!(cluster = %cluster.cluster_id, replicas, "Upgrading broker cluster");
        let resources = self
            .generator
            .generate(&cluster.cluster_id, replicas, &target)?;
        let allow_resize = target.broker.allows_volume_resize();
        match self.clusters.apply(&resources, allow_resize).await {
            Ok(()) => {
                self.events.log(Event::normal(
                    Reason::BrokerUpgraded,
                    ObjectKind::Broker,
                    &cluster.cluster_id,
                    format!("Upgraded broker cluster to infra config version {}", target.version),
                ));
                Ok(())
            }
            Err(error) if error.message.contains(INVALID_INDEX_ERROR) => {
                self.reset_invalid_index(cluster, error).await
            }
            Err(error) => {
                self.events.log(Event::warning(
                    Reason::BrokerUpgradeFailed,
                    ObjectKind::Broker,
                    &cluster.cluster_id,
                    error.to_string(),
                ));
                Err(error.into())
            }
        }
    }

    /// Recovers from a patch that the API server cannot apply: the workload is
    /// scaled to zero with its env stripped and marked with its previous
    /// config, so the next pass retries the upgrade from a clean slate.
    async fn reset_invalid_index(&self, cluster: &BrokerCluster, error: ApplyError) -> Result<()> {
        tracing::warn!(cluster = %cluster.cluster_id, %error, "Resetting broker cluster after invalid index");
        let Some(resource) = error.resource.as_ref() else {
            return Err(error.into());
        };
        let applied = match cluster.infra_config.as_ref() {
            Some(config) => serde_json::to_string(config)?,
            None => String::new(),
        };
        let Some(reset) = strip_workload(resource, &applied) else {
            return Err(error.into());
        };
        if let Err(reset_error) = self.clusters.apply(&[reset], false).await {
            tracing::warn!(cluster = %cluster.cluster_id, error = %reset_error, "Failed to reset broker cluster");
            return Err(error.into());
        }
        Ok(())
    }
}

/// Keeps the cluster's current storage size when the volume may not be
/// resized, or when the desired size would shrink it.
fn guard_storage(desired: &StandardInfraConfigSpec, cluster: &BrokerCluster) -> StandardInfraConfigSpec {
    let mut target = desired.clone();
    let current = cluster
        .infra_config
        .as_ref()
        .and_then(|c| c.broker.resources.storage.as_ref());
    let Some(current) = current else {
        return target;
    };
    if target.broker.resources.storage.as_ref() == Some(current) {
        return target;
    }

    let shrinks = match (
        target.broker.resources.storage.as_deref().and_then(quantity::parse),
        quantity::parse(current),
    ) {
        (Some(desired), Some(current)) => desired < current,
        _ => false,
    };
    if !target.broker.allows_volume_resize() || shrinks {
        tracing::info!(cluster = %cluster.cluster_id, storage = %current, "Keeping current broker storage");
        target.broker.resources.storage = Some(current.clone());
    }
    target
}

fn strip_workload(resource: &ClusterResource, applied: &str) -> Option<ClusterResource> {
    let mut resource = resource.clone();
    let (metadata, spec) = match &mut resource {
        ClusterResource::StatefulSet(sts) => {
            let spec = sts.spec.as_mut()?;
            spec.replicas = Some(0);
            (&mut sts.metadata, spec.template.spec.as_mut())
        }
        ClusterResource::Deployment(deploy) => {
            let spec = deploy.spec.as_mut()?;
            spec.replicas = Some(0);
            (&mut deploy.metadata, spec.template.spec.as_mut())
        }
        ClusterResource::Service(_) => return None,
    };
    if let Some(pod) = spec {
        let init = pod.init_containers.iter_mut().flatten();
        for container in pod.containers.iter_mut().chain(init) {
            container.env = None;
        }
    }
    metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(labels::APPLIED_INFRA_CONFIG.to_string(), applied.to_string());
    Some(resource)
}
