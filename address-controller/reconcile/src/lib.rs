#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod deadletter;
mod gc;
mod lifecycle;
mod metrics;
mod persist;
mod validate;

#[cfg(test)]
mod tests;

pub use self::{
    metrics::ControllerMetrics,
    validate::{admit, Admission},
};

use self::persist::ProvisionState;
use address_controller_core::{
    k8s::{Address, AddressType, Phase, ResourceExt},
    AddressResolver, AddressStore, BrokerCluster, BrokerManagement, BrokerSetGenerator,
    ClusterManager, EventSink, SchemaProvider,
};
use address_controller_provision::{AddressProvisioner, Upgrader};
use address_controller_status::{check_address_statuses, BrokerStatusCollector, RouterStatusCache};
use anyhow::{anyhow, Result};
use std::{collections::BTreeSet, sync::Arc};
use tokio::{sync::watch, task::JoinHandle, time};
use tracing::{info_span, Instrument};

/// Settings of the address space being reconciled.
#[derive(Clone, Debug)]
pub struct Config {
    pub address_space: String,
    pub address_space_plan: String,
    pub infra_uuid: String,

    /// Infra configs are only rolled out when their version matches.
    pub version: String,

    pub resync_interval: time::Duration,
}

/// The systems an address controller reads and changes.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn AddressStore>,
    pub clusters: Arc<dyn ClusterManager>,
    pub brokers: Arc<dyn BrokerManagement>,
    pub generator: Arc<dyn BrokerSetGenerator>,
    pub events: Arc<dyn EventSink>,
}

/// Reconciles the addresses of one standard address space.
pub struct AddressController {
    config: Config,
    schema: SchemaProvider,
    collaborators: Collaborators,
    routers: Arc<RouterStatusCache>,
    metrics: ControllerMetrics,
}

/// Snapshots of the addresses in the namespace. `None` until the initial
/// listing completes.
pub type Batches = watch::Receiver<Option<Arc<Vec<Address>>>>;

/// Handle to the tasks of a started controller.
#[derive(Debug)]
pub struct Running {
    poller: JoinHandle<()>,
    reconciler: JoinHandle<()>,
}

// === impl AddressController ===

impl AddressController {
    pub fn new(
        config: Config,
        schema: SchemaProvider,
        collaborators: Collaborators,
        routers: Arc<RouterStatusCache>,
        metrics: ControllerMetrics,
    ) -> Self {
        Self {
            config,
            schema,
            collaborators,
            routers,
            metrics,
        }
    }

    /// Starts polling routers and reconciling every batch published on
    /// `batches`, as well as the latest batch each resync interval.
    pub async fn start(self: Arc<Self>, batches: Batches) -> Running {
        // Existing addresses can only become ready once routers reported.
        self.routers.poll().await;
        let poller = tokio::spawn(
            self.routers
                .clone()
                .run()
                .instrument(info_span!("routers")),
        );

        let span = info_span!("reconcile", address_space = %self.config.address_space);
        let reconciler = tokio::spawn(self.run(batches).instrument(span));
        Running { poller, reconciler }
    }

    async fn run(self: Arc<Self>, mut batches: Batches) {
        loop {
            let batch = batches.borrow_and_update().clone();
            match batch {
                Some(batch) => {
                    if let Err(error) = self.on_update(batch.as_ref().clone()).await {
                        tracing::warn!(%error, "Failed to reconcile addresses");
                    }
                }
                None => tracing::debug!("Waiting for addresses"),
            }

            tokio::select! {
                res = batches.changed() => {
                    if res.is_err() {
                        tracing::debug!("Address watch closed");
                        return;
                    }
                }
                _ = time::sleep(self.config.resync_interval) => {
                    tracing::trace!("Resync");
                }
            }
        }
    }

    /// Reconciles one batch of addresses.
    ///
    /// Addresses of other address spaces are ignored. Nothing happens until
    /// a schema is available.
    pub async fn on_update(&self, batch: Vec<Address>) -> Result<()> {
        let start = time::Instant::now();
        let Collaborators {
            store,
            clusters,
            brokers,
            generator,
            events,
        } = &self.collaborators;

        let Some(schema) = self.schema.snapshot() else {
            tracing::info!("No schema available");
            return Ok(());
        };
        let plan_name = self.config.address_space_plan.as_str();
        let resolver = AddressResolver::new(&schema, plan_name)
            .ok_or_else(|| anyhow!("address space plan {plan_name} not found"))?;
        let infra_name = resolver.space_plan().infra_config_ref.as_str();
        let infra = schema
            .infra_config(infra_name)
            .ok_or_else(|| anyhow!("infra config {infra_name} not found"))?;

        let prefix = format!("{}.", self.config.address_space);
        let mut batch = batch
            .into_iter()
            .filter(|a| a.name_any().starts_with(&prefix))
            .collect::<Vec<_>>();
        let previous = ProvisionState::snapshot(&batch);
        for address in batch.iter_mut() {
            lifecycle::reset_transient_status(address);
        }

        let space = match store.address_space().await {
            Ok(space) => space,
            Err(error) => {
                tracing::warn!(%error, "Failed to read address space");
                None
            }
        };
        if space.is_none() {
            tracing::warn!("Unable to find address space, will not validate address forwarders");
        }
        let Admission {
            mut admitted,
            rejected,
            held,
        } = validate::admit(batch, space.as_ref(), &resolver);
        let resolved = start.elapsed();

        let provisioner = AddressProvisioner::new(
            resolver,
            clusters.as_ref(),
            generator.as_ref(),
            events.as_ref(),
            &self.config.infra_uuid,
        );
        let usage = provisioner.check_usage(admitted.iter().filter(|a| a.phase() != Phase::Pending));
        tracing::debug!(?usage, "Calculated usage");
        let usage_done = start.elapsed();

        let pending = admitted
            .iter()
            .filter(|a| a.phase() != Phase::Terminating)
            .filter(|a| !held.contains(&a.name_any()))
            .filter(|a| validate::needs_quota(a, &resolver))
            .map(|a| a.name_any())
            .collect::<BTreeSet<_>>();
        let needed = provisioner.check_quota(
            &usage,
            admitted.iter_mut().filter(|a| pending.contains(&a.name_any())),
        );
        tracing::debug!(?needed, "Checked quota");
        if admitted
            .iter()
            .any(|a| matches!(a.phase(), Phase::Pending | Phase::Configuring))
        {
            self.routers.wakeup();
        }
        let quota_done = start.elapsed();

        let cluster_list = clusters.list_clusters().await?;
        let router = clusters.router_cluster().await?;
        // Granted addresses that lost or never got their brokers are assigned
        // along with the newly admitted ones.
        let placed = admitted
            .iter_mut()
            .filter(|a| a.phase() != Phase::Terminating && !held.contains(&a.name_any()))
            .collect::<Vec<_>>();
        provisioner
            .provision_resources(&router, &cluster_list, &needed, placed, infra)
            .await?;
        deadletter::derive_dead_letter_statuses(&mut admitted);
        let provision_done = start.elapsed();

        let check_links = admitted.iter().any(|a| {
            is_live(a)
                && matches!(
                    a.spec.address_type,
                    AddressType::Queue | AddressType::Subscription
                )
                && !a.spec.forwarders.is_empty()
        });
        self.routers.set_check_router_links(check_links);
        let routers = self.routers.latest();

        let mut collector = BrokerStatusCollector::new(brokers.as_ref(), clusters.as_ref());
        let live = admitted.iter_mut().filter(|a| is_live(a)).collect::<Vec<_>>();
        check_address_statuses(live, &resolver, &routers, &mut collector).await;
        lifecycle::promote_ready(admitted.iter_mut().filter(|a| is_live(a)));
        let checks_done = start.elapsed();

        lifecycle::migrate_to_draining(admitted.iter_mut(), &cluster_list);
        lifecycle::remove_drained(admitted.iter_mut().collect(), brokers.as_ref()).await;

        let not_terminating = admitted
            .iter()
            .filter(|a| a.phase() != Phase::Terminating)
            .collect::<Vec<_>>();
        let unused = lifecycle::unused_clusters(&cluster_list, &not_terminating);
        lifecycle::deprovision(clusters.as_ref(), events.as_ref(), &unused).await;
        let used = cluster_list
            .iter()
            .filter(|c| !unused.iter().any(|u| u.cluster_id == c.cluster_id))
            .cloned()
            .collect::<Vec<BrokerCluster>>();
        let deprovision_done = start.elapsed();

        Upgrader::new(
            clusters.as_ref(),
            generator.as_ref(),
            events.as_ref(),
            &self.config.version,
        )
        .upgrade_clusters(infra, &resolver, &used, &not_terminating)
        .await?;
        let upgrade_done = start.elapsed();

        let statuses = admitted.iter().chain(rejected.iter()).collect::<Vec<_>>();
        let persisted = persist::persist(store.as_ref(), &statuses, &previous).await?;
        self.metrics.stale_writes(persisted.stale);
        let persist_done = start.elapsed();

        let terminating = admitted
            .iter()
            .filter(|a| a.phase() == Phase::Terminating)
            .cloned()
            .collect::<Vec<_>>();
        let collected =
            gc::collect_terminating(store.as_ref(), &terminating, &resolver, &routers, &mut collector)
                .await?;
        self.metrics.garbage_collected(collected);
        let total = start.elapsed();

        tracing::info!(
            ?total,
            ?resolved,
            usage = ?(usage_done - resolved),
            quota = ?(quota_done - usage_done),
            provision = ?(provision_done - quota_done),
            checks = ?(checks_done - provision_done),
            deprovision = ?(deprovision_done - checks_done),
            upgrade = ?(upgrade_done - deprovision_done),
            persist = ?(persist_done - upgrade_done),
            gc = ?(total - persist_done),
            written = persisted.written,
            "Reconciled addresses"
        );

        let all = admitted.into_iter().chain(rejected).collect::<Vec<_>>();
        self.metrics.record(&all, !routers.is_empty());
        self.metrics.observe_duration(total);
        Ok(())
    }
}

fn is_live(address: &Address) -> bool {
    matches!(address.phase(), Phase::Configuring | Phase::Active)
}

// === impl Running ===

impl Running {
    /// Stops polling and reconciling. A reconciliation in progress is
    /// abandoned.
    pub fn stop(self) {
        self.poller.abort();
        self.reconciler.abort();
    }
}
