
use crate::{AddressController, Collaborators, Config, ControllerMetrics};
use address_controller_core::{
    k8s::{
        labels, Address, AddressPlanSpec, AddressSpace, AddressSpacePlanSpec, AddressSpec,
        AddressType, BrokerInfraSpec, BrokerResources, ResourceExt, RouterInfraSpec,
        StandardInfraConfigSpec,
    },
    router::{AutoLink, LinkDirection, LinkRoute},
    AddressStore, ApplyError, BrokerCluster, BrokerManagement, ClusterManager, ClusterResource,
    Event, EventSink, Reason, Replace, RouterCluster, RouterEndpoint, RouterManagement,
    RouterStatus, Schema, SchemaProvider,
};
use address_controller_provision::ManifestBrokerSetGenerator;
use address_controller_status::{RouterStatusCache, RouterStatusMetrics};
use anyhow::{bail, Result};
use maplit::btreemap;
use parking_lot::Mutex;
use prometheus_client::registry::Registry;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tokio::time;

const SPACE: &str = "space";
const INFRA: &str = "1234";
const VERSION: &str = "0.33";

struct TestConfig {
    controller: AddressController,
    store: Arc<FakeStore>,
    clusters: Arc<FakeClusters>,
    brokers: Arc<FakeBrokers>,
    routers: Arc<FakeRouters>,
    cache: Arc<RouterStatusCache>,
    events: Arc<RecordingEvents>,
    registry: Registry,
    _tracing: tracing::subscriber::DefaultGuard,
}

#[derive(Default)]
struct FakeStore {
    space: Mutex<Option<AddressSpace>>,
    written: Mutex<Vec<Address>>,
    conflicts: Mutex<BTreeSet<String>>,
    deleted: Mutex<Vec<String>>,
}

#[derive(Default)]
struct FakeClusters {
    clusters: Mutex<BTreeMap<String, BrokerCluster>>,
    unready: Mutex<BTreeSet<String>>,
    applied: Mutex<usize>,
    deleted: Mutex<Vec<String>>,
    router_replicas: Mutex<i32>,
}

/// Every broker reports the same configured addresses and queues.
#[derive(Default)]
struct FakeBrokers {
    configured: Mutex<BTreeSet<String>>,
    messages: Mutex<BTreeMap<String, u64>>,
    unreachable: Mutex<BTreeSet<String>>,
}

#[derive(Default)]
struct FakeRouters {
    statuses: Mutex<Vec<RouterStatus>>,
}

#[derive(Default)]
struct RecordingEvents(Mutex<Vec<Event>>);

// === impl TestConfig ===

impl Default for TestConfig {
    fn default() -> Self {
        Self::from_schema(SchemaProvider::fixed(schema(10.0)))
    }
}

impl TestConfig {
    fn from_schema(schema: SchemaProvider) -> Self {
        let _tracing = Self::init_tracing();

        let store = Arc::new(FakeStore::default());
        let clusters = Arc::new(FakeClusters::default());
        *clusters.router_replicas.lock() = 1;
        let brokers = Arc::new(FakeBrokers::default());
        let routers = Arc::new(FakeRouters::default());
        let events = Arc::new(RecordingEvents::default());

        let mut registry = Registry::default();
        let metrics = ControllerMetrics::register(&mut registry);
        let cache = RouterStatusCache::new(
            routers.clone(),
            time::Duration::from_secs(30),
            RouterStatusMetrics::default(),
        );
        let collaborators = Collaborators {
            store: store.clone(),
            clusters: clusters.clone(),
            brokers: brokers.clone(),
            generator: Arc::new(ManifestBrokerSetGenerator::new(
                INFRA,
                "enmasse-infra",
                "broker:latest",
            )),
            events: events.clone(),
        };
        let config = Config {
            address_space: SPACE.to_string(),
            address_space_plan: "standard".to_string(),
            infra_uuid: INFRA.to_string(),
            version: VERSION.to_string(),
            resync_interval: time::Duration::from_secs(30),
        };
        let controller =
            AddressController::new(config, schema, collaborators, cache.clone(), metrics);

        Self {
            controller,
            store,
            clusters,
            brokers,
            routers,
            cache,
            events,
            registry,
            _tracing,
        }
    }

    fn init_tracing() -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(tracing::Level::TRACE)
                .finish(),
        )
    }

    /// Polls routers, reconciles the batch and returns the addresses whose
    /// status was written.
    async fn reconcile(&self, batch: &[Address]) -> Vec<Address> {
        self.cache.poll().await;
        self.controller
            .on_update(batch.to_vec())
            .await
            .expect("reconciliation must succeed");
        std::mem::take(&mut *self.store.written.lock())
    }

    fn metrics(&self) -> String {
        let mut buf = String::new();
        prometheus_client::encoding::text::encode(&mut buf, &self.registry)
            .expect("metrics must encode");
        buf
    }
}

/// Replaces addresses of the batch with their written versions, as the watch
/// would deliver them on the next pass.
fn apply_writes(batch: &mut [Address], written: Vec<Address>) {
    for address in written {
        if let Some(slot) = batch.iter_mut().find(|a| a.name_any() == address.name_any()) {
            *slot = address;
        }
    }
}

fn find<'a>(addresses: &'a [Address], name: &str) -> &'a Address {
    addresses
        .iter()
        .find(|a| a.spec.address == name)
        .unwrap_or_else(|| panic!("{name} must be written"))
}

// === impl FakeStore ===

#[async_trait::async_trait]
impl AddressStore for FakeStore {
    async fn address_space(&self) -> Result<Option<AddressSpace>> {
        Ok(self.space.lock().clone())
    }

    async fn replace_status(&self, address: &Address) -> Result<Replace> {
        if self.conflicts.lock().contains(&address.name_any()) {
            return Ok(Replace::Conflict);
        }
        self.written.lock().push(address.clone());
        Ok(Replace::Replaced)
    }

    async fn delete(&self, address: &Address) -> Result<()> {
        self.deleted.lock().push(address.name_any());
        Ok(())
    }
}

// === impl FakeClusters ===

impl FakeClusters {
    fn ids(&self) -> Vec<String> {
        self.clusters.lock().keys().cloned().collect()
    }

    /// Adds a running cluster that was generated from the current infra config.
    fn add(&self, cluster_id: &str) {
        self.clusters.lock().insert(
            cluster_id.to_string(),
            BrokerCluster {
                cluster_id: cluster_id.to_string(),
                replicas: 1,
                ready_replicas: 1,
                infra_config: Some(infra()),
                resources: vec![],
            },
        );
    }

    fn applied(&self) -> usize {
        *self.applied.lock()
    }
}

#[async_trait::async_trait]
impl ClusterManager for FakeClusters {
    async fn list_clusters(&self) -> Result<Vec<BrokerCluster>> {
        let unready = self.unready.lock().clone();
        Ok(self
            .clusters
            .lock()
            .values()
            .cloned()
            .map(|mut c| {
                if unready.contains(&c.cluster_id) {
                    c.ready_replicas = 0;
                }
                c
            })
            .collect())
    }

    async fn router_cluster(&self) -> Result<RouterCluster> {
        Ok(RouterCluster {
            name: format!("qdrouterd-{INFRA}"),
            replicas: *self.router_replicas.lock(),
            infra_config: None,
        })
    }

    async fn scale_router(&self, replicas: i32) -> Result<()> {
        *self.router_replicas.lock() = replicas;
        Ok(())
    }

    async fn apply(&self, resources: &[ClusterResource], _: bool) -> Result<(), ApplyError> {
        *self.applied.lock() += 1;
        for resource in resources {
            let ClusterResource::StatefulSet(sts) = resource else {
                continue;
            };
            let replicas = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
            let infra_config = sts
                .annotations()
                .get(labels::APPLIED_INFRA_CONFIG)
                .and_then(|config| serde_json::from_str(config).ok());
            let cluster = BrokerCluster {
                cluster_id: sts.name_any(),
                replicas,
                ready_replicas: replicas,
                infra_config,
                resources: resources.to_vec(),
            };
            self.clusters
                .lock()
                .insert(cluster.cluster_id.clone(), cluster);
        }
        Ok(())
    }

    async fn delete(&self, cluster: &BrokerCluster) -> Result<()> {
        self.clusters.lock().remove(&cluster.cluster_id);
        self.deleted.lock().push(cluster.cluster_id.clone());
        Ok(())
    }

    async fn is_cluster_ready(&self, cluster_id: &str) -> Result<bool> {
        let exists = self.clusters.lock().contains_key(cluster_id);
        Ok(exists && !self.unready.lock().contains(cluster_id))
    }
}

// === impl FakeBrokers ===

impl FakeBrokers {
    fn configure(&self, names: &[&str]) {
        self.configured
            .lock()
            .extend(names.iter().map(|n| n.to_string()));
    }

    fn set_messages(&self, cluster_id: &str, count: u64) {
        self.messages.lock().insert(cluster_id.to_string(), count);
    }
}

#[async_trait::async_trait]
impl BrokerManagement for FakeBrokers {
    async fn address_names(&self, _: &str) -> Result<BTreeSet<String>> {
        Ok(self.configured.lock().clone())
    }

    async fn queue_names(&self, _: &str) -> Result<BTreeSet<String>> {
        Ok(self.configured.lock().clone())
    }

    async fn queue_message_count(&self, _: &str, cluster_id: &str) -> Result<u64> {
        if self.unreachable.lock().contains(cluster_id) {
            bail!("connection refused");
        }
        Ok(self
            .messages
            .lock()
            .get(cluster_id)
            .copied()
            .unwrap_or_default())
    }
}

// === impl FakeRouters ===

impl FakeRouters {
    /// Reports a single router that is fully configured for the addresses.
    fn report(&self, addresses: &[&str]) {
        *self.statuses.lock() = vec![router("router-0", addresses)];
    }
}

#[async_trait::async_trait]
impl RouterManagement for FakeRouters {
    async fn routers(&self) -> Result<Vec<RouterEndpoint>> {
        Ok(self
            .statuses
            .lock()
            .iter()
            .map(|s| RouterEndpoint {
                router_id: s.router_id.clone(),
                host: format!("{}.routers", s.router_id),
            })
            .collect())
    }

    async fn query(&self, router: &RouterEndpoint, _: bool) -> Result<RouterStatus> {
        let status = self
            .statuses
            .lock()
            .iter()
            .find(|s| s.router_id == router.router_id)
            .cloned();
        match status {
            Some(status) => Ok(status),
            None => bail!("connection refused"),
        }
    }
}

// === impl RecordingEvents ===

impl EventSink for RecordingEvents {
    fn log(&self, event: Event) {
        self.0.lock().push(event);
    }
}

impl RecordingEvents {
    fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.0.lock())
    }

    fn reasons(&self) -> Vec<Reason> {
        self.0.lock().iter().map(|e| e.reason).collect()
    }
}

// === fixtures ===

fn plan(address_type: AddressType, broker: f64) -> AddressPlanSpec {
    AddressPlanSpec {
        address_type,
        short_description: None,
        resources: btreemap! { "broker".to_string() => broker, "router".to_string() => 0.1 },
        message_ttl: None,
        message_redelivery: None,
    }
}

fn schema(broker_limit: f64) -> Schema {
    Schema {
        address_space_plans: btreemap! {
            "standard".to_string() => AddressSpacePlanSpec {
                address_space_type: "standard".to_string(),
                infra_config_ref: "default".to_string(),
                resource_limits: btreemap! {
                    "broker".to_string() => broker_limit,
                    "router".to_string() => 10.0,
                },
                address_plans: vec![
                    "standard-anycast".to_string(),
                    "pooled-queue".to_string(),
                    "large-queue".to_string(),
                    "sharded-queue".to_string(),
                    "pooled-topic".to_string(),
                    "pooled-subscription".to_string(),
                    "deadletter".to_string(),
                ],
            },
        },
        address_plans: btreemap! {
            "standard-anycast".to_string() => plan(AddressType::Anycast, 0.0),
            "pooled-queue".to_string() => plan(AddressType::Queue, 0.2),
            "large-queue".to_string() => plan(AddressType::Queue, 0.6),
            "sharded-queue".to_string() => plan(AddressType::Queue, 1.0),
            "pooled-topic".to_string() => plan(AddressType::Topic, 0.2),
            "pooled-subscription".to_string() => plan(AddressType::Subscription, 0.1),
            "deadletter".to_string() => plan(AddressType::Deadletter, 0.0),
        },
        infra_configs: btreemap! { "default".to_string() => infra() },
    }
}

fn infra() -> StandardInfraConfigSpec {
    StandardInfraConfigSpec {
        version: VERSION.to_string(),
        broker: BrokerInfraSpec {
            resources: BrokerResources {
                memory: Some("512Mi".to_string()),
                storage: Some("2Gi".to_string()),
            },
            ..Default::default()
        },
        router: RouterInfraSpec::default(),
    }
}

fn spec(name: &str, address_type: AddressType, plan: &str) -> AddressSpec {
    AddressSpec {
        address: name.to_string(),
        address_type,
        plan: plan.to_string(),
        topic: None,
        deadletter: None,
        expiry: None,
        forwarders: vec![],
        message_ttl: None,
        message_redelivery: None,
    }
}

fn address(name: &str, address_type: AddressType, plan: &str) -> Address {
    Address::new(&format!("{SPACE}.{name}"), spec(name, address_type, plan))
}

fn router(id: &str, addresses: &[&str]) -> RouterStatus {
    let directions = [LinkDirection::In, LinkDirection::Out];
    RouterStatus {
        router_id: id.to_string(),
        addresses: addresses.iter().map(|a| a.to_string()).collect(),
        auto_links: addresses
            .iter()
            .flat_map(|a| {
                directions.map(|direction| AutoLink {
                    name: format!("{a}.{direction}"),
                    address: a.to_string(),
                    direction,
                    container_id: None,
                    oper_status: "active".to_string(),
                })
            })
            .collect(),
        link_routes: addresses
            .iter()
            .flat_map(|a| {
                directions.map(|direction| LinkRoute {
                    name: format!("{a}.{direction}"),
                    prefix: a.to_string(),
                    direction,
                    container_id: None,
                    oper_status: "active".to_string(),
                })
            })
            .collect(),
        ..Default::default()
    }
}
