use crate::{
    check_address_statuses, resolve_message_redelivery, resolve_message_ttl,
    BrokerStatusCollector, RouterStatusCache, RouterStatusMetrics,
};
use address_controller_core::{
    k8s::{
        Address, AddressPlanSpec, AddressSpacePlanSpec, AddressSpec, AddressType, BrokerStatus,
        ForwarderDirection, ForwarderSpec, ForwarderStatus, MessageRedelivery, MessageTtl, Phase,
    },
    router::{AutoLink, LinkDirection, RouterLink},
    AddressResolver, ApplyError, BrokerCluster, BrokerManagement, ClusterManager,
    ClusterResource, RouterCluster, RouterEndpoint, RouterManagement, RouterStatus, Schema,
};
use anyhow::{bail, Result};
use maplit::{btreemap, btreeset};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tokio::time;

#[derive(Default)]
struct FakeBrokers {
    addresses: BTreeMap<String, BTreeSet<String>>,
    queues: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Default)]
struct FakeClusters {
    ready: BTreeSet<String>,
    readiness_checks: Mutex<usize>,
}

#[derive(Default)]
struct FakeRouters {
    statuses: Vec<RouterStatus>,
    include_links: Mutex<Vec<bool>>,
}

#[async_trait::async_trait]
impl BrokerManagement for FakeBrokers {
    async fn address_names(&self, cluster_id: &str) -> Result<BTreeSet<String>> {
        Ok(self.addresses.get(cluster_id).cloned().unwrap_or_default())
    }

    async fn queue_names(&self, cluster_id: &str) -> Result<BTreeSet<String>> {
        Ok(self.queues.get(cluster_id).cloned().unwrap_or_default())
    }

    async fn queue_message_count(&self, _: &str, _: &str) -> Result<u64> {
        Ok(0)
    }
}

#[async_trait::async_trait]
impl ClusterManager for FakeClusters {
    async fn list_clusters(&self) -> Result<Vec<BrokerCluster>> {
        Ok(vec![])
    }

    async fn router_cluster(&self) -> Result<RouterCluster> {
        bail!("no router cluster")
    }

    async fn scale_router(&self, _: i32) -> Result<()> {
        Ok(())
    }

    async fn apply(&self, _: &[ClusterResource], _: bool) -> Result<(), ApplyError> {
        Ok(())
    }

    async fn delete(&self, _: &BrokerCluster) -> Result<()> {
        Ok(())
    }

    async fn is_cluster_ready(&self, cluster_id: &str) -> Result<bool> {
        *self.readiness_checks.lock() += 1;
        Ok(self.ready.contains(cluster_id))
    }
}

#[async_trait::async_trait]
impl RouterManagement for FakeRouters {
    async fn routers(&self) -> Result<Vec<RouterEndpoint>> {
        Ok(self
            .statuses
            .iter()
            .map(|s| RouterEndpoint {
                router_id: s.router_id.clone(),
                host: format!("{}.routers", s.router_id),
            })
            .chain(Some(RouterEndpoint {
                router_id: "broken".to_string(),
                host: "broken.routers".to_string(),
            }))
            .collect())
    }

    async fn query(&self, router: &RouterEndpoint, include_links: bool) -> Result<RouterStatus> {
        self.include_links.lock().push(include_links);
        match self.statuses.iter().find(|s| s.router_id == router.router_id) {
            Some(status) => Ok(status.clone()),
            None => bail!("connection refused"),
        }
    }
}

fn plan(address_type: AddressType, broker: f64) -> AddressPlanSpec {
    AddressPlanSpec {
        address_type,
        short_description: None,
        resources: btreemap! { "broker".to_string() => broker, "router".to_string() => 0.01 },
        message_ttl: None,
        message_redelivery: None,
    }
}

fn schema() -> Schema {
    Schema {
        address_space_plans: btreemap! {
            "standard".to_string() => AddressSpacePlanSpec {
                address_space_type: "standard".to_string(),
                infra_config_ref: "default".to_string(),
                resource_limits: btreemap! {},
                address_plans: vec![
                    "pooled-queue".to_string(),
                    "standard-anycast".to_string(),
                    "pooled-topic".to_string(),
                    "sharded-topic".to_string(),
                ],
            },
        },
        address_plans: btreemap! {
            "pooled-queue".to_string() => plan(AddressType::Queue, 0.1),
            "standard-anycast".to_string() => plan(AddressType::Anycast, 0.0),
            "pooled-topic".to_string() => plan(AddressType::Topic, 0.1),
            "sharded-topic".to_string() => plan(AddressType::Topic, 1.0),
        },
        infra_configs: Default::default(),
    }
}

fn address(name: &str, address_type: AddressType, plan: &str) -> Address {
    let mut address = Address::new(
        &format!("space.{name}"),
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
        },
    );
    let status = address.status_mut();
    status.phase = Phase::Configuring;
    status.ready = true;
    address
}

fn router(id: &str, addresses: &[&str]) -> RouterStatus {
    RouterStatus {
        router_id: id.to_string(),
        addresses: addresses.iter().map(|a| a.to_string()).collect(),
        auto_links: addresses
            .iter()
            .flat_map(|a| {
                [LinkDirection::In, LinkDirection::Out].map(|direction| AutoLink {
                    name: format!("{a}.{direction}"),
                    address: a.to_string(),
                    direction,
                    container_id: Some("broker-0".to_string()),
                    oper_status: "active".to_string(),
                })
            })
            .collect(),
        ..Default::default()
    }
}

#[tokio::test]
async fn queue_on_configured_broker_is_ready() {
    let schema = schema();
    let resolver = AddressResolver::new(&schema, "standard").unwrap();
    let brokers = FakeBrokers {
        addresses: btreemap! { "c1".to_string() => btreeset! { "q1".to_string() } },
        queues: btreemap! { "c1".to_string() => btreeset! { "q1".to_string() } },
    };
    let clusters = FakeClusters {
        ready: btreeset! { "c1".to_string() },
        ..Default::default()
    };
    let mut collector = BrokerStatusCollector::new(&brokers, &clusters);

    let mut q1 = address("q1", AddressType::Queue, "pooled-queue");
    q1.status_mut().broker_statuses = vec![BrokerStatus::new("c1", "c1")];
    let routers = vec![router("r1", &["q1"]), router("r2", &["q1"])];

    let ok = check_address_statuses(vec![&mut q1], &resolver, &routers, &mut collector).await;

    assert!(q1.is_ready(), "{:?}", q1.status().unwrap().messages);
    assert_eq!(q1.status().unwrap().messages, Vec::<String>::new());
    // cluster + 2x(address + 2 autolinks) + address/queue + active autolinks
    assert_eq!(ok, btreemap! { "space.q1".to_string() => 1 + 6 + 2 + 1 });
}

#[tokio::test]
async fn unavailable_cluster_is_reported_on_every_address() {
    let schema = schema();
    let resolver = AddressResolver::new(&schema, "standard").unwrap();
    let brokers = FakeBrokers::default();
    let clusters = FakeClusters::default();
    let mut collector = BrokerStatusCollector::new(&brokers, &clusters);

    let mut q1 = address("q1", AddressType::Queue, "pooled-queue");
    q1.status_mut().broker_statuses = vec![BrokerStatus::new("c1", "c1")];
    let mut q2 = address("q2", AddressType::Queue, "pooled-queue");
    q2.status_mut().broker_statuses = vec![BrokerStatus::new("c1", "c1")];
    let routers = vec![router("r1", &["q1", "q2"])];

    let ok = check_address_statuses(vec![&mut q1, &mut q2], &resolver, &routers, &mut collector).await;

    for addr in [&q1, &q2] {
        assert!(!addr.is_ready());
        let messages = &addr.status().unwrap().messages;
        assert!(messages.contains(&"Cluster c1 is unavailable".to_string()));
        assert!(messages.contains(&format!(
            "Address {} is not configured on broker c1",
            addr.spec.address
        )));
    }
    assert_eq!(ok["space.q1"], 3 + 1);
    assert_eq!(
        *clusters.readiness_checks.lock(),
        1,
        "readiness is checked once per pass"
    );
}

#[tokio::test]
async fn anycast_checks_router_addresses_only() {
    let schema = schema();
    let resolver = AddressResolver::new(&schema, "standard").unwrap();
    let brokers = FakeBrokers::default();
    let clusters = FakeClusters::default();
    let mut collector = BrokerStatusCollector::new(&brokers, &clusters);

    let mut a1 = address("a1", AddressType::Anycast, "standard-anycast");
    let routers = vec![router("r1", &["a1"]), router("r2", &[])];

    let ok = check_address_statuses(vec![&mut a1], &resolver, &routers, &mut collector).await;

    assert_eq!(ok["space.a1"], 1);
    assert!(!a1.is_ready());
    assert_eq!(
        a1.status().unwrap().messages,
        vec!["Address a1 not found on r2".to_string()]
    );
}

#[tokio::test]
async fn sharded_topic_requires_router_connections() {
    let schema = schema();
    let resolver = AddressResolver::new(&schema, "standard").unwrap();
    let brokers = FakeBrokers::default();
    let clusters = FakeClusters {
        ready: btreeset! { "broker-sharded-t1".to_string() },
        ..Default::default()
    };
    let mut collector = BrokerStatusCollector::new(&brokers, &clusters);

    let mut t1 = address("t1", AddressType::Topic, "sharded-topic");
    t1.status_mut().broker_statuses = vec![BrokerStatus::new(
        "broker-sharded-t1",
        "broker-sharded-t1",
    )];
    let routers = vec![RouterStatus {
        router_id: "r1".to_string(),
        ..Default::default()
    }];

    check_address_statuses(vec![&mut t1], &resolver, &routers, &mut collector).await;

    let messages = &t1.status().unwrap().messages;
    assert_eq!(
        messages,
        &vec![
            "Address t1 is missing linkRoutes on r1".to_string(),
            "Address t1 is missing connection from router to broker broker-sharded-t1"
                .to_string(),
        ]
    );
}

#[tokio::test]
async fn forwarder_without_link_is_not_ready() {
    let schema = schema();
    let resolver = AddressResolver::new(&schema, "standard").unwrap();
    let brokers = FakeBrokers::default();
    let clusters = FakeClusters::default();
    let mut collector = BrokerStatusCollector::new(&brokers, &clusters);

    let mut q1 = address("q1", AddressType::Queue, "pooled-queue");
    q1.spec.forwarders = vec![
        ForwarderSpec {
            name: "f1".to_string(),
            remote_address: "remote/q1".to_string(),
            direction: ForwarderDirection::Out,
        },
        ForwarderSpec {
            name: "f2".to_string(),
            remote_address: "remote/q2".to_string(),
            direction: ForwarderDirection::In,
        },
    ];
    q1.status_mut().forwarders = vec![
        ForwarderStatus {
            name: "f1".to_string(),
            ready: true,
            messages: vec![],
        },
        ForwarderStatus {
            name: "f2".to_string(),
            ready: true,
            messages: vec![],
        },
    ];
    let mut r1 = router("r1", &["q1"]);
    r1.links = vec![RouterLink {
        name: "q1.f1".to_string(),
        direction: LinkDirection::Out,
        oper_status: "up".to_string(),
        undelivered: 0,
        unsettled: 0,
    }];

    check_address_statuses(vec![&mut q1], &resolver, &[r1], &mut collector).await;

    let forwarders = &q1.status().unwrap().forwarders;
    assert!(forwarders[0].ready);
    assert!(!forwarders[1].ready);
    assert_eq!(
        forwarders[1].messages,
        vec!["Unable to find link for forwarder 'f2'".to_string()]
    );
}

#[test]
fn ttl_is_narrowed_by_address() {
    let mut plan = plan(AddressType::Queue, 0.1);
    plan.message_ttl = Some(MessageTtl {
        minimum: Some(100),
        maximum: Some(1000),
    });
    let mut spec = address("q1", AddressType::Queue, "pooled-queue").spec;

    assert_eq!(resolve_message_ttl(&plan, &spec), plan.message_ttl.clone());

    spec.message_ttl = Some(MessageTtl {
        minimum: Some(50),
        maximum: Some(500),
    });
    assert_eq!(
        resolve_message_ttl(&plan, &spec),
        Some(MessageTtl {
            minimum: Some(100),
            maximum: Some(500),
        })
    );

    spec.message_ttl = Some(MessageTtl {
        minimum: Some(0),
        maximum: Some(2000),
    });
    assert_eq!(resolve_message_ttl(&plan, &spec), plan.message_ttl.clone());
}

#[test]
fn inverted_ttl_is_ignored() {
    let mut plan = plan(AddressType::Queue, 0.1);
    plan.message_ttl = Some(MessageTtl {
        minimum: Some(1000),
        maximum: Some(1000),
    });
    let spec = address("q1", AddressType::Queue, "pooled-queue").spec;
    assert_eq!(resolve_message_ttl(&plan, &spec), None);
}

#[test]
fn redelivery_fields_override_plan() {
    let mut plan = plan(AddressType::Queue, 0.1);
    let mut spec = address("q1", AddressType::Queue, "pooled-queue").spec;
    assert_eq!(resolve_message_redelivery(&plan, &spec), None);

    plan.message_redelivery = Some(MessageRedelivery {
        maximum_delivery_attempts: Some(5),
        redelivery_delay: Some(1000),
        ..Default::default()
    });
    spec.message_redelivery = Some(MessageRedelivery {
        maximum_delivery_attempts: Some(10),
        ..Default::default()
    });
    assert_eq!(
        resolve_message_redelivery(&plan, &spec),
        Some(MessageRedelivery {
            maximum_delivery_attempts: Some(10),
            redelivery_delay: Some(1000),
            ..Default::default()
        })
    );
}

#[tokio::test]
async fn router_cache_publishes_reachable_routers() {
    let routers = Arc::new(FakeRouters {
        statuses: vec![router("r1", &["q1"])],
        ..Default::default()
    });
    let metrics = RouterStatusMetrics::default();
    let cache = RouterStatusCache::new(routers.clone(), time::Duration::from_secs(30), metrics.clone());
    assert!(cache.latest().is_empty());

    cache.set_check_router_links(true);
    cache.poll().await;

    let latest = cache.latest();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].router_id, "r1");
    assert_eq!(metrics.failures(), 1, "the broken router is counted");
    assert_eq!(*routers.include_links.lock(), vec![true, true]);
}

#[tokio::test(start_paused = true)]
async fn router_cache_polls_on_wakeup() {
    let routers = Arc::new(FakeRouters {
        statuses: vec![router("r1", &["q1"])],
        ..Default::default()
    });
    let cache = RouterStatusCache::new(
        routers.clone(),
        time::Duration::from_secs(3600),
        RouterStatusMetrics::default(),
    );
    let mut rx = cache.subscribe();
    let task = tokio::spawn(cache.clone().run());

    // The initial round is made by whoever starts the cache.
    tokio::task::yield_now().await;
    assert!(routers.include_links.lock().is_empty());

    cache.wakeup();
    rx.changed().await.unwrap();
    assert_eq!(routers.include_links.lock().len(), 2, "one round of two routers");

    time::advance(time::Duration::from_secs(3600)).await;
    rx.changed().await.unwrap();
    assert_eq!(routers.include_links.lock().len(), 4);
    task.abort();
}
