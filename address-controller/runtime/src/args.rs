use crate::{
    broker::KubeBrokerManagement,
    clusters::KubeClusterManager,
    core::{EventSink, LogEventSink, SchemaProvider},
    events::{EventNamespaces, KubeEventSink},
    index::AddressIndex,
    k8s::{self, watcher},
    lease,
    management::ManagementClient,
    provision::ManifestBrokerSetGenerator,
    reconcile::{AddressController, Collaborators, Config, ControllerMetrics},
    router::KubeRouterManagement,
    schema::SchemaIndex,
    status::{RouterStatusCache, RouterStatusMetrics},
    store::KubeAddressStore,
};
use anyhow::{bail, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::{sync::watch, time::Duration};
use tracing::{info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "address-controller",
    about = "Reconciles the addresses of a standard address space"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "address_controller=info,warn",
        env = "ADDRESS_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Name of the address space whose addresses are reconciled.
    #[clap(long, env = "ADDRESS_SPACE")]
    address_space: String,

    /// Namespace of the address space and its addresses.
    #[clap(long, env = "ADDRESS_SPACE_NAMESPACE")]
    address_space_namespace: String,

    #[clap(long, env = "ADDRESS_SPACE_PLAN")]
    address_space_plan: String,

    /// Namespace of the brokers, routers, plans and infra configs.
    #[clap(long, env = "NAMESPACE")]
    infra_namespace: String,

    #[clap(long, env = "INFRA_UUID")]
    infra_uuid: String,

    /// Infra configs of other versions are not rolled out.
    #[clap(long, env = "VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    version: String,

    #[clap(long, env = "BROKER_IMAGE")]
    broker_image: String,

    #[clap(long, env = "RESYNC_INTERVAL_SECS", default_value = "30")]
    resync_interval_secs: u64,

    #[clap(long, env = "STATUS_CHECK_INTERVAL_SECS", default_value = "30")]
    status_check_interval_secs: u64,

    #[clap(long, default_value = "8161")]
    broker_management_port: u16,

    #[clap(long, default_value = "8080")]
    router_management_port: u16,

    #[clap(long, default_value = "10000")]
    management_timeout_ms: u64,

    /// Publishes controller events as Kubernetes events instead of only
    /// logging them.
    #[clap(long, env = "ENABLE_EVENT_LOGGER")]
    enable_event_logger: bool,

    #[clap(long, env = "HOSTNAME")]
    hostname: String,

    /// The controller's deployment, used as the owner of its lease.
    #[clap(long, env = "CONTROLLER_DEPLOYMENT_NAME")]
    controller_deployment_name: Option<String>,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            address_space,
            address_space_namespace,
            address_space_plan,
            infra_namespace,
            infra_uuid,
            version,
            broker_image,
            resync_interval_secs,
            status_check_interval_secs,
            broker_management_port,
            router_management_port,
            management_timeout_ms,
            enable_event_logger,
            hostname,
            controller_deployment_name,
        } = self;

        let mut prom = <Registry>::default();
        let controller = prom.sub_registry_with_prefix("address_controller");
        let controller_metrics = ControllerMetrics::register(controller);
        let router_metrics = RouterStatusMetrics::register(controller);
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;
        let client = runtime.client();

        // Spawn resource watches.

        let (schema_tx, schema) = SchemaProvider::channel();
        let schema_index = SchemaIndex::shared(schema_tx);
        let space_plans = runtime.watch_namespaced::<k8s::AddressSpacePlan>(
            infra_namespace.clone(),
            watcher::Config::default(),
        );
        tokio::spawn(
            kubert::index::namespaced(schema_index.clone(), space_plans)
                .instrument(info_span!("addressspaceplans")),
        );
        let plans = runtime.watch_namespaced::<k8s::AddressPlan>(
            infra_namespace.clone(),
            watcher::Config::default(),
        );
        tokio::spawn(
            kubert::index::namespaced(schema_index.clone(), plans)
                .instrument(info_span!("addressplans")),
        );
        let infra_configs = runtime.watch_namespaced::<k8s::StandardInfraConfig>(
            infra_namespace.clone(),
            watcher::Config::default(),
        );
        tokio::spawn(
            kubert::index::namespaced(schema_index, infra_configs)
                .instrument(info_span!("standardinfraconfigs")),
        );

        let (batches_tx, batches) = watch::channel(None);
        let address_index = AddressIndex::shared(&address_space_namespace, batches_tx);
        let addresses = runtime.watch_namespaced::<k8s::Address>(
            address_space_namespace.clone(),
            watcher::Config::default(),
        );
        tokio::spawn(
            kubert::index::namespaced(address_index, addresses).instrument(info_span!("addresses")),
        );

        // Build the controller's collaborators.

        let management = ManagementClient::new(Duration::from_millis(management_timeout_ms));
        let events: Arc<dyn EventSink> = if enable_event_logger {
            Arc::new(KubeEventSink::spawn(
                client.clone(),
                EventNamespaces {
                    addresses: address_space_namespace.clone(),
                    infra: infra_namespace.clone(),
                },
                "standard-controller",
                hostname.clone(),
            ))
        } else {
            Arc::new(LogEventSink)
        };
        let collaborators = Collaborators {
            store: Arc::new(KubeAddressStore::new(
                client.clone(),
                &address_space_namespace,
                &address_space,
            )),
            clusters: Arc::new(KubeClusterManager::new(
                client.clone(),
                &infra_namespace,
                &infra_uuid,
            )),
            brokers: Arc::new(KubeBrokerManagement::new(
                client.clone(),
                &infra_namespace,
                management.clone(),
                broker_management_port,
            )),
            generator: Arc::new(ManifestBrokerSetGenerator::new(
                &infra_uuid,
                &infra_namespace,
                broker_image,
            )),
            events,
        };
        let routers = RouterStatusCache::new(
            Arc::new(KubeRouterManagement::new(
                client,
                &infra_namespace,
                &infra_uuid,
                management,
                router_management_port,
            )),
            Duration::from_secs(status_check_interval_secs),
            router_metrics,
        );

        let lease_name = format!("standard-controller-{address_space}");
        let controller = Arc::new(AddressController::new(
            Config {
                address_space,
                address_space_plan,
                infra_uuid,
                version,
                resync_interval: Duration::from_secs(resync_interval_secs),
            },
            schema,
            collaborators,
            routers,
            controller_metrics,
        ));

        // Only the holder of the lease reconciles.
        let claims = lease::init(
            &runtime,
            &infra_namespace,
            &lease_name,
            controller_deployment_name.as_deref(),
            &hostname,
        )
        .await?;
        tokio::spawn(
            lease::lead(claims, hostname, controller, batches).instrument(info_span!("leader")),
        );

        // Block the main thread on the shutdown signal.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
