use crate::k8s::{Deployment, ResourceExt, Service, StandardInfraConfigSpec, StatefulSet};
use anyhow::Result;

/// Pooled clusters host many addresses that each use a fraction of a broker.
pub const POOLED_PREFIX: &str = "broker-pooled";

/// Sharded clusters are dedicated to one address.
pub const SHARDED_PREFIX: &str = "broker-sharded";

/// A Kubernetes object belonging to a broker cluster.
#[derive(Clone, Debug, PartialEq)]
pub enum ClusterResource {
    StatefulSet(Box<StatefulSet>),
    Deployment(Box<Deployment>),
    Service(Box<Service>),
}

/// A broker cluster as observed in the infrastructure.
#[derive(Clone, Debug, PartialEq)]
pub struct BrokerCluster {
    pub cluster_id: String,
    pub replicas: i32,
    pub ready_replicas: i32,

    /// The infra config this cluster was last generated from, if recorded.
    pub infra_config: Option<StandardInfraConfigSpec>,
    pub resources: Vec<ClusterResource>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RouterCluster {
    pub name: String,
    pub replicas: i32,
    pub infra_config: Option<StandardInfraConfigSpec>,
}

/// Failure to apply one resource of a cluster.
#[derive(Debug, thiserror::Error)]
#[error("failed to apply {kind} {name}: {message}")]
pub struct ApplyError {
    pub kind: &'static str,
    pub name: String,
    pub message: String,

    /// The resource that was rejected.
    pub resource: Option<ClusterResource>,
}

#[async_trait::async_trait]
pub trait ClusterManager: Send + Sync {
    async fn list_clusters(&self) -> Result<Vec<BrokerCluster>>;

    async fn router_cluster(&self) -> Result<RouterCluster>;

    async fn scale_router(&self, replicas: i32) -> Result<()>;

    /// Creates or updates the given resources. Persistent volume claims are
    /// only resized when `allow_volume_resize` is set.
    async fn apply(
        &self,
        resources: &[ClusterResource],
        allow_volume_resize: bool,
    ) -> std::result::Result<(), ApplyError>;

    async fn delete(&self, cluster: &BrokerCluster) -> Result<()>;

    async fn is_cluster_ready(&self, cluster_id: &str) -> Result<bool>;
}

/// Renders the resources of a broker cluster from an infra config.
pub trait BrokerSetGenerator: Send + Sync {
    fn generate(
        &self,
        cluster_id: &str,
        replicas: i32,
        infra: &StandardInfraConfigSpec,
    ) -> Result<Vec<ClusterResource>>;
}

// === impl ClusterResource ===

impl ClusterResource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StatefulSet(_) => "StatefulSet",
            Self::Deployment(_) => "Deployment",
            Self::Service(_) => "Service",
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::StatefulSet(r) => r.name_any(),
            Self::Deployment(r) => r.name_any(),
            Self::Service(r) => r.name_any(),
        }
    }
}

// === impl BrokerCluster ===

impl BrokerCluster {
    pub fn is_pooled(&self) -> bool {
        self.cluster_id.starts_with(POOLED_PREFIX)
    }

    pub fn is_sharded(&self) -> bool {
        self.cluster_id.starts_with(SHARDED_PREFIX)
    }
}

// === impl ApplyError ===

impl ApplyError {
    pub fn new(resource: &ClusterResource, message: impl ToString) -> Self {
        Self {
            kind: resource.kind(),
            name: resource.name(),
            message: message.to_string(),
            resource: Some(resource.clone()),
        }
    }
}
