use address_controller_core::{BrokerManagement, ClusterManager};
use std::collections::{BTreeMap, BTreeSet};

/// What one cluster's brokers report during a reconciliation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterView {
    pub ready: bool,
    pub addresses: BTreeSet<String>,
    pub queues: BTreeSet<String>,
}

/// Queries brokers on demand, remembering each cluster's answer for the rest
/// of the pass so that a cluster is queried at most once.
pub struct BrokerStatusCollector<'a> {
    brokers: &'a dyn BrokerManagement,
    clusters: &'a dyn ClusterManager,
    views: BTreeMap<String, ClusterView>,
}

impl<'a> BrokerStatusCollector<'a> {
    pub fn new(brokers: &'a dyn BrokerManagement, clusters: &'a dyn ClusterManager) -> Self {
        Self {
            brokers,
            clusters,
            views: BTreeMap::new(),
        }
    }

    /// Returns the cluster's view. An unreachable cluster is reported as not
    /// ready; failures to list names leave the corresponding set empty.
    pub async fn cluster(&mut self, cluster_id: &str) -> &ClusterView {
        if !self.views.contains_key(cluster_id) {
            let view = Self::collect(self.brokers, self.clusters, cluster_id).await;
            self.views.insert(cluster_id.to_string(), view);
        }
        self.views.entry(cluster_id.to_string()).or_default()
    }

    async fn collect(
        brokers: &dyn BrokerManagement,
        clusters: &dyn ClusterManager,
        cluster_id: &str,
    ) -> ClusterView {
        let ready = match clusters.is_cluster_ready(cluster_id).await {
            Ok(ready) => ready,
            Err(error) => {
                tracing::warn!(cluster = %cluster_id, %error, "Failed to check cluster readiness");
                false
            }
        };
        if !ready {
            return ClusterView::default();
        }

        let addresses = brokers
            .address_names(cluster_id)
            .await
            .unwrap_or_else(|error| {
                tracing::warn!(cluster = %cluster_id, %error, "Error retrieving address names");
                BTreeSet::new()
            });
        let queues = brokers.queue_names(cluster_id).await.unwrap_or_else(|error| {
            tracing::warn!(cluster = %cluster_id, %error, "Error retrieving queue names");
            BTreeSet::new()
        });
        ClusterView {
            ready,
            addresses,
            queues,
        }
    }
}
