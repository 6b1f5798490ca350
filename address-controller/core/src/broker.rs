use anyhow::Result;
use std::collections::BTreeSet;

/// Queries the management interface of the brokers in a cluster.
#[async_trait::async_trait]
pub trait BrokerManagement: Send + Sync {
    async fn address_names(&self, cluster_id: &str) -> Result<BTreeSet<String>>;

    async fn queue_names(&self, cluster_id: &str) -> Result<BTreeSet<String>>;

    /// Total number of messages held for `queue` across the cluster's brokers.
    async fn queue_message_count(&self, queue: &str, cluster_id: &str) -> Result<u64>;
}
