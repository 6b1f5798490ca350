use crate::{
    core::BrokerManagement,
    k8s::{self, api::core::v1::Pod, labels, Api, ListParams},
    management::ManagementClient,
};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const JOLOKIA_PATH: &str = "/console/jolokia";
const BROKER_MBEAN: &str = "org.apache.activemq.artemis:broker=*";

/// Queries brokers through the Jolokia endpoint of each broker pod.
pub(crate) struct KubeBrokerManagement {
    pods: Api<Pod>,
    client: ManagementClient,
    port: u16,
}

#[derive(Debug, Serialize)]
struct ReadRequest<'a> {
    #[serde(rename = "type")]
    type_: &'static str,
    mbean: &'a str,
    attribute: &'a str,
}

/// The response to a pattern read: attribute values keyed by MBean name.
#[derive(Debug, Deserialize)]
struct ReadResponse {
    status: u16,
    #[serde(default)]
    value: Option<BTreeMap<String, BTreeMap<String, serde_json::Value>>>,
    #[serde(default)]
    error: Option<String>,
}

// === impl KubeBrokerManagement ===

impl KubeBrokerManagement {
    pub(crate) fn new(
        client: k8s::Client,
        namespace: &str,
        management: ManagementClient,
        port: u16,
    ) -> Self {
        Self {
            pods: Api::namespaced(client, namespace),
            client: management,
            port,
        }
    }

    /// The management authorities of the pods of a cluster.
    async fn endpoints(&self, cluster_id: &str) -> Result<Vec<String>> {
        let params = ListParams::default().labels(&format!("{}={cluster_id}", labels::CLUSTER_ID));
        let pods = self.pods.list(&params).await?;
        let endpoints = pods
            .items
            .into_iter()
            .filter_map(|pod| pod.status?.pod_ip)
            .map(|ip| format!("{ip}:{}", self.port))
            .collect::<Vec<_>>();
        if endpoints.is_empty() {
            bail!("no broker pods found for cluster {cluster_id}");
        }
        Ok(endpoints)
    }

    /// Reads an attribute from every MBean matching `mbean` on every broker
    /// of the cluster.
    async fn read(
        &self,
        cluster_id: &str,
        mbean: &str,
        attribute: &str,
    ) -> Result<Vec<serde_json::Value>> {
        let req = ReadRequest {
            type_: "read",
            mbean,
            attribute,
        };
        let mut values = Vec::new();
        for endpoint in self.endpoints(cluster_id).await? {
            let rsp: ReadResponse = self.client.post(&endpoint, JOLOKIA_PATH, &req).await?;
            values.extend(attribute_values(rsp, attribute)?);
        }
        Ok(values)
    }

    async fn names(&self, cluster_id: &str, attribute: &str) -> Result<BTreeSet<String>> {
        let values = self.read(cluster_id, BROKER_MBEAN, attribute).await?;
        let mut names = BTreeSet::new();
        for value in values {
            names.extend(serde_json::from_value::<Vec<String>>(value)?);
        }
        Ok(names)
    }
}

#[async_trait::async_trait]
impl BrokerManagement for KubeBrokerManagement {
    async fn address_names(&self, cluster_id: &str) -> Result<BTreeSet<String>> {
        self.names(cluster_id, "AddressNames").await
    }

    async fn queue_names(&self, cluster_id: &str) -> Result<BTreeSet<String>> {
        self.names(cluster_id, "QueueNames").await
    }

    async fn queue_message_count(&self, queue: &str, cluster_id: &str) -> Result<u64> {
        let values = self
            .read(cluster_id, &queue_mbean(queue), "MessageCount")
            .await?;
        Ok(values.iter().filter_map(|v| v.as_u64()).sum())
    }
}

/// Matches the queues of an address on any broker.
fn queue_mbean(address: &str) -> String {
    format!(
        "org.apache.activemq.artemis:broker=*,component=addresses,address=\"{address}\",subcomponent=queues,*"
    )
}

fn attribute_values(rsp: ReadResponse, attribute: &str) -> Result<Vec<serde_json::Value>> {
    if rsp.status != 200 {
        bail!(
            "jolokia read failed with status {}: {}",
            rsp.status,
            rsp.error.unwrap_or_default()
        );
    }
    Ok(rsp
        .value
        .unwrap_or_default()
        .into_values()
        .filter_map(|mut attributes| attributes.remove(attribute))
        .collect())
}
