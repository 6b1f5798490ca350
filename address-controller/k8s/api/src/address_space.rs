use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// A tenant's messaging namespace. Only the parts consulted while
/// reconciling addresses are modeled.
#[derive(Clone, Debug, PartialEq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "enmasse.io",
    version = "v1beta1",
    kind = "AddressSpace",
    schema = "disabled",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AddressSpaceSpec {
    #[serde(rename = "type")]
    pub space_type: String,
    pub plan: String,
    /// Remote endpoints that forwarders may bridge to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connectors: Vec<ConnectorSpec>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoint_hosts: Vec<ConnectorEndpoint>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorEndpoint {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl AddressSpace {
    pub fn connectors(&self) -> &[ConnectorSpec] {
        &self.spec.connectors
    }
}
