//! Operator-managed reference data: plans and infrastructure configuration.

use crate::address::{AddressType, MessageRedelivery, MessageTtl};
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-address resource costs, e.g. `{"broker": 0.2, "router": 0.01}`.
#[derive(Clone, Debug, PartialEq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "admin.enmasse.io",
    version = "v1beta2",
    kind = "AddressPlan",
    schema = "disabled",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AddressPlanSpec {
    pub address_type: AddressType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    #[serde(default)]
    pub resources: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_ttl: Option<MessageTtl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_redelivery: Option<MessageRedelivery>,
}

/// Limits on the aggregate resources of all addresses in an address space.
#[derive(Clone, Debug, PartialEq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "admin.enmasse.io",
    version = "v1beta2",
    kind = "AddressSpacePlan",
    schema = "disabled",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AddressSpacePlanSpec {
    pub address_space_type: String,
    pub infra_config_ref: String,
    #[serde(default)]
    pub resource_limits: BTreeMap<String, f64>,
    #[serde(default)]
    pub address_plans: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "admin.enmasse.io",
    version = "v1beta1",
    kind = "StandardInfraConfig",
    schema = "disabled",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct StandardInfraConfigSpec {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub broker: BrokerInfraSpec,
    #[serde(default)]
    pub router: RouterInfraSpec,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerInfraSpec {
    #[serde(default)]
    pub resources: BrokerResources,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_full_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_persistent_volume_claim: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterInfraSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_capacity: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl BrokerInfraSpec {
    pub fn allows_volume_resize(&self) -> bool {
        self.update_persistent_volume_claim.unwrap_or(false)
    }
}
