//! Well-known labels and annotations on infrastructure managed by the controller.

use std::collections::BTreeMap;

pub const APP: &str = "app";
pub const APP_VALUE: &str = "enmasse";
pub const INFRA_UUID: &str = "infraUuid";
pub const INFRA_TYPE: &str = "infraType";
pub const ROLE: &str = "role";
pub const ROLE_BROKER: &str = "broker";
pub const ROLE_ROUTER: &str = "router";
pub const CLUSTER_ID: &str = "enmasse.io/cluster-id";

/// JSON of the infra config a cluster was last generated from.
pub const APPLIED_INFRA_CONFIG: &str = "enmasse.io/applied-infra-config";

/// Labels identifying the resources of one broker cluster.
pub fn broker(infra_uuid: &str, cluster_id: &str) -> BTreeMap<String, String> {
    [
        (APP, APP_VALUE),
        (INFRA_TYPE, "standard"),
        (INFRA_UUID, infra_uuid),
        (ROLE, ROLE_BROKER),
        (CLUSTER_ID, cluster_id),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Label selector matching every broker cluster of an infrastructure.
pub fn broker_selector(infra_uuid: &str) -> String {
    format!("{INFRA_UUID}={infra_uuid},{ROLE}={ROLE_BROKER}")
}

pub fn router_selector(infra_uuid: &str) -> String {
    format!("{INFRA_UUID}={infra_uuid},{ROLE}={ROLE_ROUTER}")
}
