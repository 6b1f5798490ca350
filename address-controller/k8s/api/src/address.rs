use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Describes a messaging endpoint within an address space.
///
/// The resource name is `<address-space>.<suffix>`; the logical address
/// string lives in `spec.address` and is what clients connect to.
#[derive(Clone, Debug, PartialEq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "enmasse.io",
    version = "v1beta1",
    kind = "Address",
    status = "AddressStatus",
    schema = "disabled",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AddressSpec {
    pub address: String,
    #[serde(rename = "type")]
    pub address_type: AddressType,
    pub plan: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadletter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forwarders: Vec<ForwarderSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_ttl: Option<MessageTtl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_redelivery: Option<MessageRedelivery>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    Anycast,
    Multicast,
    Queue,
    Topic,
    Subscription,
    Deadletter,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwarderSpec {
    pub name: String,
    pub remote_address: String,
    pub direction: ForwarderDirection,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwarderDirection {
    In,
    Out,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageTtl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRedelivery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_delivery_attempts: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redelivery_delay: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redelivery_delay_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_delivery_delay: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub broker_statuses: Vec<BrokerStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forwarders: Vec<ForwarderStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_status: Option<AddressPlanStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_ttl: Option<MessageTtl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_redelivery: Option<MessageRedelivery>,
    /// The spec that was last granted by admission control.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_spec: Option<AddressSpec>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum Phase {
    #[default]
    Pending,
    Configuring,
    Active,
    Terminating,
    Failed,
}

/// Placement of an address on one broker of a cluster.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerStatus {
    pub cluster_id: String,
    pub container_id: String,
    #[serde(default)]
    pub state: BrokerState,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum BrokerState {
    #[default]
    Active,
    Migrating,
    Draining,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwarderStatus {
    pub name: String,
    #[serde(default)]
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

/// The plan granted to an address, including the resources it was admitted with.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressPlanStatus {
    pub name: String,
    #[serde(default)]
    pub resources: std::collections::BTreeMap<String, f64>,
}

// === impl Address ===

impl Address {
    pub fn status(&self) -> Option<&AddressStatus> {
        self.status.as_ref()
    }

    /// Returns the status, initializing an empty one if necessary.
    pub fn status_mut(&mut self) -> &mut AddressStatus {
        self.status.get_or_insert_with(Default::default)
    }

    pub fn phase(&self) -> Phase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    pub fn is_ready(&self) -> bool {
        self.status.as_ref().map(|s| s.ready).unwrap_or(false)
    }

    pub fn broker_statuses(&self) -> &[BrokerStatus] {
        self.status
            .as_ref()
            .map(|s| s.broker_statuses.as_slice())
            .unwrap_or_default()
    }

    pub fn has_broker_statuses(&self) -> bool {
        !self.broker_statuses().is_empty()
    }

    /// Marks the address as not ready and records a diagnostic.
    pub fn fail(&mut self, message: impl Into<String>) {
        let status = self.status_mut();
        status.ready = false;
        status.messages.push(message.into());
    }
}

// === impl AddressType ===

impl AddressType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anycast => "anycast",
            Self::Multicast => "multicast",
            Self::Queue => "queue",
            Self::Topic => "topic",
            Self::Subscription => "subscription",
            Self::Deadletter => "deadletter",
        }
    }

    /// Address types that are stored on brokers rather than routed.
    pub fn is_brokered(&self) -> bool {
        matches!(
            self,
            Self::Queue | Self::Topic | Self::Subscription | Self::Deadletter
        )
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl Phase ===

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Configuring => "Configuring",
            Self::Active => "Active",
            Self::Terminating => "Terminating",
            Self::Failed => "Failed",
        }
    }

    pub const ALL: [Phase; 5] = [
        Self::Pending,
        Self::Configuring,
        Self::Active,
        Self::Terminating,
        Self::Failed,
    ];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ForwarderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::In => f.write_str("in"),
            Self::Out => f.write_str("out"),
        }
    }
}

// === impl BrokerStatus ===

impl BrokerStatus {
    pub fn new(cluster_id: impl Into<String>, container_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            container_id: container_id.into(),
            state: BrokerState::Active,
        }
    }

    pub fn with_state(mut self, state: BrokerState) -> Self {
        self.state = state;
        self
    }
}
