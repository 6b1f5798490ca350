#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod broker;
pub mod cluster;
pub mod events;
pub mod quantity;
pub mod resolver;
pub mod router;
pub mod schema;
pub mod store;

#[cfg(test)]
mod tests;

pub use self::{
    broker::BrokerManagement,
    cluster::{ApplyError, BrokerCluster, BrokerSetGenerator, ClusterManager, ClusterResource, RouterCluster},
    events::{Event, EventSink, EventType, LogEventSink, ObjectKind, Reason},
    resolver::AddressResolver,
    router::{RouterEndpoint, RouterManagement, RouterStatus},
    schema::{Schema, SchemaProvider, SchemaPublisher},
    store::{AddressStore, Replace},
};
pub use address_controller_k8s_api as k8s;
