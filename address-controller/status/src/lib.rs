#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod aggregate;
mod broker;
pub mod checks;
mod router_cache;
mod settings;

#[cfg(test)]
mod tests;

pub use self::{
    aggregate::check_address_statuses,
    broker::{BrokerStatusCollector, ClusterView},
    router_cache::{RouterStatusCache, RouterStatusMetrics},
    settings::{resolve_message_redelivery, resolve_message_ttl},
};
