#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod generator;
mod placement;
mod provisioner;
mod upgrade;
mod usage;


pub use self::{
    generator::ManifestBrokerSetGenerator,
    placement::{pooled_cluster_id, sharded_cluster_id},
    provisioner::AddressProvisioner,
    upgrade::{Upgrader, INVALID_INDEX_ERROR},
    usage::{UsageInfo, UsageMap, ALL_HOSTS},
};
