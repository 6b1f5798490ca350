#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use address_controller_core as core;
pub use address_controller_k8s_api as k8s;
pub use address_controller_provision as provision;
pub use address_controller_reconcile as reconcile;
pub use address_controller_status as status;

mod args;
mod broker;
mod clusters;
mod events;
mod index;
mod lease;
mod management;
mod router;
mod schema;
mod store;

#[cfg(test)]
mod tests;

pub use self::args::Args;
