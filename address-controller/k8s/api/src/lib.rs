#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod address;
pub mod address_space;
pub mod admin;
pub mod labels;

pub use self::{
    address::{
        Address, AddressPlanStatus, AddressSpec, AddressStatus, AddressType, BrokerState,
        BrokerStatus, ForwarderDirection, ForwarderSpec, ForwarderStatus, MessageRedelivery,
        MessageTtl, Phase,
    },
    address_space::{AddressSpace, AddressSpaceSpec, ConnectorSpec},
    admin::{
        AddressPlan, AddressPlanSpec, AddressSpacePlan, AddressSpacePlanSpec, BrokerInfraSpec,
        BrokerResources, RouterInfraSpec, StandardInfraConfig, StandardInfraConfigSpec,
    },
};
pub use k8s_openapi::{
    api::{
        self,
        apps::v1::{Deployment, StatefulSet},
        core::v1::{Event, PersistentVolumeClaim, Service},
    },
    apimachinery::pkg::api::resource::Quantity,
};
pub use kube::{
    api::{Api, DeleteParams, ListParams, ObjectMeta, Patch, PatchParams, PostParams, ResourceExt},
    runtime::watcher,
    Client, Error, Resource,
};
