
use crate::k8s::{Address, AddressSpec, AddressType};

fn address(namespace: &str, name: &str) -> Address {
    let mut address = Address::new(
        name,
        AddressSpec {
            address: name.rsplit('.').next().unwrap_or(name).to_string(),
            address_type: AddressType::Queue,
            plan: "pooled-queue".to_string(),
            topic: None,
            deadletter: None,
            expiry: None,
            forwarders: vec![],
            message_ttl: None,
            message_redelivery: None,
        },
    );
    address.metadata.namespace = Some(namespace.to_string());
    address
}
