use crate::{
    k8s::{Address, AddressPlanSpec, AddressSpacePlanSpec, AddressSpec, AddressType},
    quantity,
    resolver::{self, AddressResolver},
    Schema,
};
use maplit::btreemap;
use pretty_assertions::assert_eq;

fn schema() -> Schema {
    Schema {
        address_space_plans: btreemap! {
            "standard-small".to_string() => AddressSpacePlanSpec {
                address_space_type: "standard".to_string(),
                infra_config_ref: "default".to_string(),
                resource_limits: btreemap! { "broker".to_string() => 2.0 },
                address_plans: vec!["small-queue".to_string(), "small-topic".to_string()],
            },
        },
        address_plans: btreemap! {
            "small-queue".to_string() => AddressPlanSpec {
                address_type: AddressType::Queue,
                short_description: None,
                resources: btreemap! { "broker".to_string() => 0.2, "router".to_string() => 0.01 },
                message_ttl: None,
                message_redelivery: None,
            },
            "small-topic".to_string() => AddressPlanSpec {
                address_type: AddressType::Topic,
                short_description: None,
                resources: btreemap! { "broker".to_string() => 0.1 },
                message_ttl: None,
                message_redelivery: None,
            },
            "large-queue".to_string() => AddressPlanSpec {
                address_type: AddressType::Queue,
                short_description: None,
                resources: btreemap! { "broker".to_string() => 1.0 },
                message_ttl: None,
                message_redelivery: None,
            },
        },
        infra_configs: Default::default(),
    }
}

fn address(address_type: AddressType, plan: &str) -> Address {
    Address::new(
        "space.a1",
        AddressSpec {
            address: "a1".to_string(),
            address_type,
            plan: plan.to_string(),
            topic: None,
            deadletter: None,
            expiry: None,
            forwarders: vec![],
            message_ttl: None,
            message_redelivery: None,
        },
    )
}

#[test]
fn validates_plan_and_type() {
    let schema = schema();
    let resolver = AddressResolver::new(&schema, "standard-small").unwrap();

    assert!(resolver
        .validate(&address(AddressType::Queue, "small-queue"))
        .is_ok());
    assert_eq!(
        resolver.validate(&address(AddressType::Queue, "missing")),
        Err("Unknown address plan 'missing'".to_string()),
    );
    assert_eq!(
        resolver.validate(&address(AddressType::Queue, "large-queue")),
        Err(
            "Address plan 'large-queue' is not offered by address space plan 'standard-small'"
                .to_string()
        ),
    );
    assert_eq!(
        resolver.validate(&address(AddressType::Queue, "small-topic")),
        Err("Address type 'queue' does not match type 'topic' of address plan 'small-topic'"
            .to_string()),
    );
}

#[test]
fn plan_changes_are_detected_against_granted_status() {
    let schema = schema();
    let resolver = AddressResolver::new(&schema, "standard-small").unwrap();

    let mut addr = address(AddressType::Queue, "small-queue");
    assert!(resolver.plan_changed(&addr), "never granted");

    addr.status_mut().plan_status = resolver.desired_plan_status(&addr);
    assert!(!resolver.plan_changed(&addr));

    addr.spec.plan = "small-topic".to_string();
    assert!(resolver.plan_changed(&addr));
}

#[test]
fn pooled_below_one_broker() {
    assert!(resolver::is_pooled(&btreemap! { "broker".to_string() => 0.5 }));
    assert!(resolver::is_pooled(&btreemap! {}));
    assert!(!resolver::is_pooled(&btreemap! { "broker".to_string() => 1.0 }));
}

#[test]
fn parses_quantities() {
    assert_eq!(quantity::parse("2Gi"), Some(2.0 * 1024.0 * 1024.0 * 1024.0));
    assert_eq!(quantity::parse("500M"), Some(500e6));
    assert_eq!(quantity::parse("100"), Some(100.0));
    assert_eq!(quantity::parse("1.5Ki"), Some(1536.0));
    assert_eq!(quantity::parse("abc"), None);
    assert_eq!(quantity::parse("2Qi"), None);
}
