//! Consistency checks of an address against router statuses.
//!
//! Each check returns the number of satisfied conditions and records a
//! diagnostic on the address for every unsatisfied one.

use address_controller_core::{
    k8s::Address,
    router::{LinkDirection, RouterStatus, OPER_STATUS_ACTIVE, OPER_STATUS_UP},
};
use std::collections::BTreeSet;

/// The router knows the address.
pub fn check_address(router: &RouterStatus, address: &mut Address) -> usize {
    let name = &address.spec.address;
    if router.addresses.iter().any(|a| a == name) {
        return 1;
    }
    let message = format!("Address {name} not found on {}", router.router_id);
    address.fail(message);
    0
}

/// The router has at least `expected` auto-links for the address.
pub fn check_auto_links(router: &RouterStatus, address: &mut Address, expected: usize) -> usize {
    let name = &address.spec.address;
    let found = router
        .auto_links
        .iter()
        .filter(|link| link.address == *name)
        .count();
    if found < expected {
        let message = format!(
            "Address {name} is missing autoLinks on {} (found {found} of {expected})",
            router.router_id
        );
        address.fail(message);
    }
    found.min(expected)
}

/// Across all routers, the address has an active auto-link for each of the
/// `expected` directions.
pub fn check_active_auto_link(
    address: &mut Address,
    routers: &[RouterStatus],
    expected: usize,
) -> usize {
    let name = &address.spec.address;
    let active = routers
        .iter()
        .flat_map(|r| r.auto_links.iter())
        .filter(|link| link.address == *name && link.oper_status == OPER_STATUS_ACTIVE)
        .map(|link| link.direction)
        .collect::<BTreeSet<_>>();
    if active.len() < expected {
        let message = format!(
            "Address {name} is missing active autoLink (active in = {}, active out = {})",
            active.contains(&LinkDirection::In),
            active.contains(&LinkDirection::Out),
        );
        address.fail(message);
        return 0;
    }
    1
}

/// The router has link routes in both directions for the address.
pub fn check_link_routes(router: &RouterStatus, address: &mut Address) -> usize {
    let name = &address.spec.address;
    let directions = router
        .link_routes
        .iter()
        .filter(|lr| lr.prefix == *name)
        .map(|lr| lr.direction)
        .collect::<BTreeSet<_>>();
    if directions.len() < 2 {
        let message = format!("Address {name} is missing linkRoutes on {}", router.router_id);
        address.fail(message);
    }
    directions.len()
}

/// Some router has an active link route for the address.
pub fn check_active_link_route(address: &mut Address, routers: &[RouterStatus]) -> usize {
    let name = &address.spec.address;
    let active = routers
        .iter()
        .flat_map(|r| r.link_routes.iter())
        .any(|lr| lr.prefix == *name && lr.oper_status == OPER_STATUS_ACTIVE);
    if !active {
        let message = format!("Address {name} is missing active linkRoute");
        address.fail(message);
        return 0;
    }
    1
}

/// Some router holds an open connection to every broker of the address.
pub fn check_connection(address: &mut Address, routers: &[RouterStatus]) -> usize {
    let containers = address
        .broker_statuses()
        .iter()
        .map(|bs| bs.container_id.clone())
        .collect::<Vec<_>>();
    let mut ok = 0;
    for container in containers {
        let connected = routers
            .iter()
            .flat_map(|r| r.connections.iter())
            .any(|c| c.container == container && c.opened);
        if connected {
            ok += 1;
        } else {
            let message = format!(
                "Address {} is missing connection from router to broker {container}",
                address.spec.address
            );
            address.fail(message);
        }
    }
    ok
}

/// Every forwarder of the address has an operational link on some router.
/// Updates the readiness of each forwarder status accordingly.
pub fn check_forwarder_links(address: &mut Address, routers: &[RouterStatus]) -> usize {
    let expected = address
        .spec
        .forwarders
        .iter()
        .map(|f| (f.name.clone(), forwarder_link_name(&address.spec.address, &f.name)))
        .collect::<Vec<_>>();

    let mut ok = 0;
    for (forwarder, link_name) in expected {
        let up = routers
            .iter()
            .flat_map(|r| r.links.iter())
            .any(|link| link.name == link_name && link.oper_status == OPER_STATUS_UP);
        if up {
            ok += 1;
            continue;
        }

        let message = format!("Unable to find link for forwarder '{forwarder}'");
        let status = address.status_mut();
        status.ready = false;
        if let Some(fs) = status.forwarders.iter_mut().find(|fs| fs.name == forwarder) {
            fs.ready = false;
            fs.messages.push(message.clone());
        }
        status.messages.push(message);
    }
    ok
}

/// Name of the router link created for a forwarder.
pub fn forwarder_link_name(address: &str, forwarder: &str) -> String {
    format!("{address}.{forwarder}")
}
