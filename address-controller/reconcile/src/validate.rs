use address_controller_core::{
    k8s::{Address, AddressSpace, AddressType, ForwarderDirection, Phase, ResourceExt},
    AddressResolver,
};
use std::collections::{BTreeMap, BTreeSet};

/// The outcome of validating a batch of addresses.
#[derive(Debug, Default)]
pub struct Admission {
    /// Addresses that take part in provisioning, in batch order.
    pub admitted: Vec<Address>,

    /// Addresses that failed validation or lost a duplicate conflict.
    pub rejected: Vec<Address>,

    /// Resource names of admitted addresses whose spec is invalid. They keep
    /// their brokers but get no new demand.
    pub held: BTreeSet<String>,
}

struct Candidate {
    index: usize,
    has_brokers: bool,
    pending: bool,
}

/// Validates every address of the batch and resolves duplicate logical
/// addresses, splitting the batch into admitted and rejected addresses.
///
/// Validation failures never abort: the address gets a message, loses its
/// `ready` flag and, unless it already holds brokers, returns to `Pending`.
/// Forwarder checks are skipped when the address space is unknown.
pub fn admit(
    batch: Vec<Address>,
    space: Option<&AddressSpace>,
    resolver: &AddressResolver<'_>,
) -> Admission {
    let mut batch = batch;
    let mut held = BTreeSet::new();
    let mut candidates = BTreeMap::<String, Vec<Candidate>>::new();

    for index in 0..batch.len() {
        let errors = if batch[index].phase() == Phase::Terminating {
            Vec::new()
        } else {
            validate(&batch[index], &batch, space, resolver)
        };

        let address = &mut batch[index];
        let has_brokers = address.has_broker_statuses();
        if !errors.is_empty() {
            tracing::debug!(address = %address.name_any(), ?errors, "Address is invalid");
            for error in errors {
                address.fail(error);
            }
            if !has_brokers {
                address.status_mut().phase = Phase::Pending;
                continue;
            }
            held.insert(address.name_any());
        }

        candidates
            .entry(address.spec.address.clone())
            .or_default()
            .push(Candidate {
                index,
                has_brokers,
                pending: address.phase() == Phase::Pending,
            });
    }

    let mut winners = BTreeSet::new();
    for (name, contenders) in candidates {
        let Some(winner) = contenders
            .iter()
            .min_by_key(|c| (!c.has_brokers, c.pending, c.index))
        else {
            continue;
        };
        winners.insert(winner.index);

        let winner_name = batch[winner.index].name_any();
        for loser in contenders.iter().filter(|c| c.index != winner.index) {
            let address = &mut batch[loser.index];
            tracing::info!(address = %name, resource = %address.name_any(), winner = %winner_name, "Duplicate address");
            address.fail(format!(
                "Address '{name}' already exists with resource name '{winner_name}'"
            ));
            address.status_mut().phase = Phase::Pending;
            held.remove(&address.name_any());
        }
    }

    let mut admission = Admission {
        held,
        ..Default::default()
    };
    for (index, address) in batch.into_iter().enumerate() {
        if winners.contains(&index) {
            admission.admitted.push(address);
        } else {
            admission.rejected.push(address);
        }
    }
    admission
}

/// Returns the diagnostics of an address. Plan and forwarder errors are all
/// reported; reference checks stop at the first error.
fn validate(
    address: &Address,
    batch: &[Address],
    space: Option<&AddressSpace>,
    resolver: &AddressResolver<'_>,
) -> Vec<String> {
    if let Err(error) = resolver.validate(address) {
        return vec![error];
    }

    let mut errors = Vec::new();
    if let Some(space) = space {
        errors.extend(check_forwarders(address, space));
    }
    if !errors.is_empty() {
        return errors;
    }

    if let Err(error) = check_references(address, batch) {
        errors.push(error);
    }
    errors
}

fn check_forwarders(address: &Address, space: &AddressSpace) -> Vec<String> {
    let mut errors = Vec::new();
    let forwarders = &address.spec.forwarders;
    if forwarders.is_empty() {
        return errors;
    }

    let space_name = space.name_any();
    if space.connectors().is_empty() {
        errors.push(format!(
            "Unable to create forwarders: There are no connectors configured for address space '{space_name}'"
        ));
    }
    let address_type = address.spec.address_type;
    if !matches!(address_type, AddressType::Queue | AddressType::Subscription) {
        errors.push(format!(
            "Unable to create forwarders for address type '{address_type}': Forwarders can only be created for address types 'queue' and 'subscription'"
        ));
    }
    for forwarder in forwarders {
        let prefixed = space
            .connectors()
            .iter()
            .any(|c| forwarder.remote_address.starts_with(&c.name));
        if !prefixed {
            errors.push(format!(
                "Unable to create forwarder '{}': remoteAddress '{}' is not prefixed with any connector in address space '{space_name}'",
                forwarder.name, forwarder.remote_address,
            ));
        }
        if address_type == AddressType::Subscription && forwarder.direction == ForwarderDirection::In {
            errors.push(format!(
                "Unable to create forwarder '{}': direction 'in' is not allowed on 'subscription' address type",
                forwarder.name,
            ));
        }
    }
    errors
}

/// Checks the topic, dead letter and expiry references of an address against
/// the other addresses of the batch.
fn check_references(address: &Address, batch: &[Address]) -> Result<(), String> {
    let spec = &address.spec;
    let resource = address.name_any();
    let find = |name: &str| batch.iter().find(|a| a.spec.address == name);

    if spec.address_type == AddressType::Subscription {
        let Some(topic) = spec.topic.as_deref() else {
            return Err(format!(
                "Subscription address '{}' (resource name '{resource}') must reference a known topic address.",
                spec.address,
            ));
        };
        let Some(target) = find(topic) else {
            return Err(format!(
                "Subscription address '{}' (resource name '{resource}') references a topic address '{topic}' that does not exist.",
                spec.address,
            ));
        };
        if target.spec.address_type != AddressType::Topic {
            return Err(format!(
                "Subscription address '{}' (resource name '{resource}') references a topic address '{topic}' (resource name '{}') that is not of expected type 'topic' (found type '{}' instead).",
                spec.address,
                target.name_any(),
                target.spec.address_type,
            ));
        }
    }

    let references = [
        ("a dead letter", spec.deadletter.as_deref()),
        ("an expiry", spec.expiry.as_deref()),
    ];
    for (kind, reference) in references {
        let Some(reference) = reference else {
            continue;
        };
        if !matches!(spec.address_type, AddressType::Queue | AddressType::Topic) {
            return Err(format!(
                "Address '{}' (resource name '{resource}') of type '{}' cannot reference {kind} address.",
                spec.address, spec.address_type,
            ));
        }
        let Some(target) = find(reference) else {
            return Err(format!(
                "Address '{}' (resource name '{resource}') references {kind} address '{reference}' that does not exist.",
                spec.address,
            ));
        };
        if target.spec.address_type != AddressType::Deadletter {
            return Err(format!(
                "Address '{}' (resource name '{resource}') references {kind} address '{reference}' (resource name '{}') that is not of expected type 'deadletter' (found type '{}' instead).",
                spec.address,
                target.name_any(),
                target.spec.address_type,
            ));
        }
    }
    Ok(())
}

/// Whether the address needs admission control: it is new, its spec changed
/// since it was admitted, or its plan changed.
pub(crate) fn needs_quota(address: &Address, resolver: &AddressResolver<'_>) -> bool {
    if address.phase() == Phase::Pending {
        return true;
    }
    let applied = address.status().and_then(|s| s.applied_spec.as_ref());
    applied != Some(&address.spec) || resolver.plan_changed(address)
}
