use address_controller_core::k8s::{AddressPlanSpec, AddressSpec, MessageRedelivery, MessageTtl};

/// Resolves the effective message TTL bounds of an address.
///
/// Plan bounds apply first; the address may only narrow them. Values below 1
/// are ignored and a pair whose maximum does not exceed its minimum is dropped.
pub fn resolve_message_ttl(plan: &AddressPlanSpec, spec: &AddressSpec) -> Option<MessageTtl> {
    let mut ttl = MessageTtl::default();

    if let Some((min, max)) = plan.message_ttl.as_ref().and_then(sanitize_ttl) {
        ttl.minimum = min;
        ttl.maximum = max;
    }

    if let Some((min, max)) = spec.message_ttl.as_ref().and_then(sanitize_ttl) {
        if let Some(max) = max {
            if ttl.maximum.map_or(true, |current| current > max) {
                ttl.maximum = Some(max);
            }
        }
        if let Some(min) = min {
            if ttl.minimum.map_or(true, |current| current < min) {
                ttl.minimum = Some(min);
            }
        }
    }

    if ttl.minimum.is_none() && ttl.maximum.is_none() {
        return None;
    }
    Some(ttl)
}

fn sanitize_ttl(ttl: &MessageTtl) -> Option<(Option<i64>, Option<i64>)> {
    let min = ttl.minimum.filter(|v| *v >= 1);
    let max = ttl.maximum.filter(|v| *v >= 1);
    if let (Some(min), Some(max)) = (min, max) {
        if max <= min {
            return None;
        }
    }
    Some((min, max))
}

/// Resolves the effective redelivery settings of an address: the plan's
/// settings with each field the address sets overriding it.
pub fn resolve_message_redelivery(
    plan: &AddressPlanSpec,
    spec: &AddressSpec,
) -> Option<MessageRedelivery> {
    let mut status = plan.message_redelivery.clone();
    if let Some(overrides) = spec.message_redelivery.as_ref() {
        if let Some(v) = overrides.maximum_delivery_attempts {
            status.get_or_insert_with(Default::default).maximum_delivery_attempts = Some(v);
        }
        if let Some(v) = overrides.maximum_delivery_delay {
            status.get_or_insert_with(Default::default).maximum_delivery_delay = Some(v);
        }
        if let Some(v) = overrides.redelivery_delay {
            status.get_or_insert_with(Default::default).redelivery_delay = Some(v);
        }
        if let Some(v) = overrides.redelivery_delay_multiplier {
            status.get_or_insert_with(Default::default).redelivery_delay_multiplier = Some(v);
        }
    }
    status
}
