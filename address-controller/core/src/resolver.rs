use crate::{
    k8s::{Address, AddressPlanSpec, AddressPlanStatus, AddressSpacePlanSpec},
    schema::Schema,
};
use std::collections::BTreeMap;

pub const BROKER: &str = "broker";
pub const ROUTER: &str = "router";
pub const AGGREGATE: &str = "aggregate";

/// Resolves addresses against the plans offered by one address space plan.
#[derive(Copy, Clone, Debug)]
pub struct AddressResolver<'s> {
    schema: &'s Schema,
    space_plan_name: &'s str,
    space_plan: &'s AddressSpacePlanSpec,
}

impl<'s> AddressResolver<'s> {
    /// Returns `None` if the address space plan is unknown.
    pub fn new(schema: &'s Schema, space_plan_name: &'s str) -> Option<Self> {
        let space_plan = schema.address_space_plan(space_plan_name)?;
        Some(Self {
            schema,
            space_plan_name,
            space_plan,
        })
    }

    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    pub fn space_plan(&self) -> &'s AddressSpacePlanSpec {
        self.space_plan
    }

    pub fn limits(&self) -> &'s BTreeMap<String, f64> {
        &self.space_plan.resource_limits
    }

    /// The plan an address asks for, if it is offered to this address space.
    pub fn desired_plan(&self, address: &Address) -> Option<&'s AddressPlanSpec> {
        let name = address.spec.plan.as_str();
        if !self.space_plan.address_plans.iter().any(|p| p == name) {
            return None;
        }
        self.schema.address_plan(name)
    }

    /// Checks that the address's plan exists, is offered, and matches its
    /// type. Returns a diagnostic otherwise.
    pub fn validate(&self, address: &Address) -> Result<&'s AddressPlanSpec, String> {
        let plan = address.spec.plan.as_str();
        let Some(spec) = self.schema.address_plan(plan) else {
            return Err(format!("Unknown address plan '{plan}'"));
        };
        if !self.space_plan.address_plans.iter().any(|p| p == plan) {
            return Err(format!(
                "Address plan '{plan}' is not offered by address space plan '{}'",
                self.space_plan_name
            ));
        }
        if spec.address_type != address.spec.address_type {
            return Err(format!(
                "Address type '{}' does not match type '{}' of address plan '{plan}'",
                address.spec.address_type, spec.address_type
            ));
        }
        Ok(spec)
    }

    pub fn desired_plan_status(&self, address: &Address) -> Option<AddressPlanStatus> {
        let plan = self.desired_plan(address)?;
        Some(AddressPlanStatus {
            name: address.spec.plan.clone(),
            resources: plan.resources.clone(),
        })
    }

    /// Resources the address was granted, falling back to its desired plan
    /// for addresses admitted before plan status was recorded.
    pub fn granted_resources(&self, address: &Address) -> Option<BTreeMap<String, f64>> {
        if let Some(ps) = address.status().and_then(|s| s.plan_status.as_ref()) {
            return Some(ps.resources.clone());
        }
        self.desired_plan(address).map(|p| p.resources.clone())
    }

    /// The plan used to interpret an address's settings: the granted plan if
    /// it still exists, otherwise the desired one.
    pub fn applied_plan(&self, address: &Address) -> Option<&'s AddressPlanSpec> {
        address
            .status()
            .and_then(|s| s.plan_status.as_ref())
            .and_then(|ps| self.schema.address_plan(&ps.name))
            .or_else(|| self.desired_plan(address))
    }

    /// True if the desired plan differs from the granted one.
    pub fn plan_changed(&self, address: &Address) -> bool {
        let granted = address.status().and_then(|s| s.plan_status.as_ref());
        match (granted, self.desired_plan_status(address)) {
            (Some(granted), Some(desired)) => *granted != desired,
            (None, Some(_)) => true,
            (_, None) => false,
        }
    }
}

/// Reads a resource amount, defaulting to zero.
pub fn amount(resources: &BTreeMap<String, f64>, name: &str) -> f64 {
    resources.get(name).copied().unwrap_or(0.0)
}

/// Pooled addresses share brokers with other addresses; everything else gets
/// dedicated brokers.
pub fn is_pooled(resources: &BTreeMap<String, f64>) -> bool {
    amount(resources, BROKER) < 1.0
}

