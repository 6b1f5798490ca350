use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

/// Host key for resources that are not bound to a broker cluster.
pub const ALL_HOSTS: &str = "all";

/// Tolerance for comparing sums of fractional resource costs.
pub(crate) const EPSILON: f64 = 1e-9;

/// Resource → host (cluster id or [`ALL_HOSTS`]) → usage.
pub type UsageMap = BTreeMap<String, BTreeMap<String, UsageInfo>>;

/// The amount of a resource used on one host, and by which addresses.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UsageInfo {
    pub used: f64,
    pub addresses: BTreeSet<String>,
}

impl UsageInfo {
    pub(crate) fn add(&mut self, amount: f64, address: &str) {
        self.used += amount;
        self.addresses.insert(address.to_string());
    }

    /// Removes an address's contribution. Returns true if nothing remains.
    pub(crate) fn remove(&mut self, amount: f64, address: &str) -> bool {
        if self.addresses.remove(address) {
            self.used = (self.used - amount).max(0.0);
        }
        self.addresses.is_empty()
    }

    /// Number of whole units needed to hold the usage.
    pub fn needed(&self) -> i32 {
        (self.used - EPSILON).ceil().max(1.0) as i32
    }
}

impl fmt::Display for UsageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3} ({})", self.used, self.addresses.len())
    }
}

/// Sums a resource's usage over all hosts.
pub(crate) fn total(usage: &UsageMap, resource: &str) -> f64 {
    usage
        .get(resource)
        .map(|hosts| hosts.values().map(|u| u.used).sum())
        .unwrap_or(0.0)
}

pub(crate) fn add(usage: &mut UsageMap, resource: &str, host: &str, amount: f64, address: &str) {
    usage
        .entry(resource.to_string())
        .or_default()
        .entry(host.to_string())
        .or_default()
        .add(amount, address);
}

/// Removes an address from every host of a resource, dropping hosts left empty.
pub(crate) fn remove(usage: &mut UsageMap, resource: &str, amount: f64, address: &str) {
    if let Some(hosts) = usage.get_mut(resource) {
        hosts.retain(|_, info| !info.remove(amount, address));
    }
}

/// Hosts of a resource that carry the given address.
pub(crate) fn hosts_of<'u>(
    usage: &'u UsageMap,
    resource: &str,
    address: &'u str,
) -> impl Iterator<Item = &'u str> + 'u {
    usage
        .get(resource)
        .into_iter()
        .flat_map(|hosts| hosts.iter())
        .filter(move |(_, info)| info.addresses.contains(address))
        .map(|(host, _)| host.as_str())
}
