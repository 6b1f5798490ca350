use crate::k8s::{Address, ResourceExt};
use kubert::index::{IndexNamespacedResource, NamespacedRemoved};
use parking_lot::RwLock;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::watch;

pub(crate) type SharedAddressIndex = Arc<RwLock<AddressIndex>>;

/// Tracks the addresses of a namespace and publishes a snapshot of them on
/// every change.
///
/// Nothing is published until the initial listing completes so that
/// reconciliation never sees a partial view of the namespace.
#[derive(Debug)]
pub(crate) struct AddressIndex {
    namespace: String,
    addresses: BTreeMap<String, Address>,
    synced: bool,
    tx: watch::Sender<Option<Arc<Vec<Address>>>>,
}

// === impl AddressIndex ===

impl AddressIndex {
    pub(crate) fn shared(
        namespace: impl ToString,
        tx: watch::Sender<Option<Arc<Vec<Address>>>>,
    ) -> SharedAddressIndex {
        Arc::new(RwLock::new(Self {
            namespace: namespace.to_string(),
            addresses: BTreeMap::new(),
            synced: false,
            tx,
        }))
    }

    fn publish(&self) {
        if !self.synced {
            return;
        }
        let snapshot = self.addresses.values().cloned().collect::<Vec<_>>();
        tracing::debug!(addresses = snapshot.len(), "Publishing addresses");
        self.tx.send_replace(Some(Arc::new(snapshot)));
    }
}

impl IndexNamespacedResource<Address> for AddressIndex {
    fn apply(&mut self, address: Address) {
        if address.namespace().as_deref() != Some(self.namespace.as_str()) {
            return;
        }
        let name = address.name_unchecked();
        if self.addresses.get(&name) == Some(&address) {
            return;
        }
        self.addresses.insert(name, address);
        self.publish();
    }

    fn delete(&mut self, namespace: String, name: String) {
        if namespace != self.namespace {
            return;
        }
        if self.addresses.remove(&name).is_some() {
            self.publish();
        }
    }

    fn reset(&mut self, addresses: Vec<Address>, removed: NamespacedRemoved) {
        for (namespace, names) in removed {
            if namespace == self.namespace {
                for name in names {
                    self.addresses.remove(&name);
                }
            }
        }
        for address in addresses {
            if address.namespace().as_deref() == Some(self.namespace.as_str()) {
                self.addresses.insert(address.name_unchecked(), address);
            }
        }
        self.synced = true;
        self.publish();
    }
}
