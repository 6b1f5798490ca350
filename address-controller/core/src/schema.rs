use crate::k8s::{AddressPlanSpec, AddressSpacePlanSpec, StandardInfraConfigSpec};
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::watch;

/// An immutable snapshot of the plans and infrastructure configs known to the
/// control plane.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schema {
    pub address_space_plans: BTreeMap<String, AddressSpacePlanSpec>,
    pub address_plans: BTreeMap<String, AddressPlanSpec>,
    pub infra_configs: BTreeMap<String, StandardInfraConfigSpec>,
}

pub type SchemaPublisher = watch::Sender<Option<Arc<Schema>>>;

/// Read side of the schema. `None` until the first full snapshot is published.
#[derive(Clone, Debug)]
pub struct SchemaProvider {
    rx: watch::Receiver<Option<Arc<Schema>>>,
}

// === impl Schema ===

impl Schema {
    pub fn address_space_plan(&self, name: &str) -> Option<&AddressSpacePlanSpec> {
        self.address_space_plans.get(name)
    }

    pub fn address_plan(&self, name: &str) -> Option<&AddressPlanSpec> {
        self.address_plans.get(name)
    }

    pub fn infra_config(&self, name: &str) -> Option<&StandardInfraConfigSpec> {
        self.infra_configs.get(name)
    }
}

// === impl SchemaProvider ===

impl SchemaProvider {
    pub fn channel() -> (SchemaPublisher, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { rx })
    }

    /// A provider that always returns the given schema.
    pub fn fixed(schema: Schema) -> Self {
        let (_, rx) = watch::channel(Some(Arc::new(schema)));
        Self { rx }
    }

    pub fn snapshot(&self) -> Option<Arc<Schema>> {
        self.rx.borrow().clone()
    }

    /// Waits for a new snapshot. Returns false once the publisher is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}
