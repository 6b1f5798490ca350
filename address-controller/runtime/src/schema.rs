use crate::{
    core::{Schema, SchemaPublisher},
    k8s::{
        AddressPlan, AddressPlanSpec, AddressSpacePlan, AddressSpacePlanSpec, ResourceExt,
        StandardInfraConfig, StandardInfraConfigSpec,
    },
};
use kubert::index::{IndexNamespacedResource, NamespacedRemoved};
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

pub(crate) type SharedSchemaIndex = Arc<RwLock<SchemaIndex>>;

/// Maintains the plans and infra configs of the infrastructure namespace as a
/// [`Schema`].
///
/// A schema is only published once every kind has been listed, and again
/// whenever it changes.
#[derive(Debug)]
pub(crate) struct SchemaIndex {
    schema: Schema,
    synced: BTreeSet<&'static str>,
    tx: SchemaPublisher,
}

/// A resource kind contributing to the schema.
pub(crate) trait SchemaResource: ResourceExt {
    const KIND: &'static str;
    type Spec;

    fn entries(schema: &mut Schema) -> &mut BTreeMap<String, Self::Spec>;

    fn into_spec(self) -> Self::Spec;
}

const KINDS: usize = 3;

// === impl SchemaIndex ===

impl SchemaIndex {
    pub(crate) fn shared(tx: SchemaPublisher) -> SharedSchemaIndex {
        Arc::new(RwLock::new(Self {
            schema: Schema::default(),
            synced: BTreeSet::new(),
            tx,
        }))
    }

    fn publish(&self) {
        if self.synced.len() < KINDS {
            return;
        }
        let schema = self.schema.clone();
        let changed = self.tx.send_if_modified(|current| {
            if current.as_deref() == Some(&schema) {
                return false;
            }
            *current = Some(Arc::new(schema));
            true
        });
        if changed {
            tracing::info!(
                address_space_plans = self.schema.address_space_plans.len(),
                address_plans = self.schema.address_plans.len(),
                infra_configs = self.schema.infra_configs.len(),
                "Schema updated"
            );
        }
    }
}

impl<R: SchemaResource> IndexNamespacedResource<R> for SchemaIndex {
    fn apply(&mut self, resource: R) {
        let name = resource.name_unchecked();
        R::entries(&mut self.schema).insert(name, resource.into_spec());
        self.publish();
    }

    fn delete(&mut self, _namespace: String, name: String) {
        if R::entries(&mut self.schema).remove(&name).is_some() {
            self.publish();
        }
    }

    fn reset(&mut self, resources: Vec<R>, _removed: NamespacedRemoved) {
        let entries = R::entries(&mut self.schema);
        entries.clear();
        for resource in resources {
            entries.insert(resource.name_unchecked(), resource.into_spec());
        }
        self.synced.insert(R::KIND);
        self.publish();
    }
}

// === impl SchemaResource ===

impl SchemaResource for AddressSpacePlan {
    const KIND: &'static str = "AddressSpacePlan";
    type Spec = AddressSpacePlanSpec;

    fn entries(schema: &mut Schema) -> &mut BTreeMap<String, Self::Spec> {
        &mut schema.address_space_plans
    }

    fn into_spec(self) -> Self::Spec {
        self.spec
    }
}

impl SchemaResource for AddressPlan {
    const KIND: &'static str = "AddressPlan";
    type Spec = AddressPlanSpec;

    fn entries(schema: &mut Schema) -> &mut BTreeMap<String, Self::Spec> {
        &mut schema.address_plans
    }

    fn into_spec(self) -> Self::Spec {
        self.spec
    }
}

impl SchemaResource for StandardInfraConfig {
    const KIND: &'static str = "StandardInfraConfig";
    type Spec = StandardInfraConfigSpec;

    fn entries(schema: &mut Schema) -> &mut BTreeMap<String, Self::Spec> {
        &mut schema.infra_configs
    }

    fn into_spec(self) -> Self::Spec {
        self.spec
    }
}
