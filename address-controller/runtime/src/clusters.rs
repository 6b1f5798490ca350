use crate::{
    core::{ApplyError, BrokerCluster, ClusterManager, ClusterResource, RouterCluster},
    k8s::{
        self, labels, Api, DeleteParams, Deployment, ListParams, Patch, PatchParams,
        PersistentVolumeClaim, Quantity, ResourceExt, Service, StandardInfraConfigSpec,
        StatefulSet,
    },
};
use anyhow::{bail, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use std::fmt;

const FIELD_MANAGER: &str = "address-controller";

/// Manages broker and router workloads in the infrastructure namespace.
pub(crate) struct KubeClusterManager {
    statefulsets: Api<StatefulSet>,
    deployments: Api<Deployment>,
    services: Api<Service>,
    claims: Api<PersistentVolumeClaim>,
    infra_uuid: String,
}

// === impl KubeClusterManager ===

impl KubeClusterManager {
    pub(crate) fn new(client: k8s::Client, namespace: &str, infra_uuid: &str) -> Self {
        Self {
            statefulsets: Api::namespaced(client.clone(), namespace),
            deployments: Api::namespaced(client.clone(), namespace),
            services: Api::namespaced(client.clone(), namespace),
            claims: Api::namespaced(client, namespace),
            infra_uuid: infra_uuid.to_string(),
        }
    }

    async fn router_deployment(&self) -> Result<Deployment> {
        let params = ListParams::default().labels(&labels::router_selector(&self.infra_uuid));
        let deployments = self.deployments.list(&params).await?;
        match deployments.items.into_iter().next() {
            Some(deployment) => Ok(deployment),
            None => bail!("no router deployment found for infra {}", self.infra_uuid),
        }
    }

    /// Volume claim templates cannot be changed in place. When resizing is
    /// allowed and the requested storage changed, the existing claims are
    /// grown and the StatefulSet is orphan-deleted so that it is recreated
    /// around its running pods.
    async fn apply_statefulset(
        &self,
        statefulset: &StatefulSet,
        allow_volume_resize: bool,
    ) -> kube::Result<()> {
        let name = statefulset.name_any();
        if allow_volume_resize {
            if let Some(current) = self.statefulsets.get_opt(&name).await? {
                if let Some((template, storage)) = storage_request(statefulset) {
                    if storage_request(&current).map(|(_, s)| s) != Some(storage.clone()) {
                        self.resize_claims(&current, &template, &storage).await?;
                        self.statefulsets
                            .delete(&name, &DeleteParams::orphan())
                            .await?;
                    }
                }
            }
        }
        apply(&self.statefulsets, statefulset).await
    }

    async fn resize_claims(
        &self,
        statefulset: &StatefulSet,
        template: &str,
        storage: &Quantity,
    ) -> kube::Result<()> {
        let name = statefulset.name_any();
        let replicas = statefulset
            .spec
            .as_ref()
            .and_then(|spec| spec.replicas)
            .unwrap_or(1);
        let patch = json!({
            "spec": {
                "resources": {
                    "requests": { "storage": storage },
                },
            },
        });
        for ordinal in 0..replicas {
            let claim = format!("{template}-{name}-{ordinal}");
            match self
                .claims
                .patch(&claim, &PatchParams::default(), &Patch::Merge(&patch))
                .await
            {
                Ok(_) => tracing::info!(%claim, storage = %storage.0, "Resized volume claim"),
                Err(k8s::Error::Api(error)) if error.code == 404 => {
                    tracing::debug!(%claim, "Volume claim not found")
                }
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ClusterManager for KubeClusterManager {
    async fn list_clusters(&self) -> Result<Vec<BrokerCluster>> {
        let params = ListParams::default().labels(&labels::broker_selector(&self.infra_uuid));
        let statefulsets = self.statefulsets.list(&params).await?;
        Ok(statefulsets.items.into_iter().map(broker_cluster).collect())
    }

    async fn router_cluster(&self) -> Result<RouterCluster> {
        let deployment = self.router_deployment().await?;
        Ok(RouterCluster {
            name: deployment.name_any(),
            replicas: deployment
                .spec
                .as_ref()
                .and_then(|spec| spec.replicas)
                .unwrap_or(1),
            infra_config: applied_infra_config(&deployment),
        })
    }

    async fn scale_router(&self, replicas: i32) -> Result<()> {
        let name = self.router_deployment().await?.name_any();
        let patch = json!({ "spec": { "replicas": replicas } });
        self.deployments
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        tracing::info!(%name, replicas, "Scaled routers");
        Ok(())
    }

    async fn apply(
        &self,
        resources: &[ClusterResource],
        allow_volume_resize: bool,
    ) -> std::result::Result<(), ApplyError> {
        for resource in resources {
            let result = match resource {
                ClusterResource::StatefulSet(statefulset) => {
                    self.apply_statefulset(statefulset, allow_volume_resize)
                        .await
                }
                ClusterResource::Deployment(deployment) => {
                    apply(&self.deployments, deployment.as_ref()).await
                }
                ClusterResource::Service(service) => apply(&self.services, service.as_ref()).await,
            };
            if let Err(error) = result {
                return Err(ApplyError::new(resource, error));
            }
            tracing::debug!(kind = resource.kind(), name = %resource.name(), "Applied");
        }
        Ok(())
    }

    async fn delete(&self, cluster: &BrokerCluster) -> Result<()> {
        let params = DeleteParams::default();
        ignore_not_found(self.statefulsets.delete(&cluster.cluster_id, &params).await)?;
        ignore_not_found(self.services.delete(&cluster.cluster_id, &params).await)?;
        Ok(())
    }

    async fn is_cluster_ready(&self, cluster_id: &str) -> Result<bool> {
        let ready = self
            .statefulsets
            .get_opt(cluster_id)
            .await?
            .and_then(|statefulset| statefulset.status)
            .and_then(|status| status.ready_replicas)
            .unwrap_or(0);
        Ok(ready > 0)
    }
}

async fn apply<K>(api: &Api<K>, resource: &K) -> kube::Result<()>
where
    K: k8s::Resource + Clone + DeserializeOwned + Serialize + fmt::Debug,
{
    let params = PatchParams::apply(FIELD_MANAGER).force();
    api.patch(&resource.name_any(), &params, &Patch::Apply(resource))
        .await?;
    Ok(())
}

fn ignore_not_found<T>(result: kube::Result<T>) -> kube::Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(k8s::Error::Api(error)) if error.code == 404 => Ok(()),
        Err(error) => Err(error),
    }
}

fn broker_cluster(statefulset: StatefulSet) -> BrokerCluster {
    let cluster_id = statefulset
        .labels()
        .get(labels::CLUSTER_ID)
        .cloned()
        .unwrap_or_else(|| statefulset.name_any());
    let replicas = statefulset
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let ready_replicas = statefulset
        .status
        .as_ref()
        .and_then(|status| status.ready_replicas)
        .unwrap_or(0);
    BrokerCluster {
        cluster_id,
        replicas,
        ready_replicas,
        infra_config: applied_infra_config(&statefulset),
        resources: vec![ClusterResource::StatefulSet(Box::new(statefulset))],
    }
}

fn applied_infra_config(resource: &impl ResourceExt) -> Option<StandardInfraConfigSpec> {
    let json = resource.annotations().get(labels::APPLIED_INFRA_CONFIG)?;
    match serde_json::from_str(json) {
        Ok(infra) => Some(infra),
        Err(error) => {
            tracing::warn!(name = %resource.name_any(), %error, "Invalid applied infra config");
            None
        }
    }
}

/// The storage requested by the first volume claim template, with the
/// template's name.
fn storage_request(statefulset: &StatefulSet) -> Option<(String, Quantity)> {
    let template = statefulset.spec.as_ref()?.volume_claim_templates.as_ref()?.first()?;
    let storage = template
        .spec
        .as_ref()?
        .resources
        .as_ref()?
        .requests
        .as_ref()?
        .get("storage")?
        .clone();
    Some((template.name_any(), storage))
}
