use crate::{
    core::{RouterEndpoint, RouterManagement, RouterStatus},
    k8s::{self, api::core::v1::Pod, labels, Api, ListParams, ResourceExt},
    management::ManagementClient,
};
use anyhow::Result;

/// Discovers router pods and reads their status from the router agent's
/// management endpoint.
pub(crate) struct KubeRouterManagement {
    pods: Api<Pod>,
    client: ManagementClient,
    infra_uuid: String,
    port: u16,
}

// === impl KubeRouterManagement ===

impl KubeRouterManagement {
    pub(crate) fn new(
        client: k8s::Client,
        namespace: &str,
        infra_uuid: &str,
        management: ManagementClient,
        port: u16,
    ) -> Self {
        Self {
            pods: Api::namespaced(client, namespace),
            client: management,
            infra_uuid: infra_uuid.to_string(),
            port,
        }
    }
}

#[async_trait::async_trait]
impl RouterManagement for KubeRouterManagement {
    async fn routers(&self) -> Result<Vec<RouterEndpoint>> {
        let params = ListParams::default().labels(&labels::router_selector(&self.infra_uuid));
        let pods = self.pods.list(&params).await?;
        Ok(router_endpoints(pods.items, self.port))
    }

    async fn query(&self, router: &RouterEndpoint, include_links: bool) -> Result<RouterStatus> {
        let path = format!("/status?links={include_links}");
        let mut status: RouterStatus = self.client.get(&router.host, &path).await?;
        if status.router_id.is_empty() {
            status.router_id = router.router_id.clone();
        }
        Ok(status)
    }
}

/// Routers that are running and have an address. Pods that are still starting
/// are left for a later poll.
fn router_endpoints(pods: Vec<Pod>, port: u16) -> Vec<RouterEndpoint> {
    pods.into_iter()
        .filter_map(|pod| {
            let status = pod.status.as_ref()?;
            if status.phase.as_deref() != Some("Running") {
                return None;
            }
            let ip = status.pod_ip.clone()?;
            Some(RouterEndpoint {
                router_id: pod.name_any(),
                host: format!("{ip}:{port}"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::{api::core::v1::PodStatus, ObjectMeta};
    use pretty_assertions::assert_eq;

    fn pod(name: &str, phase: &str, ip: Option<&str>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: None,
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                pod_ip: ip.map(Into::into),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn only_running_routers_are_queried() {
        let endpoints = router_endpoints(
            vec![
                pod("qdrouterd-0", "Running", Some("10.0.0.1")),
                pod("qdrouterd-1", "Pending", None),
                pod("qdrouterd-2", "Running", None),
            ],
            8080,
        );

        assert_eq!(
            endpoints,
            vec![RouterEndpoint {
                router_id: "qdrouterd-0".to_string(),
                host: "10.0.0.1:8080".to_string(),
            }]
        );
    }
}
