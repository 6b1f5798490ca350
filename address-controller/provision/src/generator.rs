use address_controller_core::{
    k8s::{labels, ObjectMeta, Quantity, Service, StandardInfraConfigSpec, StatefulSet},
    BrokerSetGenerator, ClusterResource,
};
use anyhow::Result;
use k8s_openapi::{
    api::{
        apps::v1::StatefulSetSpec,
        core::v1::{
            Container, ContainerPort, EnvVar, PersistentVolumeClaim, PersistentVolumeClaimSpec,
            PodSpec, PodTemplateSpec, ResourceRequirements, ServicePort, ServiceSpec,
            VolumeMount, VolumeResourceRequirements,
        },
    },
    apimachinery::pkg::{apis::meta::v1::LabelSelector, util::intstr::IntOrString},
};
use std::collections::BTreeMap;

const AMQPS_PORT: i32 = 55671;
const MANAGEMENT_PORT: i32 = 8161;
const DATA_VOLUME: &str = "data";
const DATA_PATH: &str = "/var/run/artemis";

/// Renders a broker cluster as a StatefulSet with a headless Service.
#[derive(Clone, Debug)]
pub struct ManifestBrokerSetGenerator {
    infra_uuid: String,
    namespace: String,
    image: String,
}

impl ManifestBrokerSetGenerator {
    pub fn new(
        infra_uuid: impl Into<String>,
        namespace: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            infra_uuid: infra_uuid.into(),
            namespace: namespace.into(),
            image: image.into(),
        }
    }

    fn metadata(
        &self,
        cluster_id: &str,
        infra: &StandardInfraConfigSpec,
    ) -> Result<ObjectMeta> {
        let applied = serde_json::to_string(infra)?;
        Ok(ObjectMeta {
            name: Some(cluster_id.to_string()),
            namespace: Some(self.namespace.clone()),
            labels: Some(labels::broker(&self.infra_uuid, cluster_id)),
            annotations: Some(
                [(labels::APPLIED_INFRA_CONFIG.to_string(), applied)]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        })
    }

    fn container(&self, cluster_id: &str, infra: &StandardInfraConfigSpec) -> Container {
        let mut vars = vec![
            env("INFRA_UUID", &self.infra_uuid),
            env("CLUSTER_ID", cluster_id),
        ];
        if let Some(policy) = infra.broker.address_full_policy.as_deref() {
            vars.push(env("ADDRESS_FULL_POLICY", policy));
        }
        if let Some(memory) = infra.broker.resources.memory.as_deref() {
            vars.push(env("BROKER_MEMORY_LIMIT", memory));
        }

        let resources = infra.broker.resources.memory.as_ref().map(|memory| {
            let limits = [("memory".to_string(), Quantity(memory.clone()))]
                .into_iter()
                .collect::<BTreeMap<_, _>>();
            ResourceRequirements {
                requests: Some(limits.clone()),
                limits: Some(limits),
                ..Default::default()
            }
        });

        Container {
            name: "broker".to_string(),
            image: Some(self.image.clone()),
            env: Some(vars),
            ports: Some(vec![
                port("amqps", AMQPS_PORT),
                port("management", MANAGEMENT_PORT),
            ]),
            resources,
            volume_mounts: infra.broker.resources.storage.as_ref().map(|_| {
                vec![VolumeMount {
                    name: DATA_VOLUME.to_string(),
                    mount_path: DATA_PATH.to_string(),
                    ..Default::default()
                }]
            }),
            ..Default::default()
        }
    }
}

impl BrokerSetGenerator for ManifestBrokerSetGenerator {
    fn generate(
        &self,
        cluster_id: &str,
        replicas: i32,
        infra: &StandardInfraConfigSpec,
    ) -> Result<Vec<ClusterResource>> {
        let metadata = self.metadata(cluster_id, infra)?;
        let selector = labels::broker(&self.infra_uuid, cluster_id);

        let volume_claim_templates = infra.broker.resources.storage.as_ref().map(|storage| {
            vec![PersistentVolumeClaim {
                metadata: ObjectMeta {
                    name: Some(DATA_VOLUME.to_string()),
                    ..Default::default()
                },
                spec: Some(PersistentVolumeClaimSpec {
                    access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                    storage_class_name: infra.broker.storage_class_name.clone(),
                    resources: Some(VolumeResourceRequirements {
                        requests: Some(
                            [("storage".to_string(), Quantity(storage.clone()))]
                                .into_iter()
                                .collect(),
                        ),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]
        });

        let statefulset = StatefulSet {
            metadata: metadata.clone(),
            spec: Some(StatefulSetSpec {
                replicas: Some(replicas),
                selector: LabelSelector {
                    match_labels: Some(selector.clone()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(selector.clone()),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![self.container(cluster_id, infra)],
                        ..Default::default()
                    }),
                },
                volume_claim_templates,
                ..Default::default()
            }),
            ..Default::default()
        };

        let service = Service {
            metadata,
            spec: Some(ServiceSpec {
                cluster_ip: Some("None".to_string()),
                selector: Some(selector),
                ports: Some(vec![
                    service_port("amqps", AMQPS_PORT),
                    service_port("management", MANAGEMENT_PORT),
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };

        Ok(vec![
            ClusterResource::StatefulSet(Box::new(statefulset)),
            ClusterResource::Service(Box::new(service)),
        ])
    }
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        ..Default::default()
    }
}

fn service_port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(port)),
        ..Default::default()
    }
}
