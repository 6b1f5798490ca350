use crate::{
    k8s::{self, labels, ObjectMeta, Resource},
    reconcile::{AddressController, Batches, Running},
};
use anyhow::Result;
use k8s_openapi::api::coordination::v1 as coordv1;
use kube::api::PatchParams;
use std::sync::Arc;
use tokio::{sync::watch, time};

const LEASE_DURATION: time::Duration = time::Duration::from_secs(30);
const RENEW_GRACE_PERIOD: time::Duration = time::Duration::from_secs(1);

pub(crate) type Claims = watch::Receiver<Arc<kubert::lease::Claim>>;

/// Creates the controller's Lease if necessary and starts contending for it.
pub(crate) async fn init<T>(
    runtime: &kubert::Runtime<T>,
    ns: &str,
    lease_name: &str,
    deployment_name: Option<&str>,
    hostname: &str,
) -> Result<Claims> {
    // The Lease is owned by the controller's deployment, when known, so that
    // it is removed along with the controller.
    let owner_references = match deployment_name {
        Some(name) => {
            let api = k8s::Api::<k8s::Deployment>::namespaced(runtime.client(), ns);
            let deployment = api.get(name).await?;
            deployment.controller_owner_ref(&()).map(|owner| vec![owner])
        }
        None => None,
    };

    let lease = coordv1::Lease {
        metadata: ObjectMeta {
            name: Some(lease_name.to_string()),
            namespace: Some(ns.to_string()),
            // Specifying a resource version of "0" means that we will
            // only create the Lease if it does not already exist.
            resource_version: Some("0".to_string()),
            owner_references,
            labels: Some(
                [
                    (labels::APP.to_string(), labels::APP_VALUE.to_string()),
                    (labels::ROLE.to_string(), "standard-controller".to_string()),
                ]
                .into_iter()
                .collect(),
            ),
            ..Default::default()
        },
        spec: None,
    };
    let api = k8s::Api::<coordv1::Lease>::namespaced(runtime.client(), ns);
    match api
        .patch(
            lease_name,
            &PatchParams {
                field_manager: Some("address-controller".to_string()),
                ..Default::default()
            },
            &kube::api::Patch::Apply(lease),
        )
        .await
    {
        Ok(lease) => tracing::info!(?lease, "Created Lease resource"),
        Err(k8s::Error::Api(_)) => tracing::debug!("Lease already exists, no need to create it"),
        Err(error) => {
            return Err(error.into());
        }
    };

    let params = kubert::lease::ClaimParams {
        lease_duration: LEASE_DURATION,
        renew_grace_period: RENEW_GRACE_PERIOD,
    };
    let (claims, _task) = kubert::lease::LeaseManager::init(api, lease_name)
        .await?
        .spawn(hostname, params)
        .await?;
    Ok(claims)
}

/// Runs the controller while this instance holds the lease.
///
/// Only one controller instance may change addresses and infrastructure at a
/// time. Leadership changes start and stop the controller; the address watch
/// keeps running either way so a new leader starts from a warm index.
pub(crate) async fn lead(
    mut claims: Claims,
    hostname: String,
    controller: Arc<AddressController>,
    batches: Batches,
) {
    let mut running: Option<Running> = None;
    loop {
        let leader = claims.borrow_and_update().is_current_for(&hostname);
        running = match (leader, running.take()) {
            (true, None) => {
                tracing::info!("Acquired lease, starting controller");
                Some(controller.clone().start(batches.clone()).await)
            }
            (false, Some(running)) => {
                tracing::info!("Lost lease, stopping controller");
                running.stop();
                None
            }
            (_, running) => running,
        };

        if claims.changed().await.is_err() {
            tracing::debug!("Lease claims closed");
            if let Some(running) = running.take() {
                running.stop();
            }
            return;
        }
    }
}
