use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster_client::ClusterClient;
use crate::constants;
use crate::model::Error;
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::utils;

/// Everything the proxy reset needs to roll sidecars onto a new proxy image
#[derive(Clone)]
pub struct ProxyResetConfig {
    pub cancel: CancellationToken,
    pub image_prefix: String,
    pub image_version: String,
    /// Deletion retries after the first attempt
    pub retries_count: u32,
    pub delay_between_retries: Duration,
    pub timeout: Duration,
    pub interval: Duration,
    pub cluster: Arc<dyn ClusterClient>,
}

impl ProxyResetConfig {
    /// Image reference every sidecar is expected to run, e.g. `istio/proxyv2:1.11.4-distroless`
    pub fn expected_image(&self) -> String {
        format!("{}:{}", self.image_prefix, self.image_version)
    }
}

#[async_trait]
pub trait ProxyReset: Send + Sync {
    async fn run(&self, config: ProxyResetConfig) -> Result<(), Error>;
}

/// Restarts every controller-owned pod whose sidecar runs an outdated proxy image, then waits
/// until the recreated pods report the expected image.
#[derive(Debug, Clone, Default)]
pub struct PodProxyReset;

#[async_trait]
impl ProxyReset for PodProxyReset {
    async fn run(&self, config: ProxyResetConfig) -> Result<(), Error> {
        let expected_image = config.expected_image();
        let reset = async {
            match tokio::time::timeout(config.timeout, reset_outdated_pods(&config, &expected_image)).await {
                Ok(result) => result,
                Err(_) => Err(Error::ProxyReset(format!(
                    "sidecars still not running {expected_image} after {}s",
                    config.timeout.as_secs()
                ))),
            }
        };
        utils::cancellable(&config.cancel, reset).await
    }
}

async fn reset_outdated_pods(config: &ProxyResetConfig, expected_image: &str) -> Result<(), Error> {
    let outdated = outdated_pods(config.cluster.as_ref(), &config.image_prefix, expected_image).await?;
    if outdated.is_empty() {
        info!("All Istio sidecars already run {expected_image}");
        return Ok(());
    }
    info!("Resetting {} pods with outdated Istio sidecar", outdated.len());

    let retry = RetryConfig {
        max_attempts: config.retries_count.saturating_add(1),
        initial_delay: config.delay_between_retries,
        max_delay: config.delay_between_retries,
        backoff_multiplier: 1.0,
    };
    for pod in &outdated {
        let namespace = pod.namespace().unwrap_or_default();
        let name = pod.name_any();
        if pod.owner_references().is_empty() {
            warn!("Pod {namespace}/{name} has no owner and would not be recreated, skipping");
            continue;
        }
        let cluster = config.cluster.as_ref();
        let (namespace, name) = (namespace.as_str(), name.as_str());
        retry_with_backoff(&retry, "delete outdated pod", |_| true, move || async move {
            match cluster.delete_pod(namespace, name).await {
                Err(e) if e.is_not_found() => {
                    debug!("Pod {namespace}/{name} is already gone");
                    Ok(())
                }
                result => result,
            }
        })
        .await?;
        debug!("Pod {namespace}/{name} deleted");
    }

    loop {
        let remaining: Vec<Pod> = outdated_pods(config.cluster.as_ref(), &config.image_prefix, expected_image)
            .await?
            .into_iter()
            .filter(|pod| !pod.owner_references().is_empty())
            .collect();
        if remaining.is_empty() {
            info!("Istio sidecars have been reset to {expected_image}");
            return Ok(());
        }
        debug!("Waiting for {} pods to run {expected_image}", remaining.len());
        tokio::time::sleep(config.interval).await;
    }
}

async fn outdated_pods(cluster: &dyn ClusterClient, image_prefix: &str, expected_image: &str) -> Result<Vec<Pod>, Error> {
    Ok(cluster
        .list_pods()
        .await?
        .into_iter()
        .filter(|pod| has_outdated_sidecar(pod, image_prefix, expected_image))
        .collect())
}

/// Whether the pod's `istio-proxy` container runs a proxy image other than the expected one.
/// Registry hosts in front of the prefix are ignored.
pub fn has_outdated_sidecar(pod: &Pod, image_prefix: &str, expected_image: &str) -> bool {
    pod.spec
        .iter()
        .flat_map(|spec| spec.containers.iter())
        .filter(|container| container.name == constants::ISTIO_PROXY_CONTAINER)
        .filter_map(|container| container.image.as_deref())
        .any(|image| image.contains(image_prefix) && !image.ends_with(expected_image))
}
