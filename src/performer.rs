use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::chart::{self, ChartLoader, DirectoryChartLoader, WorkspaceFactory};
use crate::cluster_client::{ClientProvider, ClusterClient};
use crate::commander::Commander;
use crate::commander_resolver::CommanderResolver;
use crate::manifest::{IstioOperatorExtractor, ManifestExtractor};
use crate::model::Error;
use crate::performer_config::PerformerConfig;
use crate::proxy_reset::{ProxyReset, ProxyResetConfig};
use crate::utils;
use crate::version::Version;
use crate::version_output::{self, IstioStatus};
use crate::webhook::WebhookPatcher;

const ISTIOCTL_FAILURE: &str = "Error occurred when calling istioctl";

/// Performs actions on the Istio component of a cluster
#[async_trait]
pub trait IstioPerformer: Send + Sync {
    /// Installs Istio in the given version using the rendered Istio chart
    async fn install(&self, cancel: &CancellationToken, kubeconfig: &str, istio_chart: &str, version: &str) -> Result<(), Error>;

    /// Excludes namespaces from sidecar injection in Istio's mutating webhook configuration
    async fn patch_mutating_webhook(&self, cancel: &CancellationToken, cluster: &dyn ClusterClient) -> Result<(), Error>;

    /// Upgrades Istio to the target version using the rendered Istio chart
    async fn update(&self, cancel: &CancellationToken, kubeconfig: &str, istio_chart: &str, target_version: &str) -> Result<(), Error>;

    /// Rolls every Istio sidecar onto the given proxy version, the distribution suffix is always appended
    async fn reset_proxy(&self, cancel: &CancellationToken, kubeconfig: &str, proxy_image_version: &str) -> Result<(), Error>;

    /// Reports the versions of the Istio installation against the version the chart targets
    async fn version(
        &self,
        cancel: &CancellationToken,
        workspace: &dyn WorkspaceFactory,
        branch: &str,
        istio_chart: &str,
        kubeconfig: &str,
    ) -> Result<IstioStatus, Error>;

    /// Removes Istio and its namespace, using the given Istio version
    async fn uninstall(&self, cancel: &CancellationToken, cluster: &dyn ClusterClient, version: &str) -> Result<(), Error>;
}

/// Default performer, delegating the version specific work to istioctl commanders
pub struct DefaultIstioPerformer {
    resolver: Arc<dyn CommanderResolver>,
    proxy_reset: Arc<dyn ProxyReset>,
    provider: Arc<dyn ClientProvider>,
    extractor: Arc<dyn ManifestExtractor>,
    chart_loader: Arc<dyn ChartLoader>,
    webhook_patcher: WebhookPatcher,
    config: PerformerConfig,
}

impl DefaultIstioPerformer {
    pub fn new(
        resolver: Arc<dyn CommanderResolver>,
        proxy_reset: Arc<dyn ProxyReset>,
        provider: Arc<dyn ClientProvider>,
        config: PerformerConfig,
    ) -> Self {
        DefaultIstioPerformer {
            resolver,
            proxy_reset,
            provider,
            extractor: Arc::new(IstioOperatorExtractor),
            chart_loader: Arc::new(DirectoryChartLoader),
            webhook_patcher: WebhookPatcher::new(config.webhook.retry.to_retry_config()),
            config,
        }
    }

    pub fn with_manifest_extractor(mut self, extractor: Arc<dyn ManifestExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_chart_loader(mut self, chart_loader: Arc<dyn ChartLoader>) -> Self {
        self.chart_loader = chart_loader;
        self
    }

    fn commander_for(&self, version: &str) -> Result<Box<dyn Commander>, Error> {
        let version = Version::parse(version)?;
        self.resolver.get_commander(&version)
    }

    fn istio_operator_manifest(&self, istio_chart: &str) -> Result<String, Error> {
        self.extractor
            .extract(istio_chart)
            .map_err(|e| Error::delegate("Could not extract IstioOperator manifest", e))
    }

    async fn target_version(&self, workspace: &dyn WorkspaceFactory, branch: &str, istio_chart: &str) -> Result<String, Error> {
        let ws = workspace.get(branch).await?;
        let bundle = self.chart_loader.load(&ws.resource_dir.join(istio_chart)).await?;
        chart::resolve_target_version(&bundle)
    }
}

#[async_trait]
impl IstioPerformer for DefaultIstioPerformer {
    async fn install(&self, cancel: &CancellationToken, kubeconfig: &str, istio_chart: &str, version: &str) -> Result<(), Error> {
        debug!("Starting Istio installation...");

        let exec_version = Version::parse(version)?;
        let manifest = self.istio_operator_manifest(istio_chart)?;
        let commander = self.resolver.get_commander(&exec_version)?;

        utils::cancellable(cancel, async {
            commander
                .install(&manifest, kubeconfig)
                .await
                .map_err(|e| Error::delegate(ISTIOCTL_FAILURE, e))
        })
        .await?;
        info!("Istio in version {version} successfully installed");
        Ok(())
    }

    async fn patch_mutating_webhook(&self, cancel: &CancellationToken, cluster: &dyn ClusterClient) -> Result<(), Error> {
        let webhook = &self.config.webhook;
        self.webhook_patcher
            .patch(cancel, cluster, &webhook.candidates, &webhook.webhook_name, &webhook.required_selector)
            .await
    }

    async fn update(&self, cancel: &CancellationToken, kubeconfig: &str, istio_chart: &str, target_version: &str) -> Result<(), Error> {
        debug!("Starting Istio update...");

        let exec_version = Version::parse(target_version)?;
        let manifest = self.istio_operator_manifest(istio_chart)?;
        let commander = self.resolver.get_commander(&exec_version)?;

        utils::cancellable(cancel, async {
            commander
                .upgrade(&manifest, kubeconfig)
                .await
                .map_err(|e| Error::delegate(ISTIOCTL_FAILURE, e))
        })
        .await?;
        info!("Istio has been updated successfully to version {target_version}");
        Ok(())
    }

    async fn reset_proxy(&self, cancel: &CancellationToken, kubeconfig: &str, proxy_image_version: &str) -> Result<(), Error> {
        let cluster = utils::cancellable(cancel, self.provider.retrieve_from(kubeconfig)).await.map_err(|e| {
            error!("Could not retrieve KubeClient from Kubeconfig!");
            e
        })?;

        let settings = &self.config.proxy_reset;
        let config = ProxyResetConfig {
            cancel: cancel.clone(),
            image_prefix: settings.image_prefix.to_owned(),
            image_version: format!("{}{}", proxy_image_version, settings.image_suffix),
            retries_count: settings.retries_count,
            delay_between_retries: Duration::from_secs(settings.delay_between_retries_secs),
            timeout: Duration::from_secs(settings.timeout_secs),
            interval: Duration::from_secs(settings.interval_secs),
            cluster,
        };

        self.proxy_reset
            .run(config)
            .await
            .map_err(|e| Error::delegate("Istio proxy reset error", e))
    }

    async fn version(
        &self,
        cancel: &CancellationToken,
        workspace: &dyn WorkspaceFactory,
        branch: &str,
        istio_chart: &str,
        kubeconfig: &str,
    ) -> Result<IstioStatus, Error> {
        let target_version = utils::cancellable(cancel, async {
            self.target_version(workspace, branch, istio_chart)
                .await
                .map_err(|e| Error::delegate("Target Version could not be found", e))
        })
        .await?;

        let commander = self.commander_for(&target_version)?;
        let output = utils::cancellable(cancel, async {
            commander
                .version(kubeconfig)
                .await
                .map_err(|e| Error::delegate(ISTIOCTL_FAILURE, e))
        })
        .await?;

        version_output::map_version_output(&output, &target_version)
    }

    async fn uninstall(&self, cancel: &CancellationToken, cluster: &dyn ClusterClient, version: &str) -> Result<(), Error> {
        debug!("Starting Istio uninstallation...");

        let commander = self.commander_for(version)?;
        utils::cancellable(cancel, async {
            commander
                .uninstall(cluster.kubeconfig())
                .await
                .map_err(|e| Error::delegate(ISTIOCTL_FAILURE, e))
        })
        .await?;
        debug!("Istio uninstall triggered");

        let namespace = &self.config.istio_namespace;
        utils::cancellable(cancel, async {
            cluster
                .delete_namespace(namespace)
                .await
                .map_err(|e| Error::delegate(&format!("Could not delete namespace {namespace}"), e))
        })
        .await?;
        debug!("Istio namespace deleted");
        Ok(())
    }
}
