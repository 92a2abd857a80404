use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::{
    admissionregistration::v1::MutatingWebhookConfiguration,
    core::v1::{Namespace, Pod},
};
use kube::{
    api::{DeleteParams, ListParams, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
    Api, Client, Config,
};
use tracing::debug;

use crate::model::Error;

/// Narrow view of the cluster used by the performer
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Raw kubeconfig handed to istioctl
    fn kubeconfig(&self) -> &str;

    async fn get_mutating_webhook_configuration(&self, name: &str) -> Result<MutatingWebhookConfiguration, Error>;

    /// Full update, rejected with a 409 when the resource version is stale
    async fn replace_mutating_webhook_configuration(
        &self,
        configuration: &MutatingWebhookConfiguration,
    ) -> Result<MutatingWebhookConfiguration, Error>;

    /// Deletes the namespace with foreground cascading deletion
    async fn delete_namespace(&self, name: &str) -> Result<(), Error>;

    async fn list_pods(&self) -> Result<Vec<Pod>, Error>;

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

/// Builds cluster clients out of kubeconfig content
#[async_trait]
pub trait ClientProvider: Send + Sync {
    async fn retrieve_from(&self, kubeconfig: &str) -> Result<Arc<dyn ClusterClient>, Error>;
}

/// Cluster client backed by kube-rs
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
    kubeconfig: String,
}

impl KubeClusterClient {
    pub async fn from_kubeconfig(kubeconfig: &str) -> Result<Self, Error> {
        let kubeconfig_spec = Kubeconfig::from_yaml(kubeconfig).map_err(|e| Error::KubeconfigError(e.to_string()))?;
        let config = Config::from_custom_kubeconfig(kubeconfig_spec, &KubeConfigOptions::default())
            .await
            .map_err(|e| Error::KubeconfigError(e.to_string()))?;
        let client = Client::try_from(config)?;
        Ok(KubeClusterClient {
            client,
            kubeconfig: kubeconfig.to_owned(),
        })
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    fn kubeconfig(&self) -> &str {
        &self.kubeconfig
    }

    async fn get_mutating_webhook_configuration(&self, name: &str) -> Result<MutatingWebhookConfiguration, Error> {
        let api: Api<MutatingWebhookConfiguration> = Api::all(self.client.clone());
        Ok(api.get(name).await?)
    }

    async fn replace_mutating_webhook_configuration(
        &self,
        configuration: &MutatingWebhookConfiguration,
    ) -> Result<MutatingWebhookConfiguration, Error> {
        let name = configuration
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::ConfigError("MutatingWebhookConfiguration has no name".to_owned()))?;
        let api: Api<MutatingWebhookConfiguration> = Api::all(self.client.clone());
        Ok(api.replace(name, &PostParams::default(), configuration).await?)
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::foreground()).await?;
        debug!("Namespace {name} deletion requested");
        Ok(())
    }

    async fn list_pods(&self) -> Result<Vec<Pod>, Error> {
        let api: Api<Pod> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct DefaultClientProvider;

#[async_trait]
impl ClientProvider for DefaultClientProvider {
    async fn retrieve_from(&self, kubeconfig: &str) -> Result<Arc<dyn ClusterClient>, Error> {
        let client = KubeClusterClient::from_kubeconfig(kubeconfig).await?;
        Ok(Arc::new(client))
    }
}
