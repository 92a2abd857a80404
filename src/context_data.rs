use std::{env, path::PathBuf, sync::Arc};

use tracing::info;

use crate::{
    chart::{LocalWorkspaceFactory, WorkspaceFactory},
    cluster_client::{ClientProvider, DefaultClientProvider},
    commander_resolver::StaticCommanderResolver,
    constants,
    model::Error,
    performer::{DefaultIstioPerformer, IstioPerformer},
    performer_config::PerformerConfig,
    proxy_reset::PodProxyReset,
};

/// Everything a performer job needs, wired from the configuration file
#[derive(Clone)]
pub struct ContextData {
    pub performer: Arc<dyn IstioPerformer>,
    pub client_provider: Arc<dyn ClientProvider>,
    pub workspace: Arc<dyn WorkspaceFactory>,
    pub config: PerformerConfig,
}

impl ContextData {
    pub fn new() -> Result<Self, Error> {
        let config = PerformerConfig::load()?;
        let workspace_root = env::var(constants::CHART_WORKSPACE).map(PathBuf::from).or_else(|_| env::current_dir())?;
        Self::from_config(config, workspace_root)
    }

    pub fn from_config(config: PerformerConfig, workspace_root: PathBuf) -> Result<Self, Error> {
        let resolver = StaticCommanderResolver::from_binaries(&config.istioctl)?;
        info!(
            "Supported istioctl versions: {}",
            resolver.supported_versions().iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
        );
        let client_provider: Arc<dyn ClientProvider> = Arc::new(DefaultClientProvider);
        let performer = DefaultIstioPerformer::new(
            Arc::new(resolver),
            Arc::new(PodProxyReset),
            client_provider.clone(),
            config.clone(),
        );

        Ok(ContextData {
            performer: Arc::new(performer),
            client_provider,
            workspace: Arc::new(LocalWorkspaceFactory::new(workspace_root)),
            config,
        })
    }
}
