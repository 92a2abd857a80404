use std::{env, str::FromStr};

use istio_performer::{constants, context_data::ContextData, model::Error, utils};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Operation run by one performer job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Install,
    Update,
    Uninstall,
    ResetProxy,
    Version,
    PatchWebhook,
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "install" => Ok(Action::Install),
            "update" => Ok(Action::Update),
            "uninstall" => Ok(Action::Uninstall),
            "reset-proxy" => Ok(Action::ResetProxy),
            "version" => Ok(Action::Version),
            "patch-webhook" => Ok(Action::PatchWebhook),
            other => Err(Error::ConfigError(format!("Unknown action {other}"))),
        }
    }
}

fn required_env(name: &str) -> Result<String, Error> {
    env::var(name).map_err(|_| Error::ConfigError(format!("Environment variable {name} is not set")))
}

async fn read_env_file(name: &str) -> Result<String, Error> {
    let path = required_env(name)?;
    tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| Error::ConfigError(format!("Could not read {name} file {path}: {e}")))
}

async fn run(action: Action, context: &ContextData, cancel: &CancellationToken) -> Result<(), Error> {
    let kubeconfig = read_env_file(constants::KUBECONFIG).await?;
    let performer = context.performer.as_ref();
    match action {
        Action::Install => {
            let manifest = read_env_file(constants::ISTIO_MANIFEST).await?;
            performer.install(cancel, &kubeconfig, &manifest, &required_env(constants::ISTIO_VERSION)?).await
        }
        Action::Update => {
            let manifest = read_env_file(constants::ISTIO_MANIFEST).await?;
            performer.update(cancel, &kubeconfig, &manifest, &required_env(constants::ISTIO_VERSION)?).await
        }
        Action::Uninstall => {
            let cluster = utils::cancellable(cancel, context.client_provider.retrieve_from(&kubeconfig)).await?;
            performer.uninstall(cancel, cluster.as_ref(), &required_env(constants::ISTIO_VERSION)?).await
        }
        Action::ResetProxy => performer.reset_proxy(cancel, &kubeconfig, &required_env(constants::ISTIO_VERSION)?).await,
        Action::Version => {
            let branch = required_env(constants::CHART_BRANCH)?;
            let chart = required_env(constants::ISTIO_CHART)?;
            let status = performer.version(cancel, context.workspace.as_ref(), &branch, &chart, &kubeconfig).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Action::PatchWebhook => {
            let cluster = utils::cancellable(cancel, context.client_provider.retrieve_from(&kubeconfig)).await?;
            performer.patch_mutating_webhook(cancel, cluster.as_ref()).await
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let version: &str = env!("CARGO_PKG_VERSION");
    info!("Starting istio-performer {}", version);

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling the running operation");
            signal_token.cancel();
        }
    });

    let result = async {
        let action: Action = required_env(constants::PERFORMER_ACTION)?.parse()?;
        let context = ContextData::new()?;
        info!("Running {:?}", action);
        run(action, &context, &cancel).await
    }
    .await;

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}
