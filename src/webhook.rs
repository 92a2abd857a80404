use k8s_openapi::api::admissionregistration::v1::MutatingWebhookConfiguration;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cluster_client::ClusterClient;
use crate::model::Error;
use crate::retry::{retry_on_conflict, RetryConfig};
use crate::utils;

/// Adds a namespace selector rule to one webhook of a shared MutatingWebhookConfiguration.
///
/// Every attempt re-reads the configuration, so a conflicting write from another actor is
/// followed by a fresh read-modify-write cycle instead of overwriting their change.
#[derive(Debug, Clone, Default)]
pub struct WebhookPatcher {
    retry: RetryConfig,
}

impl WebhookPatcher {
    pub fn new(retry: RetryConfig) -> Self {
        WebhookPatcher { retry }
    }

    pub async fn patch(
        &self,
        cancel: &CancellationToken,
        cluster: &dyn ClusterClient,
        candidates: &[String],
        webhook_name: &str,
        required_rule: &LabelSelectorRequirement,
    ) -> Result<(), Error> {
        let cycle = retry_on_conflict(&self.retry, "patch mutating webhook", move || async move {
            let mut configuration = select_from_candidates(cluster, candidates).await?;
            if add_namespace_selector_if_not_present(&mut configuration, webhook_name, required_rule)? {
                debug!("Adding namespace selector {} to webhook {webhook_name}", required_rule.key);
            } else {
                debug!("Webhook {webhook_name} already carries namespace selector {}", required_rule.key);
            }
            cluster.replace_mutating_webhook_configuration(&configuration).await
        });
        let configuration = utils::cancellable(cancel, cycle).await?;
        info!("Patch has been applied successfully to MutatingWebhookConfiguration {}", configuration.name_any());
        Ok(())
    }
}

/// Fetches the first candidate configuration that exists
async fn select_from_candidates(
    cluster: &dyn ClusterClient,
    candidates: &[String],
) -> Result<MutatingWebhookConfiguration, Error> {
    utils::first_success(candidates, move |name| cluster.get_mutating_webhook_configuration(name))
        .await
        .map_err(|last_error| match last_error {
            Some(source) => Error::WebhookSelection {
                candidates: candidates.join(", "),
                source: Box::new(source),
            },
            None => Error::ConfigError("No MutatingWebhookConfiguration candidates given".to_owned()),
        })
}

/// Appends `required_rule` to the webhook's namespace selector unless an equal rule is present.
/// Returns whether the configuration changed.
pub fn add_namespace_selector_if_not_present(
    configuration: &mut MutatingWebhookConfiguration,
    webhook_name: &str,
    required_rule: &LabelSelectorRequirement,
) -> Result<bool, Error> {
    let configuration_name = configuration.name_any();
    let webhook = configuration
        .webhooks
        .iter_mut()
        .flatten()
        .find(|webhook| webhook.name == webhook_name)
        .ok_or_else(|| Error::WebhookNotFound {
            webhook: webhook_name.to_owned(),
            configuration: configuration_name,
        })?;

    let match_expressions = webhook
        .namespace_selector
        .get_or_insert_with(LabelSelector::default)
        .match_expressions
        .get_or_insert_with(Vec::new);
    if match_expressions.contains(required_rule) {
        return Ok(false);
    }
    match_expressions.push(required_rule.clone());
    Ok(true)
}
