use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::{
    admissionregistration::v1::{MutatingWebhook, MutatingWebhookConfiguration},
    core::v1::{Container, Pod, PodSpec},
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement, OwnerReference};
use kube::{core::ObjectMeta, error::ErrorResponse};

use crate::cluster_client::ClusterClient;
use crate::constants;
use crate::model::Error;

pub fn conflict_error() -> Error {
    Error::from(kube::Error::Api(ErrorResponse {
        status: "Failure".to_owned(),
        message: "the object has been modified; please apply your changes to the latest version and try again".to_owned(),
        reason: "Conflict".to_owned(),
        code: 409,
    }))
}

pub fn not_found_error(name: &str) -> Error {
    Error::from(kube::Error::Api(ErrorResponse {
        status: "Failure".to_owned(),
        message: format!("mutatingwebhookconfigurations.admissionregistration.k8s.io \"{name}\" not found"),
        reason: "NotFound".to_owned(),
        code: 404,
    }))
}

pub fn forbidden_error() -> Error {
    Error::from(kube::Error::Api(ErrorResponse {
        status: "Failure".to_owned(),
        message: "namespaces \"istio-system\" is forbidden".to_owned(),
        reason: "Forbidden".to_owned(),
        code: 403,
    }))
}

pub fn selector(key: &str, operator: &str, values: &[&str]) -> LabelSelectorRequirement {
    LabelSelectorRequirement {
        key: key.to_owned(),
        operator: operator.to_owned(),
        values: Some(values.iter().map(|v| v.to_string()).collect()),
    }
}

pub fn webhook_configuration(name: &str, webhook_names: &[&str]) -> MutatingWebhookConfiguration {
    MutatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            resource_version: Some("1".to_owned()),
            ..ObjectMeta::default()
        },
        webhooks: Some(
            webhook_names
                .iter()
                .map(|webhook_name| MutatingWebhook {
                    name: webhook_name.to_string(),
                    namespace_selector: Some(LabelSelector {
                        match_expressions: Some(vec![selector("istio-injection", "NotIn", &["disabled"])]),
                        ..LabelSelector::default()
                    }),
                    ..MutatingWebhook::default()
                })
                .collect(),
        ),
    }
}

pub fn match_expressions(configuration: &MutatingWebhookConfiguration, webhook_name: &str) -> Vec<LabelSelectorRequirement> {
    configuration
        .webhooks
        .iter()
        .flatten()
        .find(|webhook| webhook.name == webhook_name)
        .and_then(|webhook| webhook.namespace_selector.as_ref())
        .and_then(|selector| selector.match_expressions.clone())
        .unwrap_or_default()
}

pub fn sidecar_pod(namespace: &str, name: &str, proxy_image: &str, owned: bool) -> Pod {
    let owner_references = owned.then(|| {
        vec![OwnerReference {
            api_version: "apps/v1".to_owned(),
            kind: "ReplicaSet".to_owned(),
            name: format!("{name}-rs"),
            uid: format!("{name}-uid"),
            controller: Some(true),
            ..OwnerReference::default()
        }]
    });
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            namespace: Some(namespace.to_owned()),
            owner_references,
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            containers: vec![
                Container {
                    name: "app".to_owned(),
                    image: Some("nginx:1.25".to_owned()),
                    ..Container::default()
                },
                Container {
                    name: constants::ISTIO_PROXY_CONTAINER.to_owned(),
                    image: Some(proxy_image.to_owned()),
                    ..Container::default()
                },
            ],
            ..PodSpec::default()
        }),
        ..Pod::default()
    }
}

/// In-memory cluster honouring resource versions on webhook updates.
///
/// `conflicts` simulates concurrent writers: each pending conflict bumps the stored resource
/// version (and appends `concurrent_rule`, when set) right before the update lands.
#[derive(Default)]
pub struct FakeCluster {
    pub webhooks: Mutex<BTreeMap<String, MutatingWebhookConfiguration>>,
    pub conflicts: AtomicU32,
    pub concurrent_rule: Option<(String, LabelSelectorRequirement)>,
    pub updates: AtomicU32,
    pub fetches: Mutex<Vec<String>>,
    pub namespace_deletion_error: bool,
    pub deleted_namespaces: Mutex<Vec<String>>,
    pub pods: Mutex<Vec<Pod>>,
    pub deleted_pods: Mutex<Vec<String>>,
    pub pod_deletion_failures: AtomicU32,
    pub recreate_with_image: Option<String>,
    /// Pods disappear right before their deletion is requested, as if replaced by their controller
    pub pods_vanish_before_delete: bool,
    /// Namespace deletion never completes
    pub namespace_deletion_hangs: bool,
}

impl FakeCluster {
    pub fn with_webhooks(configurations: Vec<MutatingWebhookConfiguration>) -> Self {
        let cluster = FakeCluster::default();
        {
            let mut webhooks = cluster.webhooks.lock().unwrap();
            for configuration in configurations {
                webhooks.insert(configuration.metadata.name.clone().unwrap(), configuration);
            }
        }
        cluster
    }

    pub fn with_pods(pods: Vec<Pod>) -> Self {
        let cluster = FakeCluster::default();
        *cluster.pods.lock().unwrap() = pods;
        cluster
    }

    pub fn webhook(&self, name: &str) -> MutatingWebhookConfiguration {
        self.webhooks.lock().unwrap().get(name).cloned().unwrap()
    }
}

fn bump_resource_version(configuration: &mut MutatingWebhookConfiguration) {
    let current: u64 = configuration.metadata.resource_version.as_deref().unwrap_or("0").parse().unwrap();
    configuration.metadata.resource_version = Some((current + 1).to_string());
}

#[async_trait]
impl ClusterClient for FakeCluster {
    fn kubeconfig(&self) -> &str {
        "apiVersion: v1\nkind: Config\n"
    }

    async fn get_mutating_webhook_configuration(&self, name: &str) -> Result<MutatingWebhookConfiguration, Error> {
        self.fetches.lock().unwrap().push(name.to_owned());
        self.webhooks.lock().unwrap().get(name).cloned().ok_or_else(|| not_found_error(name))
    }

    async fn replace_mutating_webhook_configuration(
        &self,
        configuration: &MutatingWebhookConfiguration,
    ) -> Result<MutatingWebhookConfiguration, Error> {
        let name = configuration.metadata.name.clone().unwrap();
        let mut webhooks = self.webhooks.lock().unwrap();
        let stored = webhooks.get_mut(&name).ok_or_else(|| not_found_error(&name))?;

        if self.conflicts.load(Ordering::SeqCst) > 0 {
            self.conflicts.fetch_sub(1, Ordering::SeqCst);
            if let Some((webhook_name, rule)) = &self.concurrent_rule {
                if let Some(webhook) = stored.webhooks.iter_mut().flatten().find(|w| &w.name == webhook_name) {
                    let selector = webhook.namespace_selector.get_or_insert_with(LabelSelector::default);
                    selector.match_expressions.get_or_insert_with(Vec::new).push(rule.clone());
                }
            }
            bump_resource_version(stored);
        }

        if stored.metadata.resource_version != configuration.metadata.resource_version {
            return Err(conflict_error());
        }

        let mut updated = configuration.clone();
        bump_resource_version(&mut updated);
        *stored = updated.clone();
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), Error> {
        if self.namespace_deletion_hangs {
            std::future::pending::<()>().await;
        }
        if self.namespace_deletion_error {
            return Err(forbidden_error());
        }
        self.deleted_namespaces.lock().unwrap().push(name.to_owned());
        Ok(())
    }

    async fn list_pods(&self) -> Result<Vec<Pod>, Error> {
        Ok(self.pods.lock().unwrap().clone())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), Error> {
        if self.pod_deletion_failures.load(Ordering::SeqCst) > 0 {
            self.pod_deletion_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(conflict_error());
        }
        let mut pods = self.pods.lock().unwrap();
        if self.pods_vanish_before_delete {
            pods.retain(|pod| !(pod.metadata.namespace.as_deref() == Some(namespace) && pod.metadata.name.as_deref() == Some(name)));
            return Err(not_found_error(name));
        }
        let position = pods
            .iter()
            .position(|pod| pod.metadata.namespace.as_deref() == Some(namespace) && pod.metadata.name.as_deref() == Some(name))
            .ok_or_else(|| not_found_error(name))?;
        let deleted = pods.remove(position);
        self.deleted_pods.lock().unwrap().push(format!("{namespace}/{name}"));
        if let Some(image) = &self.recreate_with_image {
            pods.push(sidecar_pod(namespace, &format!("{name}-new"), image, deleted.metadata.owner_references.is_some()));
        }
        Ok(())
    }
}
