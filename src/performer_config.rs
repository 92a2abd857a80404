use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement;
use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf, time::Duration};

use crate::constants;
use crate::model::Error;
use crate::retry::RetryConfig;

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct PerformerConfig {
    #[serde(default)]
    pub istioctl: Vec<IstioctlBinary>,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub proxy_reset: ProxyResetSettings,
    #[serde(default = "default_istio_namespace")]
    pub istio_namespace: String,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct IstioctlBinary {
    pub version: String,
    pub path: PathBuf,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct WebhookConfig {
    pub candidates: Vec<String>,
    pub webhook_name: String,
    pub required_selector: LabelSelectorRequirement,
    #[serde(default)]
    pub retry: ConflictRetrySettings,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct ConflictRetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct ProxyResetSettings {
    pub image_prefix: String,
    pub image_suffix: String,
    pub retries_count: u32,
    pub delay_between_retries_secs: u64,
    pub timeout_secs: u64,
    pub interval_secs: u64,
}

fn default_istio_namespace() -> String {
    constants::ISTIO_NAMESPACE.to_owned()
}

impl Default for PerformerConfig {
    fn default() -> Self {
        PerformerConfig {
            istioctl: Vec::new(),
            webhook: WebhookConfig::default(),
            proxy_reset: ProxyResetSettings::default(),
            istio_namespace: default_istio_namespace(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        WebhookConfig {
            candidates: vec![
                constants::WEBHOOK_PRIMARY_CONFIGURATION.to_owned(),
                constants::WEBHOOK_SECONDARY_CONFIGURATION.to_owned(),
            ],
            webhook_name: constants::WEBHOOK_SIDECAR_INJECTOR.to_owned(),
            required_selector: LabelSelectorRequirement {
                key: constants::LABEL_GARDENER_PURPOSE.to_owned(),
                operator: constants::SELECTOR_OPERATOR_NOT_IN.to_owned(),
                values: Some(vec![constants::NAMESPACE_KUBE_SYSTEM.to_owned()]),
            },
            retry: ConflictRetrySettings::default(),
        }
    }
}

impl Default for ConflictRetrySettings {
    fn default() -> Self {
        ConflictRetrySettings {
            max_attempts: constants::CONFLICT_RETRY_ATTEMPTS,
            initial_delay_ms: constants::CONFLICT_RETRY_DELAY_MS,
            max_delay_ms: constants::CONFLICT_RETRY_MAX_DELAY_MS,
            backoff_multiplier: constants::CONFLICT_RETRY_BACKOFF,
        }
    }
}

impl ConflictRetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

impl Default for ProxyResetSettings {
    fn default() -> Self {
        ProxyResetSettings {
            image_prefix: constants::ISTIO_IMAGE_PREFIX.to_owned(),
            image_suffix: constants::ISTIO_IMAGE_SUFFIX.to_owned(),
            retries_count: constants::PROXY_RESET_RETRIES,
            delay_between_retries_secs: constants::PROXY_RESET_DELAY_SECS,
            timeout_secs: constants::PROXY_RESET_TIMEOUT_SECS,
            interval_secs: constants::PROXY_RESET_INTERVAL_SECS,
        }
    }
}

impl PerformerConfig {
    /// Reads the configuration file matching the current environment
    pub fn load() -> Result<Self, Error> {
        let config_path = config_path()?;
        let config_file = std::fs::File::open(&config_path)
            .map_err(|e| Error::ConfigError(format!("Could not open config file {}: {}", config_path.display(), e)))?;
        let config: PerformerConfig = serde_yaml::from_reader(config_file)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, Error> {
        let config: PerformerConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.webhook.candidates.is_empty() {
            return Err(Error::ConfigError("webhook.candidates must not be empty".to_owned()));
        }
        if self.webhook.retry.max_attempts == 0 {
            return Err(Error::ConfigError("webhook.retry.max_attempts must be at least 1".to_owned()));
        }
        if self.proxy_reset.image_prefix.is_empty() {
            return Err(Error::ConfigError("proxy_reset.image_prefix must not be empty".to_owned()));
        }
        if self.proxy_reset.image_suffix.is_empty() {
            return Err(Error::ConfigError("proxy_reset.image_suffix must not be empty".to_owned()));
        }
        Ok(())
    }
}

fn config_path() -> Result<PathBuf, Error> {
    if let Ok(path) = env::var(constants::PERFORMER_CONFIG) {
        return Ok(PathBuf::from(path));
    }
    let performer_environment = env::var(constants::PERFORMER_ENVIRONMENT)
        .map_err(|_| Error::ConfigError(format!("Environment variable {} is not set", constants::PERFORMER_ENVIRONMENT)))?;
    if performer_environment.eq("production") {
        Ok(PathBuf::from(constants::PRODUCTION_CONFIG_PATH))
    } else {
        Ok(env::current_dir()?.join(format!("sample_config-{performer_environment}.yaml")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = PerformerConfig::from_yaml("istioctl:\n  - version: 1.11.4\n    path: /bin/istioctl-1.11.4\n").unwrap();
        assert_eq!(config.istioctl.len(), 1);
        assert_eq!(config.istio_namespace, "istio-system");
        assert_eq!(config.webhook.candidates, vec!["istio-revision-tag-default", "istio-sidecar-injector"]);
        assert_eq!(config.webhook.webhook_name, "auto.sidecar-injector.istio.io");
        assert_eq!(config.webhook.required_selector.operator, "NotIn");
        assert_eq!(config.proxy_reset.image_prefix, "istio/proxyv2");
        assert_eq!(config.proxy_reset.timeout_secs, 300);
    }

    #[test]
    fn test_webhook_section_is_read() {
        let yaml = r#"
webhook:
  candidates: [custom-injector]
  webhook_name: sidecar.example.io
  required_selector:
    key: team
    operator: In
    values: [mesh]
  retry:
    max_attempts: 3
    initial_delay_ms: 1
    max_delay_ms: 5
    backoff_multiplier: 2.0
"#;
        let config = PerformerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.webhook.candidates, vec!["custom-injector"]);
        assert_eq!(config.webhook.required_selector.values, Some(vec!["mesh".to_owned()]));
        let retry = config.webhook.retry.to_retry_config();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_delay, Duration::from_millis(1));
    }

    #[test]
    fn test_empty_image_suffix_rejected() {
        let yaml = r#"
proxy_reset:
  image_prefix: istio/proxyv2
  image_suffix: ""
  retries_count: 5
  delay_between_retries_secs: 5
  timeout_secs: 300
  interval_secs: 12
"#;
        match PerformerConfig::from_yaml(yaml) {
            Err(Error::ConfigError(message)) => assert!(message.contains("image_suffix")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_retries_allowed() {
        let yaml = r#"
proxy_reset:
  image_prefix: istio/proxyv2
  image_suffix: -distroless
  retries_count: 0
  delay_between_retries_secs: 5
  timeout_secs: 300
  interval_secs: 12
"#;
        assert_eq!(PerformerConfig::from_yaml(yaml).unwrap().proxy_reset.retries_count, 0);
    }

    #[test]
    fn test_empty_candidates_rejected() {
        let yaml = "webhook:\n  candidates: []\n  webhook_name: a\n  required_selector:\n    key: k\n    operator: Exists\n";
        assert!(matches!(PerformerConfig::from_yaml(yaml), Err(Error::ConfigError(_))));
    }
}
