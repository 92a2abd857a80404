// Performer Constants
pub const PERFORMER_ENVIRONMENT: &str = "PERFORMER_ENVIRONMENT";
pub const PERFORMER_CONFIG: &str = "PERFORMER_CONFIG";
pub const PRODUCTION_CONFIG_PATH: &str = "/app/config/config.yaml";

// Job inputs
pub const PERFORMER_ACTION: &str = "PERFORMER_ACTION";
pub const ISTIO_VERSION: &str = "ISTIO_VERSION";
pub const ISTIO_MANIFEST: &str = "ISTIO_MANIFEST";
pub const ISTIO_CHART: &str = "ISTIO_CHART";
pub const CHART_WORKSPACE: &str = "CHART_WORKSPACE";
pub const CHART_BRANCH: &str = "CHART_BRANCH";
pub const KUBECONFIG: &str = "KUBECONFIG";

// Istio installation
pub const ISTIO_NAMESPACE: &str = "istio-system";
pub const ISTIO_OPERATOR_KIND: &str = "IstioOperator";
pub const ISTIO_PROXY_CONTAINER: &str = "istio-proxy";

// Chart files
pub const CHART_DEFINITION_FILE: &str = "Chart.yaml";
pub const CHART_VALUES_FILE: &str = "values.yaml";
pub const WORKSPACE_RESOURCE_DIR: &str = "resources";

// Mutating webhook
pub const WEBHOOK_PRIMARY_CONFIGURATION: &str = "istio-revision-tag-default";
pub const WEBHOOK_SECONDARY_CONFIGURATION: &str = "istio-sidecar-injector";
pub const WEBHOOK_SIDECAR_INJECTOR: &str = "auto.sidecar-injector.istio.io";
pub const LABEL_GARDENER_PURPOSE: &str = "gardener.cloud/purpose";
pub const SELECTOR_OPERATOR_NOT_IN: &str = "NotIn";
pub const NAMESPACE_KUBE_SYSTEM: &str = "kube-system";

// Conflict retry, aligned with the client-go default retry
pub const CONFLICT_RETRY_ATTEMPTS: u32 = 5;
pub const CONFLICT_RETRY_DELAY_MS: u64 = 10;
pub const CONFLICT_RETRY_BACKOFF: f64 = 1.0;
pub const CONFLICT_RETRY_MAX_DELAY_MS: u64 = 1000;

// Proxy reset
pub const ISTIO_IMAGE_PREFIX: &str = "istio/proxyv2";
pub const ISTIO_IMAGE_SUFFIX: &str = "-distroless";
pub const PROXY_RESET_RETRIES: u32 = 5;
pub const PROXY_RESET_DELAY_SECS: u64 = 5;
pub const PROXY_RESET_TIMEOUT_SECS: u64 = 300;
pub const PROXY_RESET_INTERVAL_SECS: u64 = 12;
