/// All errors possible to occur while performing Istio operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Any error originating from the `kube-rs` crate
    #[error("Kubernetes reported error: {source}")]
    KubeError {
        #[from]
        source: kube::Error,
    },

    /// The version string does not follow the istioctl version grammar
    #[error("Error parsing version '{version}': {reason}")]
    VersionParse { version: String, reason: String },

    /// No commander is registered for the requested version
    #[error("No istioctl commander registered for version {0}")]
    UnsupportedVersion(String),

    /// Neither the chart values nor the chart metadata declare a version
    #[error("Target Istio version could not be found: {0}")]
    TargetVersionNotFound(String),

    /// None of the candidate MutatingWebhookConfigurations could be fetched
    #[error("MutatingWebhookConfigurations could not be selected from candidates [{candidates}]: {source}")]
    WebhookSelection {
        candidates: String,
        #[source]
        source: Box<Error>,
    },

    /// The selected configuration has no webhook entry with the expected name
    #[error("Could not find webhook {webhook} in MutatingWebhookConfiguration {configuration}")]
    WebhookNotFound { webhook: String, configuration: String },

    /// Concurrent writers kept invalidating the read-modify-write cycle
    #[error("Giving up after {attempts} conflicting update attempts: {source}")]
    ConflictRetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// A collaborator failed while performing the named operation
    #[error("{operation}: {source}")]
    Delegate {
        operation: String,
        #[source]
        source: Box<Error>,
    },

    /// The istioctl binary exited unsuccessfully
    #[error("Command execution failed: {0}")]
    CommandExecution(String),

    /// The rendered chart does not carry a usable IstioOperator document
    #[error("Invalid Istio manifest: {0}")]
    ManifestError(String),

    /// The output of `istioctl version` could not be interpreted
    #[error("Invalid istioctl version output: {0}")]
    VersionOutput(String),

    /// The performer configuration is invalid
    #[error("Invalid performer configuration: {0}")]
    ConfigError(String),

    /// The kubeconfig could not be turned into a client
    #[error("Invalid kubeconfig: {0}")]
    KubeconfigError(String),

    /// The sidecar proxies could not be reset
    #[error("Sidecar proxies not reset: {0}")]
    ProxyReset(String),

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(
        #[from]
        std::io::Error,
    ),

    #[error("YAML Parsing error: {0}")]
    ParserError(
        #[from]
        serde_yaml::Error,
    ),

    #[error("JSON Parsing error: {0}")]
    JsonError(
        #[from]
        serde_json::Error,
    ),
}

impl Error {
    /// Annotates a collaborator failure with the operation that triggered it
    pub fn delegate(operation: &str, source: Error) -> Self {
        Error::Delegate {
            operation: operation.to_owned(),
            source: Box::new(source),
        }
    }

    /// Whether the API server rejected a write because the object changed underneath it
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::KubeError { source: kube::Error::Api(response) } => response.code == 409,
            Error::Delegate { source, .. } => source.is_conflict(),
            _ => false,
        }
    }

    /// Whether the API server reported the object as already gone
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::KubeError { source: kube::Error::Api(response) } => response.code == 404,
            Error::Delegate { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}
