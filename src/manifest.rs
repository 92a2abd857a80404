use serde::Deserialize;

use crate::constants;
use crate::model::Error;

/// Extracts the control plane manifest istioctl consumes from a rendered chart
pub trait ManifestExtractor: Send + Sync {
    fn extract(&self, rendered_chart: &str) -> Result<String, Error>;
}

/// Picks the `IstioOperator` document out of a multi-document YAML stream
#[derive(Debug, Clone, Default)]
pub struct IstioOperatorExtractor;

impl ManifestExtractor for IstioOperatorExtractor {
    fn extract(&self, rendered_chart: &str) -> Result<String, Error> {
        for document in serde_yaml::Deserializer::from_str(rendered_chart) {
            let value = serde_yaml::Value::deserialize(document)?;
            let kind = value.get("kind").and_then(|kind| kind.as_str());
            if kind == Some(constants::ISTIO_OPERATOR_KIND) {
                return Ok(serde_yaml::to_string(&value)?);
            }
        }
        Err(Error::ManifestError(format!(
            "no {} document found in rendered chart",
            constants::ISTIO_OPERATOR_KIND
        )))
    }
}
